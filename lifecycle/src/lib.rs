//! Agent Run Lifecycle Library
//!
//! This library provides the coordination contract for an autonomous coding
//! agent run:
//! - A lifecycle state machine with a fixed transition graph
//!   (idle → planning → executing → testing ↔ fixing → done, with `error`
//!   reachable from every active state)
//! - Bounded transition history with per-entry durations and statistics
//! - Phase-derived UI step checklist
//! - Synchronous notifications with an optional Tokio broadcast bridge
//! - JSON snapshots for resume-after-restart
//! - An explicit registry for tracking several runs in one process
//!
//! # Usage
//!
//! ```
//! use lifecycle::{AgentStateMachine, ContextUpdate, RunLifecycleState};
//!
//! let mut machine = AgentStateMachine::new();
//! let result = machine.transition(RunLifecycleState::Planning, Some("user request"), Some("run-1"));
//! assert!(result.success);
//!
//! machine.update_context(ContextUpdate::new().current_file("src/main.rs").line(12));
//!
//! // Illegal moves are reported, never raised.
//! let skipped = machine.transition(RunLifecycleState::Done, None, None);
//! assert!(!skipped.success);
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod machine;
pub mod registry;
pub mod snapshot;
pub mod steps;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{LifecycleConfig, ProgressPolicy, RestorePolicy, DEFAULT_HISTORY_LIMIT};
pub use error::{LifecycleError, LifecycleResult, TransitionRejection};
pub use events::{EventBus, EventFilter, EventKind, LifecycleEvent, ListenerId, SharedEventBus};
pub use machine::{
    AgentContext, AgentStateMachine, ContextUpdate, EpochMillis, MachineStats, Metadata,
    RunLifecycleState, RunPhase, TransitionRecord, TransitionResult,
};
pub use registry::{lock_machine, RunRegistry, SharedMachine};
pub use snapshot::{load_snapshot, save_snapshot, MachineSnapshot};
pub use steps::{derive_steps, Step, StepId, StepStatus};
