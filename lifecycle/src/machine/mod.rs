//! Agent lifecycle state machine
//!
//! - `types.rs`: states, phases, the transition graph
//! - `context.rs`: the mutable run context and partial updates
//! - `engine.rs`: `AgentStateMachine` and its transition records
//! - `stats.rs`: statistics derived from history

pub mod context;
pub mod engine;
pub mod stats;
pub mod types;

pub use context::{AgentContext, ContextUpdate, Metadata};
pub use engine::{AgentStateMachine, TransitionRecord, TransitionResult};
pub use stats::MachineStats;
pub use types::{EpochMillis, RunLifecycleState, RunPhase};
