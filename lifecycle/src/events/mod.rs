//! Lifecycle notifications
//!
//! 1. **Event Types** (`types.rs`): the `LifecycleEvent` tagged union.
//! 2. **Listeners** (`listeners.rs`): synchronous, in-order delivery with
//!    per-listener panic isolation. This is what the state machine uses.
//! 3. **Event Bus** (`bus.rs`): optional Tokio broadcast bridge for async
//!    consumers such as a WebSocket broadcaster.
//!
//! ```text
//! ┌──────────────┐  emit   ┌──────────────┐  publish  ┌──────────────┐
//! │ StateMachine │────────▶│  Listeners   │──────────▶│  Event Bus   │──▶ subscribers
//! └──────────────┘  (sync) └──────────────┘  (attach) └──────────────┘
//! ```

pub mod bus;
pub mod listeners;
pub mod types;

pub use bus::{EventBus, EventFilter, FilteredReceiver, SharedEventBus};
pub use listeners::{Listener, ListenerId, ListenerSet};
pub use types::{EventKind, LifecycleEvent};
