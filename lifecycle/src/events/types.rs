//! Lifecycle notifications
//!
//! Emitted synchronously by the state machine and serialized as a tagged
//! union (`kind`) for external broadcasters.

use serde::Serialize;

use crate::machine::{AgentContext, ContextUpdate, RunLifecycleState};

/// All notifications a state machine emits.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// A legal transition completed.
    StateChanged {
        from: RunLifecycleState,
        to: RunLifecycleState,
        /// Context after the transition was applied.
        context: AgentContext,
        reason: Option<String>,
    },

    /// `update_context` merged new fields.
    ContextUpdated {
        previous: AgentContext,
        current: AgentContext,
        updates: ContextUpdate,
    },

    /// The run entered the `error` state.
    Error { reason: Option<String> },

    /// The machine was reset to `idle`.
    Reset { from: RunLifecycleState },
}

/// Discriminant of a [`LifecycleEvent`], for filtering and typed listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StateChanged,
    ContextUpdated,
    Error,
    Reset,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::StateChanged => "state_changed",
            Self::ContextUpdated => "context_updated",
            Self::Error => "error",
            Self::Reset => "reset",
        }
    }
}

impl LifecycleEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::StateChanged { .. } => EventKind::StateChanged,
            Self::ContextUpdated { .. } => EventKind::ContextUpdated,
            Self::Error { .. } => EventKind::Error,
            Self::Reset { .. } => EventKind::Reset,
        }
    }

    /// Run id carried by the event payload, if any.
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::StateChanged { context, .. } => context.run_id.as_deref(),
            Self::ContextUpdated { current, .. } => current.run_id.as_deref(),
            Self::Error { .. } | Self::Reset { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tagged_serialization() {
        let event = LifecycleEvent::Reset {
            from: RunLifecycleState::Testing,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, serde_json::json!({"kind": "reset", "from": "testing"}));

        let event = LifecycleEvent::Error {
            reason: Some("disk full".into()),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "error");
        assert_eq!(value["reason"], "disk full");
    }

    #[test]
    fn test_kind_and_run_id() {
        let context = AgentContext {
            run_id: Some("run-1".into()),
            ..Default::default()
        };
        let event = LifecycleEvent::StateChanged {
            from: RunLifecycleState::Idle,
            to: RunLifecycleState::Planning,
            context,
            reason: None,
        };
        assert_eq!(event.kind(), EventKind::StateChanged);
        assert_eq!(event.kind().as_str(), "state_changed");
        assert_eq!(event.run_id(), Some("run-1"));
        assert_eq!(LifecycleEvent::Error { reason: None }.run_id(), None);
    }
}
