//! Event bus bridge
//!
//! Republishes synchronous lifecycle notifications onto a Tokio broadcast
//! channel so async consumers (WebSocket fan-out, persistence writers) can
//! subscribe without holding the machine.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use super::listeners::ListenerId;
use super::types::{EventKind, LifecycleEvent};
use crate::machine::AgentStateMachine;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

pub struct EventBus {
    sender: broadcast::Sender<LifecycleEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. Returns the receiver count;
    /// having none is not an error.
    pub fn publish(&self, event: LifecycleEvent) -> usize {
        let kind = event.kind().as_str();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(kind, receivers = count, "Lifecycle event published");
                count
            }
            Err(_) => {
                debug!(kind, "Lifecycle event published (no receivers)");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Register a listener on `machine` that forwards every event here.
    pub fn attach(self: &Arc<Self>, machine: &mut AgentStateMachine) -> ListenerId {
        let bus = Arc::clone(self);
        machine.on_event(move |event| {
            bus.publish(event.clone());
        })
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Event filter for selective subscription
///
/// Events that carry no run id (error, reset) pass the run filter.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub run_id: Option<String>,
    pub kinds: Option<Vec<EventKind>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(mut self, run_id: &str) -> Self {
        self.run_id = Some(run_id.to_string());
        self
    }

    pub fn kinds(mut self, kinds: Vec<EventKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn matches(&self, event: &LifecycleEvent) -> bool {
        if let Some(ref rid) = self.run_id {
            if let Some(event_rid) = event.run_id() {
                if event_rid != rid {
                    return false;
                }
            }
        }

        if let Some(ref kinds) = self.kinds {
            if !kinds.contains(&event.kind()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<LifecycleEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    pub fn new(receiver: broadcast::Receiver<LifecycleEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<LifecycleEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::{AgentContext, ContextUpdate, RunLifecycleState};

    #[tokio::test]
    async fn test_attach_forwards_machine_events() {
        let bus = EventBus::new().shared();
        let mut receiver = bus.subscribe();
        let mut machine = AgentStateMachine::new();
        bus.attach(&mut machine);

        machine.transition(RunLifecycleState::Planning, Some("start"), Some("run-1"));
        machine.update_context(ContextUpdate::new().progress(0.2));

        let first = receiver.recv().await.unwrap();
        assert_eq!(first.kind(), EventKind::StateChanged);
        assert_eq!(first.run_id(), Some("run-1"));

        let second = receiver.recv().await.unwrap();
        assert_eq!(second.kind(), EventKind::ContextUpdated);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        let delivered = bus.publish(LifecycleEvent::Reset {
            from: RunLifecycleState::Done,
        });
        assert_eq!(delivered, 2);

        assert_eq!(rx1.recv().await.unwrap().kind(), EventKind::Reset);
        assert_eq!(rx2.recv().await.unwrap().kind(), EventKind::Reset);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.publish(LifecycleEvent::Error { reason: None }), 0);
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .run("run-1")
            .kinds(vec![EventKind::StateChanged, EventKind::Error]);

        let for_run = |run: &str| LifecycleEvent::StateChanged {
            from: RunLifecycleState::Idle,
            to: RunLifecycleState::Planning,
            context: AgentContext {
                run_id: Some(run.to_string()),
                ..Default::default()
            },
            reason: None,
        };

        assert!(filter.matches(&for_run("run-1")));
        assert!(!filter.matches(&for_run("run-2")));
        assert!(filter.matches(&LifecycleEvent::Error { reason: None }));
        assert!(!filter.matches(&LifecycleEvent::Reset {
            from: RunLifecycleState::Idle
        }));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().kinds(vec![EventKind::Error]));

        bus.publish(LifecycleEvent::Reset {
            from: RunLifecycleState::Planning,
        });
        bus.publish(LifecycleEvent::Error {
            reason: Some("tests failed".into()),
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(
            event,
            LifecycleEvent::Error {
                reason: Some("tests failed".into())
            }
        );
    }
}
