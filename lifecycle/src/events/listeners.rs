//! Synchronous listener registry with per-listener panic isolation.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use super::types::LifecycleEvent;

/// A registered callback.
pub type Listener = Arc<dyn Fn(&LifecycleEvent) + Send + Sync>;

/// Handle returned on registration; pass it back to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listeners in registration order.
#[derive(Default)]
pub struct ListenerSet {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

impl ListenerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Listener) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.listeners.push((id, listener));
        id
    }

    /// Returns whether `id` was registered.
    pub fn remove(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every listener in order.
    ///
    /// A panicking listener is logged and skipped; the rest still run.
    /// Returns how many listeners completed normally.
    pub fn emit(&self, event: &LifecycleEvent) -> usize {
        let mut delivered = 0;
        for (id, listener) in &self.listeners {
            match panic::catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(()) => delivered += 1,
                Err(payload) => {
                    error!(
                        listener = ?id,
                        kind = event.kind().as_str(),
                        panic = %panic_message(payload.as_ref()),
                        "Lifecycle listener panicked"
                    );
                }
            }
        }
        delivered
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("count", &self.listeners.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::RunLifecycleState;
    use std::sync::Mutex;

    fn reset_event() -> LifecycleEvent {
        LifecycleEvent::Reset {
            from: RunLifecycleState::Planning,
        }
    }

    #[test]
    fn test_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut set = ListenerSet::new();
        for n in 0..3 {
            let seen = seen.clone();
            set.add(Arc::new(move |_| seen.lock().unwrap().push(n)));
        }

        assert_eq!(set.emit(&reset_event()), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let seen = Arc::new(Mutex::new(0));
        let mut set = ListenerSet::new();
        set.add(Arc::new(|_| panic!("listener exploded")));
        let counter = seen.clone();
        set.add(Arc::new(move |_| *counter.lock().unwrap() += 1));

        assert_eq!(set.emit(&reset_event()), 1);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[test]
    fn test_remove() {
        let mut set = ListenerSet::new();
        let a = set.add(Arc::new(|_| {}));
        let b = set.add(Arc::new(|_| {}));
        assert_ne!(a, b);
        assert!(set.remove(a));
        assert!(!set.remove(a));
        assert_eq!(set.len(), 1);
    }
}
