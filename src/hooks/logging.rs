//! Log-only observer and observer fan-out.

use std::sync::Arc;

use tracing::info;

use crate::session::SessionObserver;

/// Logs every connect and disconnect.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SessionObserver for TracingObserver {
    fn on_connect(&self, identifier: &str) {
        info!(identifier = %identifier, "{} is online", identifier);
    }

    fn on_disconnect(&self, identifier: &str) {
        info!(identifier = %identifier, "{} is offline", identifier);
    }
}

/// Forwards notifications to several observers, in insertion order.
#[derive(Default, Clone)]
pub struct ObserverSet {
    observers: Vec<Arc<dyn SessionObserver>>,
}

impl ObserverSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an observer (builder pattern).
    pub fn with(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Number of observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl SessionObserver for ObserverSet {
    fn on_connect(&self, identifier: &str) {
        for observer in &self.observers {
            observer.on_connect(identifier);
        }
    }

    fn on_disconnect(&self, identifier: &str) {
        for observer in &self.observers {
            observer.on_disconnect(identifier);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{BroadcastObserver, SessionEvent};

    #[test]
    fn test_fan_out_preserves_order() {
        let first = BroadcastObserver::new(8);
        let second = BroadcastObserver::new(8);
        let mut first_rx = first.subscribe();
        let mut second_rx = second.subscribe();

        let set = ObserverSet::new()
            .with(Arc::new(TracingObserver))
            .with(Arc::new(first))
            .with(Arc::new(second));
        assert_eq!(set.len(), 3);

        set.on_connect("c1");
        set.on_disconnect("c1");

        for rx in [&mut first_rx, &mut second_rx] {
            assert_eq!(rx.try_recv().unwrap(), SessionEvent::Connected("c1".to_string()));
            assert_eq!(
                rx.try_recv().unwrap(),
                SessionEvent::Disconnected("c1".to_string())
            );
        }
    }
}
