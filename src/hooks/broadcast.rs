//! Broadcast-channel observer.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::session::SessionObserver;

/// Session lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "identifier")]
pub enum SessionEvent {
    #[serde(rename = "session:connected")]
    Connected(String),
    #[serde(rename = "session:disconnected")]
    Disconnected(String),
}

/// Publishes [`SessionEvent`]s to any number of subscribers.
///
/// Sending never blocks; slow subscribers observe `Lagged` instead of
/// holding up the registry.
#[derive(Debug, Clone)]
pub struct BroadcastObserver {
    tx: broadcast::Sender<SessionEvent>,
}

impl BroadcastObserver {
    /// Create an observer buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.tx.send(event);
    }
}

impl SessionObserver for BroadcastObserver {
    fn on_connect(&self, identifier: &str) {
        self.publish(SessionEvent::Connected(identifier.to_string()));
    }

    fn on_disconnect(&self, identifier: &str) {
        self.publish(SessionEvent::Disconnected(identifier.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers() {
        let observer = BroadcastObserver::new(4);
        observer.on_connect("c1");
        let mut rx = observer.subscribe();
        observer.on_disconnect("c1");
        assert_eq!(
            rx.try_recv().unwrap(),
            SessionEvent::Disconnected("c1".to_string())
        );
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(SessionEvent::Connected("c1".to_string())).unwrap();
        assert_eq!(json["type"], "session:connected");
        assert_eq!(json["identifier"], "c1");
    }
}
