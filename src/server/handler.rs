//! Coordinator-side beat validation.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::auth::MessageAuthenticator;
use crate::error::{AuthErrorKind, HeartbeatError, HeartbeatResult};
use crate::protocol::{BeatRequest, TimeKey};
use crate::session::SessionRegistry;

use super::BeatMetrics;

/// Current Unix time in seconds.
pub fn unix_now() -> HeartbeatResult<i64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .map_err(|e| HeartbeatError::Server {
            message: format!("System time error: {}", e),
        })
}

/// Validates beats and issues the next round's time key.
///
/// Stateless per request: the only state touched is the registry, and only
/// for authenticated, fresh beats.
pub struct BeatHandler {
    authenticator: MessageAuthenticator,
    registry: SessionRegistry,
    metrics: Arc<BeatMetrics>,
}

impl BeatHandler {
    /// Create a handler. The freshness window equals the registry timeout.
    pub fn new(
        authenticator: MessageAuthenticator,
        registry: SessionRegistry,
        metrics: Arc<BeatMetrics>,
    ) -> Self {
        Self {
            authenticator,
            registry,
            metrics,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<BeatMetrics> {
        &self.metrics
    }

    /// Handle a beat against the system clock.
    pub fn handle(&self, request: &BeatRequest) -> HeartbeatResult<TimeKey> {
        self.handle_at(request, unix_now()?)
    }

    /// Handle a beat as if the coordinator's clock read `now`.
    ///
    /// Checks:
    /// 1. `messageMAC` tags `{timestamp}:{identifier}`
    /// 2. A non-empty timestamp lies within `[now - timeout, now]`
    ///
    /// An accepted non-bootstrap beat is recorded in the registry before the
    /// next time key is issued.
    pub fn handle_at(&self, request: &BeatRequest, now: i64) -> HeartbeatResult<TimeKey> {
        let result = self.validate(request, now);
        if result.is_err() {
            self.metrics.record_rejected();
        }
        result?;

        if request.is_bootstrap() {
            self.metrics.record_bootstrap();
            debug!(identifier = %request.identifier, "Bootstrap round");
        } else {
            self.metrics.record_accepted();
            let effect = self.registry.record_beat(&request.identifier);
            debug!(identifier = %request.identifier, effect = ?effect, "Beat accepted");
        }

        Ok(TimeKey::issue(now, &self.authenticator))
    }

    fn validate(&self, request: &BeatRequest, now: i64) -> HeartbeatResult<()> {
        if !self.authenticator.verify_identifier(
            &request.timestamp,
            &request.identifier,
            &request.message_mac,
        ) {
            return Err(HeartbeatError::Auth {
                kind: AuthErrorKind::InvalidSignature,
            });
        }

        if request.is_bootstrap() {
            return Ok(());
        }

        let issued = request
            .timestamp
            .parse::<i64>()
            .map_err(|_| HeartbeatError::Auth {
                kind: AuthErrorKind::MalformedTimestamp {
                    value: request.timestamp.clone(),
                },
            })?;

        let window = i64::try_from(self.registry.timeout().as_secs()).unwrap_or(i64::MAX);
        let age = now.saturating_sub(issued);
        if !(0..=window).contains(&age) {
            return Err(HeartbeatError::Auth {
                kind: AuthErrorKind::StaleTimestamp { age_seconds: age },
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::{BroadcastObserver, SessionEvent};
    use std::time::Duration;
    use tokio::sync::broadcast;

    const NOW: i64 = 1_700_000_000;

    fn handler(secret: &[u8]) -> (BeatHandler, broadcast::Receiver<SessionEvent>) {
        let observer = BroadcastObserver::new(16);
        let events = observer.subscribe();
        let registry = SessionRegistry::new(Duration::from_secs(15), Arc::new(observer));
        let handler = BeatHandler::new(
            MessageAuthenticator::new(secret),
            registry,
            Arc::new(BeatMetrics::new()),
        );
        (handler, events)
    }

    fn beat(timestamp: &str, identifier: &str, secret: &[u8]) -> BeatRequest {
        BeatRequest {
            timestamp: timestamp.to_string(),
            identifier: identifier.to_string(),
            message_mac: MessageAuthenticator::new(secret).tag_identifier(timestamp, identifier),
        }
    }

    fn assert_invalid_signature(result: HeartbeatResult<TimeKey>) {
        assert!(matches!(
            result,
            Err(HeartbeatError::Auth {
                kind: AuthErrorKind::InvalidSignature
            })
        ));
    }

    #[tokio::test]
    async fn test_bootstrap_issues_tagged_time_key() {
        let (handler, _events) = handler(b"s");

        let key = handler.handle_at(&beat("", "c1", b"s"), NOW).unwrap();

        assert_eq!(key.value, NOW);
        assert_eq!(key.tag, MessageAuthenticator::new(b"s").tag_time_key("1700000000"));
        assert!(handler.registry().is_empty());
        assert_eq!(handler.metrics().bootstrapped(), 1);
    }

    #[tokio::test]
    async fn test_fresh_beat_connects() {
        let (handler, mut events) = handler(b"s");
        let timestamp = (NOW - 5).to_string();

        let key = handler.handle_at(&beat(&timestamp, "c1", b"s"), NOW).unwrap();

        assert_eq!(key.value, NOW);
        assert!(handler.registry().is_connected("c1"));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Connected("c1".to_string())
        );
        assert_eq!(handler.metrics().accepted(), 1);
    }

    #[tokio::test]
    async fn test_window_edges_accepted() {
        let (handler, _events) = handler(b"s");

        assert!(handler.handle_at(&beat(&NOW.to_string(), "c1", b"s"), NOW).is_ok());
        assert!(handler
            .handle_at(&beat(&(NOW - 15).to_string(), "c1", b"s"), NOW)
            .is_ok());
    }

    #[tokio::test]
    async fn test_tampered_fields_rejected() {
        let (handler, _events) = handler(b"s");
        let timestamp = (NOW - 1).to_string();

        let mut wrong_identifier = beat(&timestamp, "c1", b"s");
        wrong_identifier.identifier = "c2".to_string();
        assert_invalid_signature(handler.handle_at(&wrong_identifier, NOW));

        let mut wrong_timestamp = beat(&timestamp, "c1", b"s");
        wrong_timestamp.timestamp = (NOW - 2).to_string();
        assert_invalid_signature(handler.handle_at(&wrong_timestamp, NOW));

        assert_invalid_signature(handler.handle_at(&beat(&timestamp, "c1", b"other"), NOW));

        let mut empty_mac = beat(&timestamp, "c1", b"s");
        empty_mac.message_mac.clear();
        assert_invalid_signature(handler.handle_at(&empty_mac, NOW));

        assert!(handler.registry().is_empty());
        assert_eq!(handler.metrics().rejected(), 4);
    }

    #[tokio::test]
    async fn test_bootstrap_with_bad_tag_rejected() {
        let (handler, _events) = handler(b"s");
        assert_invalid_signature(handler.handle_at(&beat("", "c1", b"other"), NOW));
    }

    #[tokio::test]
    async fn test_stale_and_future_timestamps_rejected() {
        let (handler, _events) = handler(b"s");

        for (timestamp, expected_age) in [(NOW - 16, 16), (NOW + 1, -1), (0, NOW)] {
            let result = handler.handle_at(&beat(&timestamp.to_string(), "c1", b"s"), NOW);
            match result {
                Err(HeartbeatError::Auth {
                    kind: AuthErrorKind::StaleTimestamp { age_seconds },
                }) => assert_eq!(age_seconds, expected_age),
                other => panic!("expected stale timestamp, got {:?}", other),
            }
        }

        assert!(handler.registry().is_empty());
    }

    #[tokio::test]
    async fn test_non_numeric_timestamp_rejected() {
        let (handler, _events) = handler(b"s");

        let result = handler.handle_at(&beat("yesterday", "c1", b"s"), NOW);
        assert!(result.as_ref().is_err_and(|e| e.is_stale()));
        assert!(handler.registry().is_empty());
    }

    #[tokio::test]
    async fn test_response_round_trip() {
        let (handler, _events) = handler(b"s");
        let auth = MessageAuthenticator::new(b"s");

        let body = handler.handle_at(&beat("", "c1", b"s"), NOW).unwrap().to_string();
        let key = TimeKey::parse_verified(&body, &auth).unwrap();
        assert_eq!(key.value, NOW);

        let tampered = format!("{} {}", key.value - 1, key.tag);
        assert!(TimeKey::parse_verified(&tampered, &auth).is_err());
    }
}
