//! Initiator-side beat loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::auth::MessageAuthenticator;
use crate::config::{BootstrapPolicy, InitiatorConfig};
use crate::error::{HeartbeatError, HeartbeatResult};
use crate::protocol::{BeatRequest, TimeKey};

use super::{BeatTransport, HttpTransport};

/// How a beat loop ended.
#[derive(Debug)]
pub enum BeatOutcome {
    /// [`BeatHandle::cancel`] was called.
    Cancelled,
    /// A bootstrap round failed under [`BootstrapPolicy::Stop`]. This is
    /// either the first round, so no beat was ever sent, or a re-bootstrap
    /// after a failed steady-state beat.
    BootstrapFailed(HeartbeatError),
}

/// Cloneable cancellation side of a [`BeatHandle`].
#[derive(Debug, Clone)]
pub struct BeatCanceller {
    cancel: Arc<watch::Sender<bool>>,
}

impl BeatCanceller {
    /// Ask the loop to stop. Takes effect at the next wait; an in-flight
    /// request is not interrupted.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }
}

/// Control handle for a running beat loop.
///
/// Dropping the handle detaches the loop; it keeps beating.
pub struct BeatHandle {
    canceller: BeatCanceller,
    task: JoinHandle<BeatOutcome>,
}

impl BeatHandle {
    /// See [`BeatCanceller::cancel`].
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn canceller(&self) -> BeatCanceller {
        self.canceller.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop to end.
    pub async fn join(self) -> Result<BeatOutcome, JoinError> {
        self.task.await
    }
}

/// Beats for one identifier against one coordinator.
pub struct Initiator<T = HttpTransport> {
    identifier: String,
    authenticator: MessageAuthenticator,
    transport: T,
    bootstrap_policy: BootstrapPolicy,
}

impl Initiator<HttpTransport> {
    /// Build an HTTP initiator from the `[initiator]` section.
    pub fn from_config(config: &InitiatorConfig, secret: &[u8]) -> HeartbeatResult<Self> {
        let transport = HttpTransport::new(&config.coordinator_url, config.request_timeout())?;
        Ok(Self::new(
            config.identifier.clone(),
            MessageAuthenticator::new(secret),
            transport,
        )
        .with_bootstrap_policy(config.bootstrap_failure))
    }
}

impl<T: BeatTransport> Initiator<T> {
    pub fn new(
        identifier: impl Into<String>,
        authenticator: MessageAuthenticator,
        transport: T,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            authenticator,
            transport,
            bootstrap_policy: BootstrapPolicy::default(),
        }
    }

    /// Set what happens when the first round fails (builder pattern).
    pub fn with_bootstrap_policy(mut self, policy: BootstrapPolicy) -> Self {
        self.bootstrap_policy = policy;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Send one beat and return the verified time key for the next round.
    ///
    /// `None` sends a bootstrap beat, which only obtains a time key.
    pub async fn beat_once(&self, time_key: Option<&TimeKey>) -> HeartbeatResult<TimeKey> {
        let request = BeatRequest::signed(time_key, &self.identifier, &self.authenticator);
        let body = self.transport.send(&request).await?;
        TimeKey::parse_verified(&body, &self.authenticator)
    }

    /// Spawn the beat loop onto the current runtime.
    pub fn start(self, every: Duration) -> BeatHandle {
        let (tx, rx) = watch::channel(false);
        let cancel = Arc::new(tx);
        // The task holds a sender too, so a dropped handle never reads as a
        // cancellation.
        let keep_alive = Arc::clone(&cancel);
        let task = tokio::spawn(async move {
            let _keep_alive = keep_alive;
            self.run(every, rx).await
        });
        BeatHandle {
            canceller: BeatCanceller { cancel },
            task,
        }
    }

    async fn run(self, every: Duration, mut cancel: watch::Receiver<bool>) -> BeatOutcome {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            if *cancel.borrow() {
                return BeatOutcome::Cancelled;
            }

            let time_key = match self.beat_once(None).await {
                Ok(time_key) => time_key,
                Err(e) => match self.bootstrap_policy {
                    BootstrapPolicy::Stop => {
                        error!(
                            identifier = %self.identifier,
                            error = %e,
                            "Bootstrap failed, beat loop stopped"
                        );
                        return BeatOutcome::BootstrapFailed(e);
                    }
                    BootstrapPolicy::Retry => {
                        warn!(
                            identifier = %self.identifier,
                            error = %e,
                            "Bootstrap failed, retrying"
                        );
                        if wait_tick(&mut ticker, &mut cancel).await {
                            return BeatOutcome::Cancelled;
                        }
                        continue;
                    }
                },
            };
            info!(identifier = %self.identifier, time_key = time_key.value, "Bootstrapped");

            match self.beat_loop(time_key, &mut ticker, &mut cancel).await {
                Ok(()) => return BeatOutcome::Cancelled,
                Err(e) => {
                    warn!(
                        identifier = %self.identifier,
                        error = %e,
                        "Beat failed, reconnecting"
                    );
                    // Pace re-bootstraps so a coordinator that keeps
                    // rejecting beats is not hammered.
                    if wait_tick(&mut ticker, &mut cancel).await {
                        return BeatOutcome::Cancelled;
                    }
                }
            }
        }
    }

    /// Beat until cancelled (`Ok`) or until a round fails (`Err`).
    async fn beat_loop(
        &self,
        mut time_key: TimeKey,
        ticker: &mut Interval,
        cancel: &mut watch::Receiver<bool>,
    ) -> HeartbeatResult<()> {
        loop {
            let next = self.beat_once(Some(&time_key)).await?;
            time_key = next;
            debug!(identifier = %self.identifier, time_key = time_key.value, "Beat sent");

            if wait_tick(ticker, cancel).await {
                return Ok(());
            }
        }
    }
}

/// Wait for the next tick. Returns `true` if cancellation was requested.
async fn wait_tick(ticker: &mut Interval, cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = ticker.tick() => *cancel.borrow(),
        changed = cancel.changed() => changed.is_ok() && *cancel.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolErrorKind;
    use crate::hooks::TracingObserver;
    use crate::protocol::rejection_body;
    use crate::server::{BeatHandler, BeatMetrics};
    use crate::session::SessionRegistry;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const INTERVAL: Duration = Duration::from_secs(5);

    /// Calls the coordinator handler directly, with switchable faults.
    struct LocalTransport {
        handler: BeatHandler,
        down: AtomicBool,
        fail_next: AtomicUsize,
        forge_next: AtomicBool,
        calls: AtomicUsize,
    }

    impl LocalTransport {
        fn new(secret: &[u8]) -> Arc<Self> {
            let registry = SessionRegistry::new(Duration::from_secs(15), Arc::new(TracingObserver));
            Arc::new(Self {
                handler: BeatHandler::new(
                    MessageAuthenticator::new(secret),
                    registry,
                    Arc::new(BeatMetrics::new()),
                ),
                down: AtomicBool::new(false),
                fail_next: AtomicUsize::new(0),
                forge_next: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            })
        }

        fn metrics(&self) -> &BeatMetrics {
            self.handler.metrics()
        }

        fn registry(&self) -> &SessionRegistry {
            self.handler.registry()
        }
    }

    impl BeatTransport for Arc<LocalTransport> {
        async fn send(&self, request: &BeatRequest) -> HeartbeatResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(HeartbeatError::Transport {
                    message: "connection refused".to_string(),
                });
            }
            let pending = self.fail_next.load(Ordering::SeqCst);
            if pending > 0 {
                self.fail_next.store(pending - 1, Ordering::SeqCst);
                return Err(HeartbeatError::Transport {
                    message: "connection reset".to_string(),
                });
            }

            let mut time_key = self
                .handler
                .handle(request)
                .map_err(|e| HeartbeatError::Transport {
                    message: rejection_body(&e).to_string(),
                })?;
            if self.forge_next.swap(false, Ordering::SeqCst) {
                time_key.value += 60;
            }
            Ok(time_key.to_string())
        }
    }

    fn initiator(transport: &Arc<LocalTransport>, secret: &[u8]) -> Initiator<Arc<LocalTransport>> {
        Initiator::new("c1", MessageAuthenticator::new(secret), Arc::clone(transport))
    }

    #[tokio::test]
    async fn test_beat_once_bootstrap_then_beat() {
        let transport = LocalTransport::new(b"s");
        let initiator = initiator(&transport, b"s");

        let key = initiator.beat_once(None).await.unwrap();
        assert!(transport.registry().is_empty());

        let next = initiator.beat_once(Some(&key)).await.unwrap();
        assert!(next.value >= key.value);
        assert!(transport.registry().is_connected("c1"));
    }

    #[tokio::test]
    async fn test_beat_once_rejects_forged_time_key() {
        let transport = LocalTransport::new(b"s");
        let initiator = initiator(&transport, b"s");
        transport.forge_next.store(true, Ordering::SeqCst);

        let result = initiator.beat_once(None).await;
        assert!(matches!(
            result,
            Err(HeartbeatError::Protocol {
                kind: ProtocolErrorKind::TimeKeyMismatch
            })
        ));
    }

    #[tokio::test]
    async fn test_beat_once_surfaces_rejection_body() {
        let transport = LocalTransport::new(b"s");
        let initiator = initiator(&transport, b"wrong");

        match initiator.beat_once(None).await {
            Err(HeartbeatError::Transport { message }) => assert_eq!(message, "messageMAC wrong"),
            other => panic!("expected transport error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_state_keeps_session_alive() {
        let transport = LocalTransport::new(b"s");
        let handle = initiator(&transport, b"s").start(INTERVAL);

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(transport.registry().is_connected("c1"));
        assert_eq!(transport.metrics().bootstrapped(), 1);
        assert!(transport.metrics().accepted() >= 12);
        assert_eq!(transport.metrics().rejected(), 0);

        handle.cancel();
        assert!(matches!(handle.join().await.unwrap(), BeatOutcome::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_beats() {
        let transport = LocalTransport::new(b"s");
        let handle = initiator(&transport, b"s").start(INTERVAL);

        tokio::time::sleep(Duration::from_secs(12)).await;
        handle.cancel();
        assert!(matches!(handle.join().await.unwrap(), BeatOutcome::Cancelled));

        let calls = transport.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.calls.load(Ordering::SeqCst), calls);
        assert!(!transport.registry().is_connected("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_failure_is_terminal_by_default() {
        let transport = LocalTransport::new(b"s");
        transport.down.store(true, Ordering::SeqCst);
        let handle = initiator(&transport, b"s").start(INTERVAL);

        let outcome = handle.join().await.unwrap();
        assert!(matches!(
            outcome,
            BeatOutcome::BootstrapFailed(HeartbeatError::Transport { .. })
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_rebootstrap_stops_loop() {
        let transport = LocalTransport::new(b"s");
        let handle = initiator(&transport, b"s").start(INTERVAL);

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert!(transport.registry().is_connected("c1"));
        transport.down.store(true, Ordering::SeqCst);

        let outcome = handle.join().await.unwrap();
        assert!(matches!(
            outcome,
            BeatOutcome::BootstrapFailed(HeartbeatError::Transport { .. })
        ));
        assert_eq!(transport.metrics().bootstrapped(), 1);
        assert!(transport.metrics().accepted() >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_retry_policy() {
        let transport = LocalTransport::new(b"s");
        transport.down.store(true, Ordering::SeqCst);
        let handle = initiator(&transport, b"s")
            .with_bootstrap_policy(BootstrapPolicy::Retry)
            .start(INTERVAL);

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(!handle.is_finished());
        assert!(transport.calls.load(Ordering::SeqCst) >= 3);

        transport.down.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(transport.registry().is_connected("c1"));

        handle.cancel();
        assert!(matches!(handle.join().await.unwrap(), BeatOutcome::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_steady_state_failure_rebootstraps() {
        let transport = LocalTransport::new(b"s");
        let handle = initiator(&transport, b"s").start(INTERVAL);

        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(transport.metrics().bootstrapped(), 1);

        transport.fail_next.store(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(12)).await;

        assert_eq!(transport.metrics().bootstrapped(), 2);
        assert!(!handle.is_finished());
        assert!(transport.registry().is_connected("c1"));

        handle.cancel();
        handle.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_forged_response_rebootstraps() {
        let transport = LocalTransport::new(b"s");
        let handle = initiator(&transport, b"s").start(INTERVAL);

        tokio::time::sleep(Duration::from_secs(7)).await;
        transport.forge_next.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(12)).await;

        assert_eq!(transport.metrics().bootstrapped(), 2);
        assert!(!handle.is_finished());

        handle.cancel();
        handle.join().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_keeps_beating() {
        let transport = LocalTransport::new(b"s");
        drop(initiator(&transport, b"s").start(INTERVAL));

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(transport.metrics().accepted() >= 4);
    }
}
