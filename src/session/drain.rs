//! Per-session drain loop.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use super::SessionRegistry;

/// Stand-in deadline for timeouts too large to add to `Instant::now()`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, saturating at [`FAR_FUTURE`] instead of panicking.
pub(super) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Liveness state for one identifier, exclusively owned by its drain task.
///
/// The drain task is the only reader of `signals` and the only writer of
/// the deadline; the registry just sends signals.
pub(super) struct Session {
    identifier: String,
    session_id: u64,
    timeout: Duration,
    deadline: Instant,
    signals: mpsc::Receiver<()>,
}

impl Session {
    pub(super) fn new(
        identifier: String,
        session_id: u64,
        timeout: Duration,
        deadline: Instant,
        signals: mpsc::Receiver<()>,
    ) -> Self {
        Self {
            identifier,
            session_id,
            timeout,
            deadline,
            signals,
        }
    }

    pub(super) fn identifier(&self) -> &str {
        &self.identifier
    }

    pub(super) fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Consume a signal that arrived after the deadline fired, extending the
    /// deadline if there was one.
    pub(super) fn take_pending_signal(&mut self) -> bool {
        if self.signals.try_recv().is_ok() {
            self.extend();
            true
        } else {
            false
        }
    }

    fn extend(&mut self) {
        self.deadline = deadline_after(self.timeout);
    }

    /// Wait for liveness signals until the deadline passes, then remove the
    /// session from `registry`.
    pub(super) async fn drain(mut self, registry: SessionRegistry) {
        debug!(identifier = %self.identifier, session_id = self.session_id, "Drain started");

        loop {
            tokio::select! {
                signal = self.signals.recv() => {
                    if signal.is_none() {
                        // Only teardown drops the sender.
                        break;
                    }
                    self.extend();
                    debug!(
                        identifier = %self.identifier,
                        timeout_ms = self.timeout.as_millis() as u64,
                        "Timer reset"
                    );
                }
                _ = sleep_until(self.deadline) => {
                    debug!(identifier = %self.identifier, "Time up");
                    if registry.teardown(&mut self) {
                        break;
                    }
                }
            }
        }

        debug!(identifier = %self.identifier, session_id = self.session_id, "Drain finished");
    }
}
