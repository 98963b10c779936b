//! Concurrent identifier → session map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info};

use super::drain::{deadline_after, Session};
use super::SessionObserver;

/// What a call to [`SessionRegistry::record_beat`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatEffect {
    /// No session existed; one was created and its drain task spawned.
    Connected,
    /// A liveness signal was queued for the existing session.
    Refreshed,
    /// A signal was already pending, so this one was dropped.
    Coalesced,
}

/// Registry-side handle to a session owned by its drain task.
struct SessionHandle {
    session_id: u64,
    signal: mpsc::Sender<()>,
}

struct Inner {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    timeout: Duration,
    observer: Arc<dyn SessionObserver>,
    next_session_id: AtomicU64,
}

/// Maps identifiers to live sessions and fires connect/disconnect
/// notifications.
///
/// Cloning is cheap; clones share the same map.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

impl SessionRegistry {
    /// Create an empty registry whose sessions expire after `timeout` of
    /// silence.
    pub fn new(timeout: Duration, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            inner: Arc::new(Inner {
                sessions: Mutex::new(HashMap::new()),
                timeout,
                observer,
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    /// Session timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Record a liveness signal for an already-authenticated identifier.
    ///
    /// Never blocks on a session's drain task: an existing session gets a
    /// best-effort signal, a missing one is created and its drain task is
    /// spawned onto the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn record_beat(&self, identifier: &str) -> BeatEffect {
        let mut sessions = self.lock();

        if let Some(handle) = sessions.get(identifier) {
            return match handle.signal.try_send(()) {
                Ok(()) => {
                    debug!(identifier = %identifier, "beat");
                    BeatEffect::Refreshed
                }
                Err(TrySendError::Full(())) | Err(TrySendError::Closed(())) => {
                    debug!(identifier = %identifier, "Liveness signal already pending, dropped");
                    BeatEffect::Coalesced
                }
            };
        }

        let session_id = self.inner.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (signal, signals) = mpsc::channel(1);
        let session = Session::new(
            identifier.to_string(),
            session_id,
            self.inner.timeout,
            deadline_after(self.inner.timeout),
            signals,
        );
        sessions.insert(identifier.to_string(), SessionHandle { session_id, signal });
        self.inner.observer.on_connect(identifier);

        info!(
            identifier = %identifier,
            sessions = sessions.len(),
            "Session opened"
        );

        tokio::spawn(session.drain(self.clone()));
        BeatEffect::Connected
    }

    /// Whether `identifier` currently has a live session.
    pub fn is_connected(&self, identifier: &str) -> bool {
        self.lock().contains_key(identifier)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifiers with a live session, sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self.lock().keys().cloned().collect();
        identifiers.sort();
        identifiers
    }

    /// Remove an expired session unless a signal raced in before the lock.
    ///
    /// Returns `false` when the session was revived and must keep draining.
    pub(super) fn teardown(&self, session: &mut Session) -> bool {
        let mut sessions = self.lock();

        if session.take_pending_signal() {
            return false;
        }

        let owned = sessions
            .get(session.identifier())
            .is_some_and(|h| h.session_id == session.session_id());
        if owned {
            sessions.remove(session.identifier());
            info!(
                identifier = %session.identifier(),
                sessions = sessions.len(),
                "Session closed"
            );
            self.inner.observer.on_disconnect(session.identifier());
        }

        true
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionHandle>> {
        // Recover from mutex poisoning: a panicking observer must not wedge
        // every later beat.
        self.inner
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("timeout", &self.inner.timeout)
            .field("sessions", &self.len())
            .finish()
    }
}
