//! Beat counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Beat counters for monitoring.
#[derive(Debug, Default)]
pub struct BeatMetrics {
    /// Fresh, authenticated beats that reached the registry.
    pub beats_accepted: AtomicU64,
    /// Bootstrap rounds that only issued a time key.
    pub bootstraps: AtomicU64,
    /// Beats rejected for a bad tag or a stale time key.
    pub beats_rejected: AtomicU64,
}

impl BeatMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_accepted(&self) {
        self.beats_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bootstrap(&self) {
        self.bootstraps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected(&self) {
        self.beats_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accepted(&self) -> u64 {
        self.beats_accepted.load(Ordering::Relaxed)
    }

    pub fn bootstrapped(&self) -> u64 {
        self.bootstraps.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.beats_rejected.load(Ordering::Relaxed)
    }
}
