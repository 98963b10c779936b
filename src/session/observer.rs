//! Connect/disconnect notification capability.

/// Receives session lifecycle notifications from a [`SessionRegistry`].
///
/// Both methods are invoked synchronously while the registry lock is held,
/// so notification order matches the order in which sessions are inserted
/// and removed. Implementations must return promptly and must not call back
/// into the registry; doing so deadlocks the coordinator.
///
/// [`SessionRegistry`]: super::SessionRegistry
pub trait SessionObserver: Send + Sync {
    /// The first fresh, authenticated beat arrived for `identifier`.
    fn on_connect(&self, identifier: &str);

    /// `identifier` stayed silent for the whole session timeout.
    fn on_disconnect(&self, identifier: &str);
}
