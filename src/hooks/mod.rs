//! Session observers.
//!
//! Implementations of [`SessionObserver`](crate::session::SessionObserver)
//! used by the coordinator daemon and by embedders.

mod broadcast;
mod command;
mod logging;

pub use broadcast::{BroadcastObserver, SessionEvent};
pub use command::{CommandObserver, HookCommand, HookOutput};
pub use logging::{ObserverSet, TracingObserver};
