//! Session tracking module.
//!
//! One session per connected identifier, each owned by its own drain task
//! that tears the session down once the identifier goes silent.

mod drain;
mod observer;
mod registry;

pub use observer::SessionObserver;
pub use registry::{BeatEffect, SessionRegistry};
