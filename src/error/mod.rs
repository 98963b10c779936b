//! Error types for the heartbeat daemon.
//!
//! Provides a unified error handling system using thiserror.

mod types;

pub use types::*;
