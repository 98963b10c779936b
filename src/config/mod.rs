//! Configuration module for the heartbeat daemon.
//!
//! Handles loading and validating configuration from TOML files.

mod settings;

pub use settings::*;
