//! Heartbeat Daemon Library
//!
//! This crate tracks the liveness of remote peers through periodic,
//! HMAC-authenticated heartbeats. A coordinator keeps one session per peer
//! identifier and reports connects and disconnects; initiators beat at a
//! fixed interval using a single-round time key issued by the coordinator
//! for replay protection.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod session;
