//! Coordinator module.
//!
//! Validates inbound beats, drives the session registry, and serves the
//! beat endpoint over HTTP.

mod handler;
mod listener;
mod metrics;
mod router;

pub use handler::{unix_now, BeatHandler};
pub use listener::CoordinatorServer;
pub use metrics::BeatMetrics;
pub use router::{create_router, HealthResponse, SessionsResponse};
