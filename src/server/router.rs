//! HTTP binding of the beat protocol.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::protocol::{rejection_body, BeatRequest};

use super::BeatHandler;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Snapshot of the registry and beat counters.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<String>,
    pub beats_accepted: u64,
    pub beats_rejected: u64,
    pub bootstraps: u64,
}

/// Build the coordinator router with the beat endpoint mounted at `path`.
///
/// The beat endpoint accepts a form body (`POST`) or query string (`GET`).
pub fn create_router(handler: Arc<BeatHandler>, path: &str) -> Router {
    Router::new()
        .route(path, get(beat).post(beat))
        .route("/sessions", get(sessions))
        .route("/health", get(health))
        .with_state(handler)
}

async fn beat(State(handler): State<Arc<BeatHandler>>, Form(request): Form<BeatRequest>) -> Response {
    match handler.handle(&request) {
        Ok(time_key) => (StatusCode::OK, time_key.to_string()).into_response(),
        Err(e) if e.is_rejection() => {
            let request_id = Uuid::new_v4();
            warn!(
                request_id = %request_id,
                identifier = %request.identifier,
                error = %e,
                "Beat rejected"
            );
            (StatusCode::BAD_REQUEST, rejection_body(&e)).into_response()
        }
        Err(e) => {
            warn!(identifier = %request.identifier, error = %e, "Beat failed");
            (StatusCode::INTERNAL_SERVER_ERROR, rejection_body(&e)).into_response()
        }
    }
}

async fn sessions(State(handler): State<Arc<BeatHandler>>) -> Json<SessionsResponse> {
    let metrics = handler.metrics();
    Json(SessionsResponse {
        sessions: handler.registry().identifiers(),
        beats_accepted: metrics.accepted(),
        beats_rejected: metrics.rejected(),
        bootstraps: metrics.bootstrapped(),
    })
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
