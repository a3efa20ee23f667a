//! Operations routes
//!
//! Health check for monitoring. No authentication.

use axum::{Json, Router, extract::State, routing::get};
use serde::Serialize;

use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Server status
    pub status: &'static str,
    /// Backing store kind
    pub source: &'static str,
    /// Live subscriptions across all connections
    pub subscriptions: usize,
    /// Size of the shared poll worker pool
    pub poll_threads: usize,
    /// Uptime in seconds
    pub uptime_secs: u64,
}

/// Operations routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_handler))
}

/// Health check endpoint
///
/// GET /health
///
/// Always returns 200 OK while the server is running.
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let subscriptions = state.subscriptions();
    let status = if subscriptions.is_shut_down() {
        "shutting_down"
    } else {
        "ok"
    };

    Json(HealthResponse {
        status,
        source: state.provider.source().name(),
        subscriptions: subscriptions.len(),
        poll_threads: subscriptions.poll_threads(),
        uptime_secs: state.uptime_secs(),
    })
}
