//! API routes
//!
//! - `GET /` streams or returns lines over plain HTTP
//! - `GET /socket` upgrades to the WebSocket RPC channel
//! - `GET /health` reports status

pub mod ops;
pub mod socket;
pub mod stream;

use axum::Router;
use axum::routing::get;

use crate::state::AppState;

/// Build the complete router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(ops::routes())
        .route("/", get(stream::stream_handler))
        .route("/socket", get(socket::socket_handler))
        .with_state(state)
}
