//! Trail API
//!
//! HTTP and WebSocket front end for the polling engine.
//!
//! # Usage
//!
//! ```ignore
//! use trail_api::{build_router, AppState};
//!
//! let state = AppState::new(provider, &config.follow);
//! let app = build_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! ```
//!
//! # Endpoints
//!
//! - `GET /` - fetch or follow lines (see [`routes::stream`])
//! - `GET /socket` - WebSocket RPC (`GET`, `SUBSCRIBE`, `UNSUBSCRIBE`)
//! - `GET /health` - status, source kind and live subscription count

pub mod connection;
pub mod error;
pub mod routes;
pub mod rpc;
pub mod state;

// Re-exports
pub use connection::{Connection, Outbound};
pub use error::{ApiError, Result};
pub use routes::build_router;
pub use state::AppState;
