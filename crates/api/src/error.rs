//! API error types
//!
//! Provides structured error responses for the HTTP endpoints.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use trail_follow::FollowError;
use trail_source::SourceError;

/// API errors
#[derive(Debug, Error)]
pub enum ApiError {
    /// A query parameter could not be decoded
    #[error("invalid parameter '{param}': {message}")]
    InvalidParam { param: String, message: String },

    /// Backing store failed
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Subscription registry no longer accepts work
    #[error("server is shutting down")]
    Unavailable,

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidParam { .. } => StatusCode::BAD_REQUEST,
            Self::Source(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParam { .. } => "INVALID_PARAM",
            Self::Source(_) => "SOURCE_ERROR",
            Self::Unavailable => "UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Create an invalid parameter error
    pub fn invalid_param(param: &str, message: impl Into<String>) -> Self {
        Self::InvalidParam {
            param: param.to_string(),
            message: message.into(),
        }
    }
}

impl From<FollowError> for ApiError {
    fn from(err: FollowError) -> Self {
        match err {
            FollowError::Source(e) => Self::Source(e),
            FollowError::ShutDown => Self::Unavailable,
            FollowError::SinkClosed => Self::internal("result sink closed"),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code (machine-readable)
    pub error: &'static str,
    /// Error message (human-readable)
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.code(),
            message: self.to_string(),
        };

        tracing::warn!(
            error_code = body.error,
            error_message = %body.message,
            status = %status,
            "API error"
        );

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
