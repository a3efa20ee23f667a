//! Follow error types

use thiserror::Error;
use trail_source::SourceError;

/// Errors from the polling engine
#[derive(Debug, Error)]
pub enum FollowError {
    /// Backing store failed
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Consumer went away
    #[error("result sink closed")]
    SinkClosed,

    /// Registry no longer accepts work
    #[error("subscription registry is shut down")]
    ShutDown,
}

/// Result type for follow operations
pub type Result<T> = std::result::Result<T, FollowError>;
