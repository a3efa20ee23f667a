//! Source error types

/// Errors that can occur while fetching from a backing store
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Source misconfigured
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend unreachable
    #[error("connection failed: {0}")]
    Connection(String),

    /// Backend rejected or failed the query
    #[error("query execution failed: {0}")]
    Execution(String),

    /// Response or stored record could not be decoded
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Embedded database error
    #[error("database error: {0}")]
    Database(#[from] turso::Error),

    /// Source was closed
    #[error("source is closed")]
    Closed,
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Serialization(err.to_string())
    }
}

/// Result type for source operations
pub type Result<T> = std::result::Result<T, SourceError>;
