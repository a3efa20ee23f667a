//! Source (backing store) configuration
//!
//! Selects which store lines are read from. Resolved once at startup.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// In-process store, empty at startup (development)
    #[default]
    Memory,
    /// Elasticsearch/OpenSearch index
    Elasticsearch,
    /// SQLite-compatible database file
    Database,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Elasticsearch => "elasticsearch",
            Self::Database => "database",
        }
    }
}

/// Source configuration
///
/// # Example
///
/// ```toml
/// # Search engine
/// [source]
/// kind = "elasticsearch"
/// url = "http://localhost:9200"
/// index = "logs-*"
/// username = "elastic"
/// password = "changeme"
///
/// # Or a database file written by the ingestion pipeline
/// [source]
/// kind = "database"
/// path = "/var/lib/trail/lines.db"
/// table = "lines"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source kind
    /// Default: memory
    pub kind: SourceKind,

    /// Search engine base URL (elasticsearch)
    pub url: Option<String>,

    /// Index or index pattern (elasticsearch)
    /// Default: "logs"
    pub index: Option<String>,

    /// Basic auth username (elasticsearch)
    pub username: Option<String>,

    /// Basic auth password (elasticsearch)
    pub password: Option<String>,

    /// Database file path (database)
    pub path: Option<PathBuf>,

    /// Table holding the lines (database)
    /// Default: "lines"
    pub table: Option<String>,

    /// Per-request timeout against the store
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Memory,
            url: None,
            index: None,
            username: None,
            password: None,
            path: None,
            table: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SourceConfig {
    /// Get the index name, defaulting to "logs"
    pub fn index(&self) -> String {
        self.index.clone().unwrap_or_else(|| "logs".to_string())
    }

    /// Get the table name, defaulting to "lines"
    pub fn table(&self) -> String {
        self.table.clone().unwrap_or_else(|| "lines".to_string())
    }
}
