//! Trail Configuration
//!
//! TOML-based configuration loading with sensible defaults.
//! An empty file is a valid config: in-memory source, port 8080, four poll workers.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use trail_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[server]\nport = 9000").unwrap();
//! assert_eq!(config.server.port, 9000);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [log]
//! level = "debug"
//!
//! [server]
//! host = "0.0.0.0"
//! port = 8080
//!
//! [source]
//! kind = "elasticsearch"
//! url = "http://localhost:9200"
//! index = "logs-*"
//!
//! [follow]
//! poll_threads = 4
//! default_fetch_size = 100
//!
//! [follow.backoff]
//! delay = "1s"
//! max_backoff_cycles = 30
//! timeout = "10m"
//! poll_interval = "1s"
//! ```

mod error;
mod follow;
mod logging;
mod server;
mod source;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use error::{ConfigError, Result};
pub use follow::{BackoffSettings, FollowConfig};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use server::ServerConfig;
pub use source::{SourceConfig, SourceKind};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,

    /// HTTP/WebSocket listener
    pub server: ServerConfig,

    /// Backing store the lines are read from
    pub source: SourceConfig,

    /// Worker pool, fetch sizes and backoff tuning
    pub follow: FollowConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or contains invalid TOML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Checks that the selected source has its connection settings and that
    /// the follow tunables are usable.
    fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use std::time::Duration;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_str("").unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.source.kind, SourceKind::Memory);
        assert_eq!(config.follow.poll_threads, 4);
    }

    #[test]
    fn test_full_config_parse() {
        let toml = r#"
[log]
level = "debug"
format = "json"

[server]
host = "127.0.0.1"
port = 9090

[source]
kind = "database"
path = "/var/lib/trail/lines.db"
table = "log_lines"

[follow]
poll_threads = 8
default_fetch_size = 50
max_fetch_size = 500
max_lines = 2000

[follow.backoff]
delay = "250ms"
max_backoff_cycles = 12
timeout = "2m"
poll_interval = "500ms"
"#;
        let config = Config::from_str(toml).unwrap();

        assert_eq!(config.log.level, LogLevel::Debug);
        assert_eq!(config.log.format, LogFormat::Json);
        assert_eq!(config.server.addr(), "127.0.0.1:9090");
        assert_eq!(config.source.kind, SourceKind::Database);
        assert_eq!(config.source.table(), "log_lines");
        assert_eq!(config.follow.poll_threads, 8);
        assert_eq!(config.follow.max_lines, 2000);
        assert_eq!(config.follow.backoff.delay, Duration::from_millis(250));
        assert_eq!(config.follow.backoff.max_backoff_cycles, 12);
        assert_eq!(config.follow.backoff.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_invalid_toml() {
        let result = Config::from_str("invalid { toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_runs_on_parse() {
        let result = Config::from_str("[follow]\npoll_threads = 0");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::from_file("/nonexistent/trail.toml");
        assert!(matches!(result, Err(ConfigError::IoError { .. })));
    }
}
