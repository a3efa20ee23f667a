//! Configuration validation
//!
//! Validates config consistency:
//! - The selected source has its connection settings
//! - Pool and fetch sizes are non-zero and ordered
//! - Backoff durations are non-zero

use crate::Config;
use crate::error::{ConfigError, Result};
use crate::source::SourceKind;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_source(config)?;
    validate_follow(config)?;
    Ok(())
}

fn validate_source(config: &Config) -> Result<()> {
    let source = &config.source;

    match source.kind {
        SourceKind::Memory => {}
        SourceKind::Elasticsearch => {
            if source.url.as_deref().is_none_or(str::is_empty) {
                return Err(ConfigError::missing_field("source", "elasticsearch", "url"));
            }
        }
        SourceKind::Database => {
            if source.path.is_none() {
                return Err(ConfigError::missing_field("source", "database", "path"));
            }
            let table = source.table();
            if !table.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ConfigError::invalid_value(
                    "source",
                    "table",
                    format!("'{}' is not a plain identifier", table),
                ));
            }
        }
    }

    if source.request_timeout.is_zero() {
        return Err(ConfigError::invalid_value(
            "source",
            "request_timeout",
            "must be greater than zero",
        ));
    }

    Ok(())
}

fn validate_follow(config: &Config) -> Result<()> {
    let follow = &config.follow;

    if follow.poll_threads == 0 {
        return Err(ConfigError::invalid_value(
            "follow",
            "poll_threads",
            "must be at least 1",
        ));
    }

    if follow.default_fetch_size == 0 || follow.max_fetch_size == 0 {
        return Err(ConfigError::invalid_value(
            "follow",
            "fetch_size",
            "fetch sizes must be at least 1",
        ));
    }

    if follow.default_fetch_size > follow.max_fetch_size {
        return Err(ConfigError::invalid_value(
            "follow",
            "default_fetch_size",
            format!(
                "{} exceeds max_fetch_size {}",
                follow.default_fetch_size, follow.max_fetch_size
            ),
        ));
    }

    if follow.channel_capacity == 0 {
        return Err(ConfigError::invalid_value(
            "follow",
            "channel_capacity",
            "must be at least 1",
        ));
    }

    let backoff = &follow.backoff;
    for (field, value) in [
        ("backoff.delay", backoff.delay),
        ("backoff.timeout", backoff.timeout),
        ("backoff.poll_interval", backoff.poll_interval),
    ] {
        if value.is_zero() {
            return Err(ConfigError::invalid_value(
                "follow",
                field,
                "must be greater than zero",
            ));
        }
    }

    if backoff.max_backoff_cycles < 0 {
        return Err(ConfigError::invalid_value(
            "follow",
            "backoff.max_backoff_cycles",
            "must not be negative",
        ));
    }

    Ok(())
}
