//! Follow (tailing) configuration
//!
//! Sizes the shared poll worker pool and tunes per-subscription backoff.

use std::time::Duration;

use serde::Deserialize;

/// Backoff tunables applied to every subscription
///
/// # Example
///
/// ```toml
/// [follow.backoff]
/// delay = "1s"              # unit used to compute skipped cycles
/// max_backoff_cycles = 30   # cap on consecutive skipped cycles
/// timeout = "10m"           # inactivity before a subscription cancels itself
/// poll_interval = "1s"      # fixed-rate tick period
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackoffSettings {
    /// Base unit for computing the skip count
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub delay: Duration,

    /// Cap on consecutive skipped ticks
    /// Default: 30
    pub max_backoff_cycles: i64,

    /// Inactivity threshold before self-cancel
    /// Default: 10m
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Fixed-rate tick period
    /// Default: 1s
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for BackoffSettings {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_backoff_cycles: 30,
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_secs(1),
        }
    }
}

/// Follow configuration
///
/// # Example
///
/// ```toml
/// [follow]
/// poll_threads = 4           # concurrent store queries across all clients
/// default_fetch_size = 100
/// max_fetch_size = 1000
/// max_lines = 10000          # cap on non-follow HTTP responses
/// channel_capacity = 256     # per-stream delivery buffer
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FollowConfig {
    /// Worker pool size
    /// Default: 4
    pub poll_threads: usize,

    /// Fetch size when a request doesn't name one
    /// Default: 100
    pub default_fetch_size: usize,

    /// Upper bound for requested fetch sizes
    /// Default: 1000
    pub max_fetch_size: usize,

    /// Upper bound for lines returned by a non-follow HTTP request
    /// Default: 10000
    pub max_lines: usize,

    /// Buffered lines between a worker and a connection
    /// Default: 256
    pub channel_capacity: usize,

    /// Backoff tunables
    pub backoff: BackoffSettings,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            poll_threads: 4,
            default_fetch_size: 100,
            max_fetch_size: 1000,
            max_lines: 10_000,
            channel_capacity: 256,
            backoff: BackoffSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = FollowConfig::default();
        assert_eq!(config.poll_threads, 4);
        assert_eq!(config.default_fetch_size, 100);
        assert_eq!(config.max_fetch_size, 1000);
        assert_eq!(config.backoff.delay, Duration::from_secs(1));
        assert_eq!(config.backoff.timeout, Duration::from_secs(600));
    }

    #[test]
    fn test_backoff_durations() {
        for (s, expected) in [
            ("100ms", Duration::from_millis(100)),
            ("1s", Duration::from_secs(1)),
            ("5m", Duration::from_secs(300)),
        ] {
            let toml = format!("[backoff]\npoll_interval = \"{}\"", s);
            let config: FollowConfig = toml::from_str(&toml).unwrap();
            assert_eq!(config.backoff.poll_interval, expected);
        }
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config: FollowConfig = toml::from_str("poll_threads = 2").unwrap();
        assert_eq!(config.poll_threads, 2);
        assert_eq!(config.max_lines, 10_000);
        assert_eq!(config.backoff.max_backoff_cycles, 30);
    }
}
