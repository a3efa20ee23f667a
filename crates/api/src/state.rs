//! Application state
//!
//! Shared state for the HTTP and WebSocket handlers.

use std::sync::Arc;
use std::time::Instant;

use trail_config::FollowConfig;
use trail_follow::{DataProvider, Subscriptions};

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    /// Pagination and tailing over the configured source
    pub provider: Arc<DataProvider>,
    /// Upper bound on lines returned by one non-follow request
    pub max_lines: usize,
    /// Capacity of each connection's outbound channel
    pub channel_capacity: usize,
    /// Server start time for uptime calculation
    pub started_at: Instant,
}

impl AppState {
    pub fn new(provider: Arc<DataProvider>, config: &FollowConfig) -> Self {
        Self {
            provider,
            max_lines: config.max_lines,
            channel_capacity: config.channel_capacity.max(1),
            started_at: Instant::now(),
        }
    }

    pub fn subscriptions(&self) -> &Arc<Subscriptions> {
        self.provider.subscriptions()
    }

    /// Clamp a requested line count to the configured maximum
    pub fn line_limit(&self, requested: Option<usize>) -> usize {
        requested.map_or(self.max_lines, |n| n.min(self.max_lines))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
