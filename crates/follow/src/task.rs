//! Scheduled polling tasks

use async_trait::async_trait;
use trail_source::Line;

use crate::error::Result;
use crate::sink::ResultSink;

/// State threaded through every run of one subscription
pub struct TaskParameters {
    /// Last delivered line, if any
    pub cursor: Option<Line>,
    pub sink: ResultSink,
}

impl TaskParameters {
    pub fn new(cursor: Option<Line>, sink: ResultSink) -> Self {
        Self { cursor, sink }
    }
}

/// Unit of work run by a subscription on each scheduled tick
///
/// Only `fetch` runs under a pool permit. Delivery to the sink happens after
/// the permit is released, so a slow consumer never holds a pool slot.
#[async_trait]
pub trait PollTask: Send + Sync {
    /// Perform one bounded fetch beyond `cursor`
    async fn fetch(&self, cursor: Option<&Line>) -> Result<Vec<Line>>;

    /// Called when the subscription is reclaimed for inactivity
    fn cleanup(&self) {}
}
