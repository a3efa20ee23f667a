//! Data provider
//!
//! Turns the one-shot paginated `Source` API into three operations:
//! - [`DataProvider::get`] drains everything currently available
//! - [`DataProvider::fetch_page`] performs one bounded fetch
//! - [`DataProvider::subscribe`] tails new lines, one bounded fetch per
//!   scheduled tick

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use trail_config::FollowConfig;
use trail_source::{Direction, Entry, Filters, Line, Page, Query, Source};

use crate::backoff::BackoffConfig;
use crate::error::{FollowError, Result};
use crate::registry::{Subscription, Subscriptions, UnsubscribeReason};
use crate::sink::{Collector, LineSink};
use crate::task::PollTask;

/// Fetch size bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchLimits {
    pub default_fetch_size: usize,
    pub max_fetch_size: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            default_fetch_size: 100,
            max_fetch_size: 1000,
        }
    }
}

impl FetchLimits {
    /// Clamp a requested fetch size to `[1, max_fetch_size]`
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.default_fetch_size)
            .clamp(1, self.max_fetch_size.max(1))
    }
}

/// Pagination and tailing on top of a source and the shared registry
pub struct DataProvider {
    source: Arc<dyn Source>,
    subscriptions: Arc<Subscriptions>,
    backoff: BackoffConfig,
    limits: FetchLimits,
}

impl DataProvider {
    pub fn new(
        source: Arc<dyn Source>,
        subscriptions: Arc<Subscriptions>,
        backoff: BackoffConfig,
        limits: FetchLimits,
    ) -> Self {
        Self {
            source,
            subscriptions,
            backoff,
            limits,
        }
    }

    /// Build from the `[follow]` config section
    pub fn from_config(
        source: Arc<dyn Source>,
        subscriptions: Arc<Subscriptions>,
        config: &FollowConfig,
    ) -> Self {
        Self::new(
            source,
            subscriptions,
            BackoffConfig::from(&config.backoff),
            FetchLimits {
                default_fetch_size: config.default_fetch_size,
                max_fetch_size: config.max_fetch_size,
            },
        )
    }

    pub fn source(&self) -> &Arc<dyn Source> {
        &self.source
    }

    pub fn subscriptions(&self) -> &Arc<Subscriptions> {
        &self.subscriptions
    }

    pub fn limits(&self) -> FetchLimits {
        self.limits
    }

    /// Drain every line currently available
    ///
    /// Re-queries with an advancing cursor until a page ends on a line with
    /// `last = true` or nothing matched. Returns the final cursor (or the
    /// starting one if nothing was delivered). A closed sink ends the drain
    /// early without error.
    ///
    /// Each page query takes a pool permit; delivery to `sink` happens
    /// outside it.
    pub async fn get(&self, query: Query, sink: &dyn LineSink) -> Result<Option<Line>> {
        let mut query = self.prepare(query);
        let mut cursor = query.after.clone();

        loop {
            let page = self.subscriptions.bounded(self.source.get(&query)).await??;
            if page.is_end() {
                break;
            }

            let mut reached_end = false;
            let mut page_cursor = None;
            for entry in page {
                let Entry::Line(line) = entry else {
                    reached_end = true;
                    continue;
                };
                reached_end = line.is_last();
                let next = line.as_cursor();
                match sink.send(line).await {
                    Ok(()) => page_cursor = Some(next),
                    Err(FollowError::SinkClosed) => {
                        debug!("Sink closed, drain stopped");
                        return Ok(page_cursor.or(cursor));
                    }
                    Err(e) => return Err(e),
                }
            }

            let Some(next) = page_cursor else {
                break;
            };

            if let Some(previous) = &cursor
                && !query.direction.is_beyond(previous, &next)
            {
                warn!(
                    source = self.source.name(),
                    cursor = %next.id(),
                    "Page did not advance the cursor, drain stopped"
                );
                cursor = Some(next);
                break;
            }

            cursor = Some(next);
            if reached_end {
                break;
            }
            query.after = cursor.clone();
        }

        Ok(cursor)
    }

    /// Drain into memory, stopping after `max_lines`
    pub async fn collect(&self, query: Query, max_lines: usize) -> Result<Vec<Line>> {
        let collector = Collector::new(max_lines);
        self.get(query, &collector).await?;
        Ok(collector.into_lines())
    }

    /// One bounded fetch under a pool permit
    pub async fn fetch_page(&self, query: Query) -> Result<Page> {
        let query = self.prepare(query);
        Ok(self.subscriptions.bounded(self.source.get(&query)).await??)
    }

    /// Start tailing for `subscription`
    ///
    /// Each tick fetches one page beyond the previous tick's last line and
    /// delivers it tagged with the subscription topic. Returns the topic.
    pub fn subscribe(
        &self,
        subscription: Subscription,
        filters: Filters,
        direction: Direction,
        fetch_size: Option<usize>,
        after: Option<Line>,
        sink: Arc<dyn LineSink>,
    ) -> Result<String> {
        let topic = subscription.topic().to_string();
        let task = Arc::new(TailTask {
            source: self.source.clone(),
            filters,
            direction,
            fetch_size: self.limits.resolve(fetch_size),
            topic: topic.clone(),
        });

        self.subscriptions
            .subscribe(subscription, task, after, sink, self.backoff)?;
        Ok(topic)
    }

    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.subscriptions
            .unsubscribe(subscription, UnsubscribeReason::ClientRequest)
    }

    /// Remove every subscription owned by one connection
    pub fn unsubscribe_client(&self, client_id: &str) -> usize {
        self.subscriptions
            .unsubscribe_client(client_id, UnsubscribeReason::ConnectionClosed)
    }

    fn prepare(&self, query: Query) -> Query {
        let fetch_size = self.limits.resolve(Some(query.fetch_size));
        query.with_fetch_size(fetch_size).normalized()
    }
}

/// Polling task behind one tail subscription
struct TailTask {
    source: Arc<dyn Source>,
    filters: Filters,
    direction: Direction,
    fetch_size: usize,
    topic: String,
}

#[async_trait]
impl PollTask for TailTask {
    async fn fetch(&self, cursor: Option<&Line>) -> Result<Vec<Line>> {
        let query = Query::new(self.filters.clone())
            .with_direction(self.direction)
            .with_fetch_size(self.fetch_size)
            .with_after(cursor.cloned())
            .normalized();

        let page = self.source.get(&query).await?;
        Ok(page
            .into_iter()
            .filter_map(|entry| match entry {
                Entry::Line(line) => Some(line.with_topic(self.topic.as_str())),
                Entry::End => None,
            })
            .collect())
    }

    fn cleanup(&self) {
        debug!(topic = %self.topic, "Tail reclaimed after inactivity");
    }
}

#[cfg(test)]
#[path = "provider_test.rs"]
mod tests;
