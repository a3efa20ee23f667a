//! Source trait and implementations

pub mod database;
pub mod elasticsearch;
pub mod memory;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::filter::Query;
use crate::page::Page;

/// Paginated, cursor-ordered access to a backing store
///
/// Implemented by the memory, Elasticsearch and database backends.
#[async_trait]
pub trait Source: Send + Sync {
    /// Execute one bounded fetch
    ///
    /// Lines come back sorted by `(timestamp, id)` in the query's direction,
    /// strictly beyond `query.after`. Backends ask their store for
    /// `fetch_size + 1` candidates and build the result with
    /// [`Page::from_candidates`].
    async fn get(&self, query: &Query) -> Result<Page, SourceError>;

    /// Release backend resources
    async fn close(&self) -> Result<(), SourceError> {
        Ok(())
    }

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
