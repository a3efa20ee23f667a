//! Trail Source - record model and paginated backing stores
//!
//! Defines the `Line` record (which doubles as the pagination cursor), the
//! filters and query shape, the `Page` result sequence, and the `Source`
//! contract implemented by each backend:
//! - **Memory**: in-process sorted store for development and tests
//! - **Elasticsearch**: `_search` with `search_after`
//! - **Database**: SQLite-compatible table via Turso
//!
//! # Usage
//!
//! ```ignore
//! use trail_source::{Filters, Query, open};
//!
//! let source = open(&config.source).await?;
//! let page = source.get(&Query::new(Filters::new()).with_fetch_size(100)).await?;
//! for line in page.lines() {
//!     println!("{}", line);
//! }
//! ```

pub mod backend;
pub mod error;
pub mod filter;
pub mod line;
pub mod page;

// Re-exports
pub use backend::Source;
pub use backend::database::DatabaseSource;
pub use backend::elasticsearch::{ElasticsearchConfig, ElasticsearchSource};
pub use backend::memory::MemorySource;
pub use error::{Result, SourceError};
pub use filter::{Filters, Query};
pub use line::{Direction, Line};
pub use page::{Entry, Page};

use std::sync::Arc;

use trail_config::{SourceConfig, SourceKind};

/// Open the configured source
///
/// The kind is resolved once at startup; the rest of the system only sees
/// `Arc<dyn Source>`.
pub async fn open(config: &SourceConfig) -> Result<Arc<dyn Source>> {
    match config.kind {
        SourceKind::Memory => Ok(Arc::new(MemorySource::new())),
        SourceKind::Elasticsearch => {
            let url = config.url.as_ref().ok_or_else(|| {
                SourceError::Config("url required for elasticsearch source".to_string())
            })?;

            let mut es_config =
                ElasticsearchConfig::new(url, config.index()).with_timeout(config.request_timeout);
            if let (Some(user), Some(pass)) = (&config.username, &config.password) {
                es_config = es_config.with_credentials(user, pass);
            }

            Ok(Arc::new(ElasticsearchSource::new(&es_config)?))
        }
        SourceKind::Database => {
            let path = config.path.as_ref().ok_or_else(|| {
                SourceError::Config("path required for database source".to_string())
            })?;
            Ok(Arc::new(DatabaseSource::open(path, config.table()).await?))
        }
    }
}
