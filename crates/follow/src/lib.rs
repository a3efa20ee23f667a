//! Trail Follow - polling engine
//!
//! Everything between a `Source` and a connection:
//! - **Backoff**: per-subscription decision to run or skip a tick, with an
//!   idle timeout that cancels the subscription
//! - **Registry**: shared worker pool plus the map of live subscriptions
//! - **Provider**: drain, one-page fetch and tail operations built on a
//!   source and the registry
//! - **Sinks**: where delivered lines go
//!
//! # Usage
//!
//! ```ignore
//! use trail_follow::{DataProvider, Subscription, Subscriptions};
//!
//! let subscriptions = Subscriptions::new(config.follow.poll_threads);
//! let provider = DataProvider::from_config(source, subscriptions.clone(), &config.follow);
//!
//! let topic = provider.subscribe(
//!     Subscription::new(client_id, filters.signature()),
//!     filters,
//!     Direction::Asc,
//!     None,
//!     None,
//!     Arc::new(tx),
//! )?;
//! ```

pub mod backoff;
pub mod error;
pub mod provider;
pub mod registry;
pub mod sink;
pub mod task;

// Re-exports
pub use backoff::{BackOff, BackOffRunnable, BackoffConfig, TickOutcome};
pub use error::{FollowError, Result};
pub use provider::{DataProvider, FetchLimits};
pub use registry::{Subscription, Subscriptions, UnsubscribeReason};
pub use sink::{Collector, LineSink, ResultSink};
pub use task::{PollTask, TaskParameters};
