//! Subscription registry
//!
//! Owns the shared worker pool and the map from subscription identity to its
//! scheduled polling driver.
//!
//! # Scheduling
//!
//! Every subscription gets one driver task ticking at a fixed rate. Each
//! tick consults the subscription's [`BackOffRunnable`]; when the task is due
//! its fetch runs under a pool permit. The pool (a FIFO semaphore sized by
//! `poll_threads`) bounds concurrent store queries across one-shot fetches
//! and all subscriptions together. The permit is released before the fetched
//! lines are delivered, so a stalled consumer only stalls its own driver.
//!
//! # Cancellation
//!
//! Unsubscribing cancels the driver's token. The driver watches the token
//! ahead of every tick, while queued for a permit and while the fetch is in
//! flight, so once a subscription is removed no further store call starts
//! for it.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use trail_source::Line;
use uuid::Uuid;

use crate::backoff::{BackOffRunnable, BackoffConfig};
use crate::error::{FollowError, Result};
use crate::sink::{LineSink, ResultSink};
use crate::task::{PollTask, TaskParameters};

// =============================================================================
// Identity
// =============================================================================

/// Subscription identity: owning connection and filter topic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    client_id: String,
    topic: String,
}

impl Subscription {
    pub fn new(client_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            topic: topic.into(),
        }
    }

    /// Identity for a stream with no owning connection
    pub fn anonymous(topic: impl Into<String>) -> Self {
        Self::new(Uuid::new_v4().to_string(), topic)
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.client_id, self.topic)
    }
}

/// Why a subscription was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubscribeReason {
    ClientRequest,
    ConnectionClosed,
    /// Idle timeout reached
    NoDataFromSource,
    Shutdown,
}

impl UnsubscribeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientRequest => "client_request",
            Self::ConnectionClosed => "connection_closed",
            Self::NoDataFromSource => "no_data_from_source",
            Self::Shutdown => "shutdown",
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

struct ScheduledHandle {
    generation: u64,
    token: CancellationToken,
    task: Arc<dyn PollTask>,
}

/// Shared registry of live subscriptions
///
/// Construct once with [`Subscriptions::new`], share the `Arc` with every
/// connection handler, and call [`Subscriptions::shutdown`] on exit.
pub struct Subscriptions {
    pool: Arc<Semaphore>,
    poll_threads: usize,
    entries: DashMap<Subscription, ScheduledHandle>,
    generation: AtomicU64,
    closed: CancellationToken,
}

impl Subscriptions {
    /// Create a registry with a pool of `poll_threads` concurrent slots
    pub fn new(poll_threads: usize) -> Arc<Self> {
        let poll_threads = poll_threads.max(1);
        Arc::new(Self {
            pool: Arc::new(Semaphore::new(poll_threads)),
            poll_threads,
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            closed: CancellationToken::new(),
        })
    }

    pub fn poll_threads(&self) -> usize {
        self.poll_threads
    }

    /// Run one-shot work on the pool
    ///
    /// The returned handle yields the work's output, or `ShutDown` if the
    /// pool closed before a slot was free.
    pub fn submit<F>(&self, work: F) -> JoinHandle<Result<F::Output>>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::spawn(async move {
            let _permit = pool
                .acquire_owned()
                .await
                .map_err(|_| FollowError::ShutDown)?;
            Ok(work.await)
        })
    }

    /// Run `work` under a pool permit, waiting inline for a free slot
    ///
    /// Fails with `ShutDown` once the pool is closed.
    pub async fn bounded<F: Future>(&self, work: F) -> Result<F::Output> {
        let _permit = self
            .pool
            .acquire()
            .await
            .map_err(|_| FollowError::ShutDown)?;
        Ok(work.await)
    }

    /// Schedule `task` for `id`
    ///
    /// Replaces (and cancels) any existing schedule for the same identity.
    /// On idle timeout the subscription removes itself with
    /// [`UnsubscribeReason::NoDataFromSource`].
    pub fn subscribe(
        self: &Arc<Self>,
        id: Subscription,
        task: Arc<dyn PollTask>,
        initial_cursor: Option<Line>,
        sink: Arc<dyn LineSink>,
        backoff: BackoffConfig,
    ) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(FollowError::ShutDown);
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.closed.child_token();

        let registry = Arc::downgrade(self);
        let hook_id = id.clone();
        let runnable = BackOffRunnable::new(task.clone(), backoff, move || {
            if let Some(registry) = registry.upgrade() {
                registry.remove(
                    &hook_id,
                    Some(generation),
                    UnsubscribeReason::NoDataFromSource,
                );
            }
        });

        let params = TaskParameters::new(
            initial_cursor.as_ref().map(Line::as_cursor),
            ResultSink::new(sink),
        );

        let handle = ScheduledHandle {
            generation,
            token: token.clone(),
            task,
        };
        if let Some(previous) = self.entries.insert(id.clone(), handle) {
            previous.token.cancel();
        }

        // shutdown() may have swept the map between the check above and the insert
        if self.closed.is_cancelled() {
            self.remove(&id, Some(generation), UnsubscribeReason::Shutdown);
            return Err(FollowError::ShutDown);
        }

        debug!(
            client_id = %id.client_id(),
            topic = %id.topic(),
            poll_interval = ?backoff.poll_interval,
            "Subscription scheduled"
        );

        let driver = Driver {
            id,
            generation,
            registry: Arc::downgrade(self),
            pool: self.pool.clone(),
            token,
            period: backoff.poll_interval.max(Duration::from_millis(1)),
        };
        tokio::spawn(driver.run(runnable, params));

        Ok(())
    }

    /// Remove and cancel a subscription
    ///
    /// Returns `false` if it was not registered. The task's cleanup callback
    /// runs only for [`UnsubscribeReason::NoDataFromSource`].
    pub fn unsubscribe(&self, id: &Subscription, reason: UnsubscribeReason) -> bool {
        self.remove(id, None, reason)
    }

    /// Remove every subscription
    pub fn unsubscribe_all(&self) -> usize {
        self.remove_matching(|_| true, UnsubscribeReason::ClientRequest)
    }

    /// Remove every subscription owned by one connection
    pub fn unsubscribe_client(&self, client_id: &str, reason: UnsubscribeReason) -> usize {
        self.remove_matching(|id| id.client_id() == client_id, reason)
    }

    /// Snapshot of active identities
    pub fn get_all(&self) -> Vec<Subscription> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn contains(&self, id: &Subscription) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Stop every subscription and refuse further work
    pub fn shutdown(&self) {
        self.closed.cancel();
        let removed = self.remove_matching(|_| true, UnsubscribeReason::Shutdown);
        self.pool.close();
        info!(subscriptions = removed, "Subscription registry shut down");
    }

    fn remove_matching(
        &self,
        predicate: impl Fn(&Subscription) -> bool,
        reason: UnsubscribeReason,
    ) -> usize {
        // Snapshot first; entries may vanish concurrently
        let ids: Vec<Subscription> = self
            .entries
            .iter()
            .filter(|e| predicate(e.key()))
            .map(|e| e.key().clone())
            .collect();

        let mut removed = 0;
        for id in &ids {
            if self.remove(id, None, reason) {
                removed += 1;
            }
        }
        removed
    }

    fn remove(&self, id: &Subscription, generation: Option<u64>, reason: UnsubscribeReason) -> bool {
        let removed = match generation {
            Some(generation) => self
                .entries
                .remove_if(id, |_, handle| handle.generation == generation),
            None => self.entries.remove(id),
        };

        let Some((_, handle)) = removed else {
            return false;
        };

        handle.token.cancel();
        if reason == UnsubscribeReason::NoDataFromSource {
            handle.task.cleanup();
        }

        debug!(
            client_id = %id.client_id(),
            topic = %id.topic(),
            reason = reason.as_str(),
            "Subscription removed"
        );
        true
    }
}

// =============================================================================
// Driver
// =============================================================================

/// Fixed-rate ticker for one subscription
struct Driver {
    id: Subscription,
    generation: u64,
    registry: Weak<Subscriptions>,
    pool: Arc<Semaphore>,
    token: CancellationToken,
    period: Duration,
}

impl Driver {
    async fn run(self, mut runnable: BackOffRunnable, mut params: TaskParameters) {
        let mut interval = tokio::time::interval(self.period);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = interval.tick() => {}
            }

            if !runnable.tick(Instant::now()) {
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                permit = self.pool.acquire() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let fetched = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                fetched = runnable.fetch(&params) => fetched,
            };
            // Delivery may wait on a slow consumer; it must not hold a slot
            drop(permit);

            let result = match fetched {
                Ok(lines) => tokio::select! {
                    biased;
                    _ = self.token.cancelled() => break,
                    result = runnable.deliver(lines, &mut params) => result,
                },
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => {}
                Err(FollowError::SinkClosed) => {
                    if let Some(registry) = self.registry.upgrade() {
                        registry.remove(
                            &self.id,
                            Some(self.generation),
                            UnsubscribeReason::ConnectionClosed,
                        );
                    }
                    break;
                }
                Err(e) => {
                    warn!(
                        client_id = %self.id.client_id(),
                        topic = %self.id.topic(),
                        error = %e,
                        "Poll failed, subscription continues"
                    );
                }
            }
        }

        debug!(
            client_id = %self.id.client_id(),
            topic = %self.id.topic(),
            delivered = params.sink.delivered(),
            "Subscription driver stopped"
        );
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
