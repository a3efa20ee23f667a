//! Backoff scheduler
//!
//! Decides on every scheduled tick whether a subscription's polling task runs
//! or sits the tick out, and when the subscription has been idle long enough
//! to cancel itself.
//!
//! Per tick at `now`:
//! 1. An unset `last_result_at` is seeded to `now - delay`, so the first tick
//!    always runs.
//! 2. Idle longer than `timeout` fires the cancel hook (once). The tick still
//!    proceeds.
//! 3. Pending skips are consumed one per tick.
//! 4. Otherwise `backoff = floor(idle / delay)`, the next
//!    `min(backoff - 1, max_backoff_cycles)` ticks are skipped, and the task
//!    runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use trail_config::BackoffSettings;
use trail_source::Line;

use crate::error::Result;
use crate::task::{PollTask, TaskParameters};

/// Backoff tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffConfig {
    /// Base unit for the skip count
    pub delay: Duration,
    /// Cap on consecutive skipped ticks
    pub max_backoff_cycles: i64,
    /// Idle time before the cancel hook fires
    pub timeout: Duration,
    /// Tick period
    pub poll_interval: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::from(&BackoffSettings::default())
    }
}

impl From<&BackoffSettings> for BackoffConfig {
    fn from(settings: &BackoffSettings) -> Self {
        Self {
            delay: settings.delay,
            max_backoff_cycles: settings.max_backoff_cycles,
            timeout: settings.timeout,
            poll_interval: settings.poll_interval,
        }
    }
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Run the task this tick
    pub run: bool,
    /// Idle timeout crossed on this tick (reported once)
    pub timed_out: bool,
}

/// Per-subscription backoff state
///
/// Owned by exactly one driver, so it needs no synchronisation.
#[derive(Debug)]
pub struct BackOff {
    config: BackoffConfig,
    last_result_at: Option<Instant>,
    skip_cycles_remaining: i64,
    timed_out: bool,
}

impl BackOff {
    pub fn new(config: BackoffConfig) -> Self {
        Self {
            config,
            last_result_at: None,
            skip_cycles_remaining: 0,
            timed_out: false,
        }
    }

    /// Advance one scheduled tick
    pub fn tick(&mut self, now: Instant) -> TickOutcome {
        let delay = self.config.delay;
        let last = *self
            .last_result_at
            .get_or_insert_with(|| now.checked_sub(delay).unwrap_or(now));
        let idle = now.saturating_duration_since(last);

        let timed_out = idle > self.config.timeout && !self.timed_out;
        if timed_out {
            self.timed_out = true;
        }

        if self.skip_cycles_remaining > 0 {
            self.skip_cycles_remaining -= 1;
            return TickOutcome {
                run: false,
                timed_out,
            };
        }

        let backoff = idle.as_nanos() / delay.as_nanos().max(1);
        let backoff = i64::try_from(backoff).unwrap_or(i64::MAX);
        self.skip_cycles_remaining = (backoff - 1).min(self.config.max_backoff_cycles);

        TickOutcome {
            run: true,
            timed_out,
        }
    }

    /// Record that the task produced at least one line
    pub fn received_result(&mut self, now: Instant) {
        self.last_result_at = Some(now);
    }

    pub fn last_result_at(&self) -> Option<Instant> {
        self.last_result_at
    }

    pub fn skip_cycles_remaining(&self) -> i64 {
        self.skip_cycles_remaining
    }
}

type CancelHook = Box<dyn FnOnce() + Send + Sync>;

/// A polling task wrapped in backoff state and a cancel hook
pub struct BackOffRunnable {
    state: BackOff,
    task: Arc<dyn PollTask>,
    on_cancel: Option<CancelHook>,
}

impl BackOffRunnable {
    pub fn new(
        task: Arc<dyn PollTask>,
        config: BackoffConfig,
        on_cancel: impl FnOnce() + Send + Sync + 'static,
    ) -> Self {
        Self {
            state: BackOff::new(config),
            task,
            on_cancel: Some(Box::new(on_cancel)),
        }
    }

    /// Advance one tick, firing the cancel hook on idle timeout
    ///
    /// Returns whether the task should run now.
    pub fn tick(&mut self, now: Instant) -> bool {
        let outcome = self.state.tick(now);
        if outcome.timed_out
            && let Some(hook) = self.on_cancel.take()
        {
            hook();
        }
        outcome.run
    }

    /// Fetch one page beyond the current cursor
    ///
    /// Errors are returned untouched and leave the backoff state as it was.
    pub async fn fetch(&self, params: &TaskParameters) -> Result<Vec<Line>> {
        self.task.fetch(params.cursor.as_ref()).await
    }

    /// Deliver fetched lines in order, advancing the cursor after each send
    ///
    /// Any delivered line counts as a result.
    pub async fn deliver(&mut self, lines: Vec<Line>, params: &mut TaskParameters) -> Result<()> {
        let before = params.sink.delivered();
        let mut outcome = Ok(());
        for line in lines {
            let next = line.as_cursor();
            if let Err(e) = params.sink.send(line).await {
                outcome = Err(e);
                break;
            }
            params.cursor = Some(next);
        }
        if params.sink.delivered() > before {
            self.state.received_result(Instant::now());
        }
        outcome
    }

    /// Fetch and deliver in one step
    pub async fn run(&mut self, params: &mut TaskParameters) -> Result<()> {
        let lines = self.fetch(params).await?;
        self.deliver(lines, params).await
    }

    pub fn state(&self) -> &BackOff {
        &self.state
    }
}

#[cfg(test)]
#[path = "backoff_test.rs"]
mod tests;
