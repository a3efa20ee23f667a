//! Tests for the backoff scheduler

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::Instant;
use trail_source::{Line, SourceError};

use super::*;
use crate::error::FollowError;
use crate::sink::ResultSink;

fn config(delay_ms: u64, timeout_ms: u64) -> BackoffConfig {
    BackoffConfig {
        delay: Duration::from_millis(delay_ms),
        max_backoff_cycles: 30,
        timeout: Duration::from_millis(timeout_ms),
        poll_interval: Duration::from_millis(delay_ms),
    }
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// =============================================================================
// BackOff State
// =============================================================================

#[test]
fn test_first_tick_always_runs() {
    let mut state = BackOff::new(config(100, 10_000));
    assert!(state.tick(Instant::now()).run);
}

#[test]
fn test_immediate_responsiveness_after_result() {
    let mut state = BackOff::new(config(100, 10_000));
    let t0 = Instant::now();
    state.received_result(t0);

    let runs = [t0, t0 + ms(100), t0 + ms(200)]
        .into_iter()
        .filter(|&t| state.tick(t).run)
        .count();
    assert_eq!(runs, 3);
}

#[test]
fn test_results_every_tick_keep_full_frequency() {
    let mut state = BackOff::new(config(100, 10_000));
    let t0 = Instant::now();

    for i in 0..10 {
        let now = t0 + ms(100 * i);
        assert!(state.tick(now).run, "tick {i} skipped");
        state.received_result(now);
    }
}

#[test]
fn test_backoff_growth_skips_third_tick() {
    let mut state = BackOff::new(config(100, 10_000));
    let t0 = Instant::now();

    let runs: Vec<bool> = [t0, t0 + ms(100), t0 + ms(200)]
        .into_iter()
        .map(|t| state.tick(t).run)
        .collect();
    assert_eq!(runs, vec![true, true, false]);
}

#[test]
fn test_timeout_fires_once() {
    let mut state = BackOff::new(config(100, 500));
    let t0 = Instant::now();

    let mut runs = Vec::new();
    let mut timeouts = Vec::new();
    for i in 0..=7 {
        let now = t0 + ms(100 * i);
        let outcome = state.tick(now);
        if outcome.run {
            runs.push(100 * i);
        }
        if outcome.timed_out {
            timeouts.push(100 * i);
        }
        if i == 0 {
            state.received_result(now);
        }
    }

    assert_eq!(runs, vec![0, 100, 200, 400]);
    assert_eq!(timeouts, vec![600]);
}

#[test]
fn test_skip_cycles_capped() {
    let mut state = BackOff::new(BackoffConfig {
        max_backoff_cycles: 2,
        ..config(100, 60_000)
    });
    let t0 = Instant::now();

    assert!(state.tick(t0).run);
    assert!(state.tick(t0 + ms(1_000)).run);
    assert_eq!(state.skip_cycles_remaining(), 2);
    assert!(!state.tick(t0 + ms(1_100)).run);
    assert!(!state.tick(t0 + ms(1_200)).run);
    assert!(state.tick(t0 + ms(1_300)).run);
}

#[test]
fn test_result_resets_backoff() {
    let mut state = BackOff::new(config(100, 60_000));
    let t0 = Instant::now();

    state.tick(t0);
    state.tick(t0 + ms(500));
    assert!(state.skip_cycles_remaining() > 0);

    // Pending skips still drain, then the next computed run has no skips
    state.received_result(t0 + ms(550));
    while !state.tick(t0 + ms(600)).run {}
    assert!(state.skip_cycles_remaining() <= 0);
    assert!(state.tick(t0 + ms(700)).run);
}

// =============================================================================
// BackOffRunnable
// =============================================================================

struct StubTask {
    polls: AtomicUsize,
    deliver: AtomicBool,
    fail: AtomicBool,
}

impl StubTask {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            polls: AtomicUsize::new(0),
            deliver: AtomicBool::new(false),
            fail: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl PollTask for StubTask {
    async fn fetch(&self, _cursor: Option<&Line>) -> crate::error::Result<Vec<Line>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::Connection("down".to_string()).into());
        }
        if self.deliver.load(Ordering::SeqCst) {
            return Ok(vec![Line::new("x", Utc.timestamp_millis_opt(0).unwrap())]);
        }
        Ok(vec![])
    }
}

fn params() -> (TaskParameters, mpsc::Receiver<Line>) {
    let (tx, rx) = mpsc::channel(16);
    (TaskParameters::new(None, ResultSink::new(Arc::new(tx))), rx)
}

#[test]
fn test_runnable_hook_fires_once() {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    let mut runnable = BackOffRunnable::new(StubTask::new(), config(100, 500), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let t0 = Instant::now();
    for i in 0..20 {
        runnable.tick(t0 + ms(100 * i));
    }
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_runnable_delivery_counts_as_result() {
    let task = StubTask::new();
    task.deliver.store(true, Ordering::SeqCst);
    let mut runnable = BackOffRunnable::new(task.clone(), config(100, 500), || {});
    let (mut params, mut rx) = params();

    assert!(runnable.tick(Instant::now()));
    runnable.run(&mut params).await.unwrap();

    assert_eq!(runnable.state().last_result_at(), Some(Instant::now()));
    assert_eq!(rx.recv().await.unwrap().id(), "x");
}

#[tokio::test(start_paused = true)]
async fn test_runnable_empty_run_is_not_a_result() {
    let task = StubTask::new();
    let mut runnable = BackOffRunnable::new(task.clone(), config(100, 500), || {});
    let (mut params, _rx) = params();

    let t0 = Instant::now();
    runnable.tick(t0);
    let seeded = runnable.state().last_result_at();
    runnable.run(&mut params).await.unwrap();

    assert_eq!(runnable.state().last_result_at(), seeded);
    assert_eq!(task.polls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_runnable_error_leaves_state_untouched() {
    let task = StubTask::new();
    task.fail.store(true, Ordering::SeqCst);
    let mut runnable = BackOffRunnable::new(task.clone(), config(100, 500), || {});
    let (mut params, _rx) = params();

    runnable.tick(Instant::now());
    let before = (
        runnable.state().last_result_at(),
        runnable.state().skip_cycles_remaining(),
    );

    let result = runnable.run(&mut params).await;
    assert!(matches!(result, Err(FollowError::Source(_))));
    assert_eq!(
        (
            runnable.state().last_result_at(),
            runnable.state().skip_cycles_remaining()
        ),
        before
    );
}

#[tokio::test(start_paused = true)]
async fn test_runnable_deliver_advances_cursor() {
    let mut runnable = BackOffRunnable::new(StubTask::new(), config(100, 500), || {});
    let (mut params, mut rx) = params();

    let lines = vec![
        Line::new("a", Utc.timestamp_millis_opt(1).unwrap()),
        Line::new("b", Utc.timestamp_millis_opt(2).unwrap()),
    ];
    runnable.deliver(lines, &mut params).await.unwrap();

    assert_eq!(params.cursor.as_ref().map(Line::id), Some("b"));
    assert!(params.cursor.as_ref().unwrap().is_last());
    assert_eq!(params.sink.delivered(), 2);
    assert_eq!(rx.recv().await.unwrap().id(), "a");
}
