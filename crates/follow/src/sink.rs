//! Delivery sinks
//!
//! Lines cross from pool workers to connections through a `LineSink`. The
//! production sink is a bounded `mpsc::Sender`, so a slow consumer applies
//! backpressure to the worker feeding it.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use trail_source::Line;

use crate::error::{FollowError, Result};

/// Destination for delivered lines
#[async_trait]
pub trait LineSink: Send + Sync {
    /// Deliver one line, failing with `SinkClosed` once the consumer is gone
    async fn send(&self, line: Line) -> Result<()>;
}

#[async_trait]
impl LineSink for mpsc::Sender<Line> {
    async fn send(&self, line: Line) -> Result<()> {
        mpsc::Sender::send(self, line)
            .await
            .map_err(|_| FollowError::SinkClosed)
    }
}

/// Sink wrapper that counts deliveries
///
/// The scheduler reads the count after each run to decide whether the task
/// produced a result.
pub struct ResultSink {
    inner: Arc<dyn LineSink>,
    delivered: u64,
}

impl ResultSink {
    pub fn new(inner: Arc<dyn LineSink>) -> Self {
        Self {
            inner,
            delivered: 0,
        }
    }

    pub async fn send(&mut self, line: Line) -> Result<()> {
        self.inner.send(line).await?;
        self.delivered += 1;
        Ok(())
    }

    /// Lines delivered since creation
    pub fn delivered(&self) -> u64 {
        self.delivered
    }
}

/// Collects up to `limit` lines, then reports itself closed
pub struct Collector {
    lines: Mutex<Vec<Line>>,
    limit: usize,
}

impl Collector {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: Mutex::new(Vec::new()),
            limit,
        }
    }

    pub fn into_lines(self) -> Vec<Line> {
        self.lines.into_inner()
    }
}

#[async_trait]
impl LineSink for Collector {
    async fn send(&self, line: Line) -> Result<()> {
        let mut lines = self.lines.lock();
        if lines.len() >= self.limit {
            return Err(FollowError::SinkClosed);
        }
        lines.push(line);
        Ok(())
    }
}
