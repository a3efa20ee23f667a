//! In-memory backend
//!
//! Keeps lines sorted in a vector. Used for development and tests.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::backend::Source;
use crate::error::SourceError;
use crate::filter::Query;
use crate::line::{Direction, Line};
use crate::page::Page;

/// Sorted in-process line store
#[derive(Debug, Default)]
pub struct MemorySource {
    lines: RwLock<Vec<Line>>,
    closed: AtomicBool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-filled with lines (any order)
    pub fn with_lines(lines: impl IntoIterator<Item = Line>) -> Self {
        let source = Self::new();
        for line in lines {
            source.append(line);
        }
        source
    }

    /// Insert a line at its sorted position
    pub fn append(&self, line: Line) {
        let line = line.with_last(false);
        let mut lines = self.lines.write();
        let pos = lines.partition_point(|l| l.sort_key() <= line.sort_key());
        lines.insert(pos, line);
    }

    pub fn len(&self) -> usize {
        self.lines.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn get(&self, query: &Query) -> Result<Page, SourceError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SourceError::Closed);
        }

        let want = query.fetch_size.max(1) + 1;
        let lines = self.lines.read();

        let candidates: Vec<Line> = match query.direction {
            Direction::Asc => lines
                .iter()
                .filter(|l| query.accepts(l))
                .take(want)
                .cloned()
                .collect(),
            Direction::Desc => lines
                .iter()
                .rev()
                .filter(|l| query.accepts(l))
                .take(want)
                .cloned()
                .collect(),
        };

        Ok(Page::from_candidates(candidates, query.fetch_size))
    }

    async fn close(&self) -> Result<(), SourceError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
