//! Result pages
//!
//! A page is the finite result of one `Source::get`. It yields lines in sort
//! order, or exactly one [`Entry::End`] when nothing matched.

use crate::line::Line;

/// One item of a page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    Line(Line),
    /// Nothing matched the query
    End,
}

/// Result of a single bounded fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    entries: Vec<Entry>,
}

impl Page {
    /// Build a page from up to `fetch_size + 1` sorted candidates
    ///
    /// At most `fetch_size` lines are kept. The final kept line carries
    /// `last = true` only when no extra candidate was present, i.e. the
    /// window reached the end of currently available data.
    pub fn from_candidates(mut candidates: Vec<Line>, fetch_size: usize) -> Self {
        if candidates.is_empty() {
            return Self::end();
        }

        let fetch_size = fetch_size.max(1);
        let more = candidates.len() > fetch_size;
        candidates.truncate(fetch_size);

        let final_index = candidates.len() - 1;
        let entries = candidates
            .into_iter()
            .enumerate()
            .map(|(i, line)| Entry::Line(line.with_last(i == final_index && !more)))
            .collect();

        Self { entries }
    }

    /// The zero-match page
    pub fn end() -> Self {
        Self {
            entries: vec![Entry::End],
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self.entries.as_slice(), [Entry::End])
    }

    /// Lines in delivery order
    pub fn lines(&self) -> impl Iterator<Item = &Line> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Line(line) => Some(line),
            Entry::End => None,
        })
    }

    pub fn last_line(&self) -> Option<&Line> {
        self.lines().last()
    }

    /// Number of lines (the end marker is not counted)
    pub fn len(&self) -> usize {
        self.lines().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IntoIterator for Page {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}
