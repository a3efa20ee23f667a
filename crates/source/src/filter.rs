//! Filters and queries
//!
//! Filters are maps from field name to accepted values. A line passes when
//! every constrained field matches one of its values (exact match for
//! `match_filters`, prefix for `prefix_filters`). Empty value lists constrain
//! nothing.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::line::{Direction, Line};

/// Field filters applied by a source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    #[serde(default)]
    pub match_filters: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub prefix_filters: BTreeMap<String, Vec<String>>,
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value` (values for one field are OR-ed)
    pub fn with_match(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.match_filters
            .entry(field.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Require `field` to start with `prefix` (prefixes for one field are OR-ed)
    pub fn with_prefix(mut self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.prefix_filters
            .entry(field.into())
            .or_default()
            .push(prefix.into());
        self
    }

    /// Match constraints that actually constrain something
    pub fn active_matches(&self) -> impl Iterator<Item = (&str, &[String])> {
        active(&self.match_filters)
    }

    /// Prefix constraints that actually constrain something
    pub fn active_prefixes(&self) -> impl Iterator<Item = (&str, &[String])> {
        active(&self.prefix_filters)
    }

    pub fn is_empty(&self) -> bool {
        self.active_matches().next().is_none() && self.active_prefixes().next().is_none()
    }

    /// Check a line against every constraint
    pub fn matches(&self, line: &Line) -> bool {
        let exact = self.active_matches().all(|(field, values)| {
            line.field(field)
                .is_some_and(|actual| values.iter().any(|v| v == actual))
        });

        exact
            && self.active_prefixes().all(|(field, prefixes)| {
                line.field(field)
                    .is_some_and(|actual| prefixes.iter().any(|p| actual.starts_with(p.as_str())))
            })
    }

    /// Canonical signature used as a subscription topic
    ///
    /// Independent of insertion order and duplicate values; filters that
    /// accept the same lines under the same spelling share a signature.
    pub fn signature(&self) -> String {
        let mut root = Map::new();
        root.insert("match".to_string(), canonical(&self.match_filters));
        root.insert("prefix".to_string(), canonical(&self.prefix_filters));
        Value::Object(root).to_string()
    }
}

fn active(filters: &BTreeMap<String, Vec<String>>) -> impl Iterator<Item = (&str, &[String])> {
    filters
        .iter()
        .filter(|(_, values)| !values.is_empty())
        .map(|(field, values)| (field.as_str(), values.as_slice()))
}

fn canonical(filters: &BTreeMap<String, Vec<String>>) -> Value {
    let mut out = Map::new();
    for (field, values) in active(filters) {
        let mut values = values.to_vec();
        values.sort();
        values.dedup();
        out.insert(
            field.to_string(),
            Value::Array(values.into_iter().map(Value::String).collect()),
        );
    }
    Value::Object(out)
}

/// One bounded fetch request against a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub filters: Filters,
    /// Exclusive resume bound
    pub after: Option<Line>,
    pub direction: Direction,
    pub fetch_size: usize,
}

impl Query {
    pub fn new(filters: Filters) -> Self {
        Self {
            filters,
            after: None,
            direction: Direction::Asc,
            fetch_size: 100,
        }
    }

    pub fn with_after(mut self, after: Option<Line>) -> Self {
        self.after = after;
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_fetch_size(mut self, fetch_size: usize) -> Self {
        self.fetch_size = fetch_size;
        self
    }

    /// Same query with its cursor normalised through [`Line::as_cursor`]
    pub fn normalized(mut self) -> Self {
        self.after = self.after.as_ref().map(Line::as_cursor);
        self
    }

    /// Whether `line` satisfies filters and lies beyond the cursor
    pub fn accepts(&self, line: &Line) -> bool {
        let beyond = self
            .after
            .as_ref()
            .is_none_or(|after| self.direction.is_beyond(after, line));
        beyond && self.filters.matches(line)
    }
}

#[cfg(test)]
#[path = "filter_test.rs"]
mod tests;
