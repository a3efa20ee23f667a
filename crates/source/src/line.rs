//! Log line record
//!
//! A `Line` is both the unit of delivery and the pagination cursor: the last
//! line a client received is what it hands back to resume.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// One delivered log line
///
/// Immutable once built. Ordered by `(timestamp, id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Line {
    id: String,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,

    #[serde(default)]
    seq: u64,

    #[serde(default)]
    logger: String,

    #[serde(default)]
    message: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    context: BTreeMap<String, String>,

    /// Final line of the currently available data window
    #[serde(default)]
    last: bool,

    /// Subscription topic, set at delivery
    #[serde(default, skip_serializing_if = "Option::is_none")]
    topic: Option<String>,
}

impl Line {
    /// Create a line with an id and event time
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            seq: 0,
            logger: String::new(),
            message: String::new(),
            context: BTreeMap::new(),
            last: false,
            topic: None,
        }
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = seq;
        self
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = logger.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Add one context tag
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_last(mut self, last: bool) -> Self {
        self.last = last;
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn logger(&self) -> &str {
        &self.logger
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn is_last(&self) -> bool {
        self.last
    }

    pub fn topic(&self) -> Option<&str> {
        self.topic.as_deref()
    }

    /// Copy of this line usable as a resume point
    ///
    /// The `last` flag is forced on so a mid-batch line never reads as an
    /// unfinished window when the next query legitimately returns nothing.
    pub fn as_cursor(&self) -> Line {
        let mut cursor = self.clone();
        cursor.last = true;
        cursor.topic = None;
        cursor
    }

    /// Sort key: event time in milliseconds, then id
    pub fn sort_key(&self) -> (i64, &str) {
        (self.timestamp.timestamp_millis(), &self.id)
    }

    /// Look up a filterable field
    ///
    /// `id`, `logger` and `message` address the record itself; any other
    /// name addresses a context tag.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "id" => Some(&self.id),
            "logger" => Some(&self.logger),
            "message" => Some(&self.message),
            key => self.context.get(key).map(String::as_str),
        }
    }

    /// Single-line plain text rendering
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            self.logger,
            self.message
        )?;
        for (key, value) in &self.context {
            write!(f, " {}={}", key, value)?;
        }
        Ok(())
    }
}

/// Sort direction over `(timestamp, id)`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }

    /// Whether `next` lies strictly beyond `after` in this direction
    pub fn is_beyond(&self, after: &Line, next: &Line) -> bool {
        match self {
            Self::Asc => next.sort_key() > after.sort_key(),
            Self::Desc => next.sort_key() < after.sort_key(),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}
