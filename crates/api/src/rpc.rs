//! WebSocket RPC envelope
//!
//! Requests arrive as text frames:
//!
//! ```json
//! {"method": "SUBSCRIBE", "params": {"matchFilters": {"logger": ["api"]}}, "id": 7}
//! ```
//!
//! Every request gets exactly one immediate response with the same `id`.
//! GET may later push a second, `ERROR`, response if the drain fails.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use trail_source::{Direction, Filters, Line, Query};

/// Supported request methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Subscribe,
    Unsubscribe,
}

impl Method {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GET" => Some(Self::Get),
            "SUBSCRIBE" => Some(Self::Subscribe),
            "UNSUBSCRIBE" => Some(Self::Unsubscribe),
            _ => None,
        }
    }
}

/// Raw request envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub id: Value,
}

/// Parameters shared by GET and SUBSCRIBE
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryParams {
    #[serde(flatten)]
    pub filters: Filters,
    pub after_line: Option<Line>,
    pub direction: Direction,
    pub fetch_size: Option<usize>,
    pub max_lines: Option<usize>,
}

impl QueryParams {
    /// Query with the given (already clamped) fetch size
    pub fn to_query(&self, fetch_size: usize) -> Query {
        Query::new(self.filters.clone())
            .with_after(self.after_line.clone())
            .with_direction(self.direction)
            .with_fetch_size(fetch_size)
    }
}

/// UNSUBSCRIBE parameters
#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribeParams {
    pub topic: String,
}

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Error,
}

/// Response envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    pub id: Value,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Response {
    pub fn ok(id: Value) -> Self {
        Self {
            id,
            status: Status::Ok,
            payload: None,
            error: None,
        }
    }

    pub fn ok_with(id: Value, payload: impl Into<Value>) -> Self {
        Self {
            payload: Some(payload.into()),
            ..Self::ok(id)
        }
    }

    pub fn error(id: Value, message: impl Into<String>) -> Self {
        Self {
            id,
            status: Status::Error,
            payload: None,
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}
