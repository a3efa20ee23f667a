//! Elasticsearch backend
//!
//! Pages through an index with `search_after` over `(@timestamp, id)`.
//!
//! Documents must carry an `id` field, the sort tiebreak. They are expected
//! to look like:
//!
//! ```json
//! {"@timestamp": "2024-01-01T00:00:00.000Z", "id": "…", "seq": 1,
//!  "logger": "app", "message": "…", "context": {"requestId": "…"}}
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::Source;
use crate::error::SourceError;
use crate::filter::Query;
use crate::line::Line;
use crate::page::Page;

// =============================================================================
// Configuration
// =============================================================================

/// Elasticsearch backend configuration
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Base URL (e.g., "http://localhost:9200")
    pub url: String,

    /// Index or index pattern
    pub index: String,

    /// Username for basic auth (optional)
    pub username: Option<String>,

    /// Password for basic auth (optional)
    pub password: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".into(),
            index: "logs".into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ElasticsearchConfig {
    pub fn new(url: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            index: index.into(),
            ..Default::default()
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// =============================================================================
// Backend Implementation
// =============================================================================

/// Search engine backed source
#[derive(Clone)]
pub struct ElasticsearchSource {
    client: reqwest::Client,
    config: ElasticsearchConfig,
}

impl std::fmt::Debug for ElasticsearchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchSource")
            .field("url", &self.config.url)
            .field("index", &self.config.index)
            .finish()
    }
}

impl ElasticsearchSource {
    pub fn new(config: &ElasticsearchConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SourceError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn search_url(&self) -> String {
        format!(
            "{}/{}/_search",
            self.config.url.trim_end_matches('/'),
            self.config.index
        )
    }
}

#[async_trait]
impl Source for ElasticsearchSource {
    async fn get(&self, query: &Query) -> Result<Page, SourceError> {
        let body = build_search_body(query);

        let mut request = self.client.post(self.search_url()).json(&body);
        if let (Some(user), Some(pass)) = (&self.config.username, &self.config.password) {
            request = request.basic_auth(user, Some(pass));
        }

        let response = request.send().await.map_err(|e| {
            SourceError::Connection(format!("Elasticsearch connection failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::Execution(format!(
                "Elasticsearch error ({}): {}",
                status, body
            )));
        }

        let response: SearchResponse = response
            .json()
            .await
            .map_err(|e| SourceError::Serialization(format!("invalid search response: {}", e)))?;

        let candidates = parse_hits(response)?;

        tracing::debug!(
            index = %self.config.index,
            hits = candidates.len(),
            fetch_size = query.fetch_size,
            "Elasticsearch page fetched"
        );

        Ok(Page::from_candidates(candidates, query.fetch_size))
    }

    fn name(&self) -> &'static str {
        "elasticsearch"
    }
}

// =============================================================================
// Query Building
// =============================================================================

/// Map a filter field to its document path
fn document_field(field: &str) -> String {
    match field {
        "id" | "logger" | "message" => field.to_string(),
        key => format!("context.{}", key),
    }
}

/// Build the `_search` request body for one bounded fetch
fn build_search_body(query: &Query) -> Value {
    let order = query.direction.as_str();

    let mut filter = Vec::new();
    for (field, values) in query.filters.active_matches() {
        filter.push(json!({ "terms": { document_field(field): values } }));
    }
    for (field, prefixes) in query.filters.active_prefixes() {
        let should: Vec<Value> = prefixes
            .iter()
            .map(|p| json!({ "prefix": { document_field(field): p } }))
            .collect();
        filter.push(json!({ "bool": { "should": should, "minimum_should_match": 1 } }));
    }

    let mut body = json!({
        "size": query.fetch_size.max(1) + 1,
        "sort": [
            { "@timestamp": { "order": order } },
            { "id": { "order": order } }
        ],
        "query": { "bool": { "filter": filter } }
    });

    if let Some(after) = &query.after {
        let (millis, id) = after.sort_key();
        body["search_after"] = json!([millis, id]);
    }

    body
}

// =============================================================================
// Response Parsing
// =============================================================================

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    doc_id: String,
    #[serde(rename = "_source")]
    source: HitSource,
}

#[derive(Debug, Deserialize)]
struct HitSource {
    #[serde(rename = "@timestamp")]
    timestamp: Value,
    id: Option<String>,
    #[serde(default)]
    seq: u64,
    #[serde(default)]
    logger: String,
    #[serde(default)]
    message: String,
    #[serde(default)]
    context: BTreeMap<String, Value>,
}

fn parse_hits(response: SearchResponse) -> Result<Vec<Line>, SourceError> {
    response
        .hits
        .hits
        .into_iter()
        .map(|hit| {
            let source = hit.source;
            // The cursor tiebreak is the `id` sort value; `_id` would not match it
            let id = source.id.ok_or_else(|| {
                SourceError::Serialization(format!("document '{}' has no id field", hit.doc_id))
            })?;
            let timestamp = parse_timestamp(&source.timestamp)?;
            let mut line = Line::new(id, timestamp)
                .with_seq(source.seq)
                .with_logger(source.logger)
                .with_message(source.message);
            for (key, value) in source.context {
                let value = match value {
                    Value::String(s) => s,
                    Value::Null => continue,
                    other => other.to_string(),
                };
                line = line.with_context(key, value);
            }
            Ok(line)
        })
        .collect()
}

/// Accepts epoch milliseconds or an RFC 3339 string
fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>, SourceError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| SourceError::Serialization(format!("invalid @timestamp: {}", n))),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| SourceError::Serialization(format!("invalid @timestamp '{}': {}", s, e))),
        other => Err(SourceError::Serialization(format!(
            "unsupported @timestamp: {}",
            other
        ))),
    }
}

#[cfg(test)]
#[path = "elasticsearch_test.rs"]
mod tests;
