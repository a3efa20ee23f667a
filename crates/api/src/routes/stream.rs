//! HTTP streaming endpoint
//!
//! `GET /` returns the lines currently available, or with `follow=true`
//! holds the response open and streams new lines as they arrive.
//!
//! # Query Parameters
//!
//! - `matchFilters` - JSON map of field to accepted values
//! - `prefixFilters` - JSON map of field to accepted prefixes
//! - `afterLine` - JSON-encoded line to resume after
//! - `direction` - `asc` (default) or `desc`
//! - `fetchSize` - lines per source query
//! - `follow` - keep streaming
//! - `maxLines` - cap for non-follow requests
//! - `format` - `text` (default) or `json`

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use futures_util::stream;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::debug;
use trail_follow::{DataProvider, Subscription, UnsubscribeReason};
use trail_source::{Direction, Filters, Line};

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Raw query string
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StreamParams {
    pub match_filters: Option<String>,
    pub prefix_filters: Option<String>,
    pub after_line: Option<String>,
    pub direction: Option<String>,
    pub fetch_size: Option<usize>,
    pub follow: bool,
    pub max_lines: Option<usize>,
    pub format: Option<String>,
}

/// Response body format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// One rendered line per record
    #[default]
    Text,
    /// JSON array, or one JSON object per line when following
    Json,
}

impl OutputFormat {
    fn render(self, line: &Line) -> String {
        match self {
            Self::Text => format!("{}\n", line),
            Self::Json => match serde_json::to_string(line) {
                Ok(json) => format!("{}\n", json),
                Err(_) => format!("{}\n", line),
            },
        }
    }

    fn stream_content_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain; charset=utf-8",
            Self::Json => "application/x-ndjson",
        }
    }
}

/// Decoded stream request
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub filters: Filters,
    pub after: Option<Line>,
    pub direction: Direction,
    pub fetch_size: Option<usize>,
    pub follow: bool,
    pub max_lines: Option<usize>,
    pub format: OutputFormat,
}

impl TryFrom<StreamParams> for StreamRequest {
    type Error = ApiError;

    fn try_from(params: StreamParams) -> Result<Self> {
        let filters = Filters {
            match_filters: decode_map("matchFilters", params.match_filters.as_deref())?,
            prefix_filters: decode_map("prefixFilters", params.prefix_filters.as_deref())?,
        };

        let after = params
            .after_line
            .as_deref()
            .map(|raw| {
                serde_json::from_str::<Line>(raw)
                    .map_err(|e| ApiError::invalid_param("afterLine", e.to_string()))
            })
            .transpose()?;

        let direction = params
            .direction
            .as_deref()
            .map(|raw| {
                raw.parse::<Direction>()
                    .map_err(|e| ApiError::invalid_param("direction", e))
            })
            .transpose()?
            .unwrap_or_default();

        let format = match params.format.as_deref() {
            None | Some("text") => OutputFormat::Text,
            Some("json") => OutputFormat::Json,
            Some(other) => {
                return Err(ApiError::invalid_param(
                    "format",
                    format!("unknown format '{}'", other),
                ));
            }
        };

        Ok(Self {
            filters,
            after,
            direction,
            fetch_size: params.fetch_size,
            follow: params.follow,
            max_lines: params.max_lines,
            format,
        })
    }
}

fn decode_map(param: &str, raw: Option<&str>) -> Result<BTreeMap<String, Vec<String>>> {
    match raw {
        None | Some("") => Ok(BTreeMap::new()),
        Some(raw) => {
            serde_json::from_str(raw).map_err(|e| ApiError::invalid_param(param, e.to_string()))
        }
    }
}

/// GET /
pub async fn stream_handler(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Response> {
    let request = StreamRequest::try_from(params)?;
    if request.follow {
        follow(state, request)
    } else {
        fetch(state, request).await
    }
}

/// Drain what is available and return it in one body
async fn fetch(state: AppState, request: StreamRequest) -> Result<Response> {
    let provider = state.provider.clone();
    let fetch_size = provider.limits().resolve(request.fetch_size);
    let max_lines = state.line_limit(request.max_lines);
    let query = trail_source::Query::new(request.filters)
        .with_after(request.after)
        .with_direction(request.direction)
        .with_fetch_size(fetch_size);

    let lines = provider.collect(query, max_lines).await?;

    debug!(lines = lines.len(), "Fetch served");

    Ok(match request.format {
        OutputFormat::Json => Json(lines).into_response(),
        OutputFormat::Text => {
            let body: String = lines.iter().map(|l| OutputFormat::Text.render(l)).collect();
            ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
        }
    })
}

/// Removes the stream's subscription when the response body is dropped
struct SubscriptionGuard {
    provider: Arc<DataProvider>,
    subscription: Subscription,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let removed = self
            .provider
            .subscriptions()
            .unsubscribe(&self.subscription, UnsubscribeReason::ConnectionClosed);
        if removed {
            debug!(subscription = %self.subscription, "Follow stream closed by client");
        }
    }
}

struct FollowStream {
    rx: mpsc::Receiver<Line>,
    format: OutputFormat,
    _guard: SubscriptionGuard,
}

/// Subscribe anonymously and stream lines until either side goes away
fn follow(state: AppState, request: StreamRequest) -> Result<Response> {
    let (tx, rx) = mpsc::channel(state.channel_capacity);
    let subscription = Subscription::anonymous(request.filters.signature());

    state.provider.subscribe(
        subscription.clone(),
        request.filters,
        request.direction,
        request.fetch_size,
        request.after,
        Arc::new(tx),
    )?;
    debug!(subscription = %subscription, "Follow stream opened");

    let follow = FollowStream {
        rx,
        format: request.format,
        _guard: SubscriptionGuard {
            provider: state.provider.clone(),
            subscription,
        },
    };
    let content_type = follow.format.stream_content_type();

    let body = stream::unfold(follow, |mut follow| async move {
        let line = follow.rx.recv().await?;
        let chunk = follow.format.render(&line);
        Some((Ok::<_, Infallible>(chunk), follow))
    });

    Ok(([(header::CONTENT_TYPE, content_type)], Body::from_stream(body)).into_response())
}
