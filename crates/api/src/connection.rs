//! Per-connection dispatcher
//!
//! Transport-agnostic handling of RPC requests for one client connection.
//! The socket handler feeds text frames in and forwards [`Outbound`] items
//! to the client; tests drive it directly without a socket.
//!
//! Lines and late responses reach the client through one bounded channel, so
//! a slow client applies backpressure to the tasks serving it. Pool permits
//! are held only for store queries, never while waiting on that channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use trail_follow::{DataProvider, FollowError, LineSink, Subscription};
use trail_source::Line;
use uuid::Uuid;

use crate::rpc::{Envelope, Method, QueryParams, Response, UnsubscribeParams};

/// Item queued for delivery to the client
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A delivered record (binary frame)
    Line(Line),
    /// A response pushed after the immediate acknowledgment (text frame)
    Response(Response),
}

/// Line sink writing into a connection's outbound channel
///
/// Stops accepting after `limit` lines.
struct OutboundSink {
    tx: mpsc::Sender<Outbound>,
    limit: usize,
    sent: AtomicUsize,
}

impl OutboundSink {
    fn new(tx: mpsc::Sender<Outbound>, limit: usize) -> Self {
        Self {
            tx,
            limit,
            sent: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl LineSink for OutboundSink {
    async fn send(&self, line: Line) -> trail_follow::Result<()> {
        if self.sent.fetch_add(1, Ordering::Relaxed) >= self.limit {
            return Err(FollowError::SinkClosed);
        }
        self.tx
            .send(Outbound::Line(line))
            .await
            .map_err(|_| FollowError::SinkClosed)
    }
}

/// One client connection
pub struct Connection {
    id: String,
    provider: Arc<DataProvider>,
    max_lines: usize,
    outbound: mpsc::Sender<Outbound>,
}

impl Connection {
    pub fn new(
        provider: Arc<DataProvider>,
        max_lines: usize,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            provider,
            max_lines,
            outbound,
        }
    }

    /// Connection id, used as the client id of its subscriptions
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Handle one text frame, returning the immediate response
    pub fn handle_text(&self, text: &str) -> Response {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!(connection = %self.id, error = %e, "Malformed request");
                return Response::error(Value::Null, format!("malformed request: {}", e));
            }
        };

        let Some(method) = Method::parse(&envelope.method) else {
            return Response::error(
                envelope.id,
                format!("unknown method '{}'", envelope.method),
            );
        };

        match method {
            Method::Get => self.get(envelope.id, envelope.params),
            Method::Subscribe => self.subscribe(envelope.id, envelope.params),
            Method::Unsubscribe => self.unsubscribe(envelope.id, envelope.params),
        }
    }

    /// Drop every subscription this connection owns
    pub fn close(&self) -> usize {
        let removed = self.provider.unsubscribe_client(&self.id);
        debug!(connection = %self.id, subscriptions = removed, "Connection closed");
        removed
    }

    fn get(&self, id: Value, params: Value) -> Response {
        let params = match parse_params::<QueryParams>(params) {
            Ok(params) => params,
            Err(message) => return Response::error(id, message),
        };

        let limit = params
            .max_lines
            .map_or(self.max_lines, |n| n.min(self.max_lines));
        let query = params.to_query(self.provider.limits().resolve(params.fetch_size));
        let provider = self.provider.clone();
        let outbound = self.outbound.clone();
        let request_id = id.clone();
        let connection = self.id.clone();

        // Detached; the ack below does not wait for the drain. Each page
        // query takes a pool permit inside `get`.
        tokio::spawn(async move {
            let sink = OutboundSink::new(outbound.clone(), limit);
            if let Err(e) = provider.get(query, &sink).await {
                warn!(connection = %connection, error = %e, "GET failed");
                let _ = outbound
                    .send(Outbound::Response(Response::error(request_id, e.to_string())))
                    .await;
            }
        });

        Response::ok(id)
    }

    fn subscribe(&self, id: Value, params: Value) -> Response {
        let params = match parse_params::<QueryParams>(params) {
            Ok(params) => params,
            Err(message) => return Response::error(id, message),
        };

        let subscription = Subscription::new(self.id.as_str(), params.filters.signature());
        let sink = Arc::new(OutboundSink::new(self.outbound.clone(), usize::MAX));

        match self.provider.subscribe(
            subscription,
            params.filters,
            params.direction,
            params.fetch_size,
            params.after_line,
            sink,
        ) {
            Ok(topic) => Response::ok_with(id, topic),
            Err(e) => Response::error(id, e.to_string()),
        }
    }

    fn unsubscribe(&self, id: Value, params: Value) -> Response {
        let params = match parse_params::<UnsubscribeParams>(params) {
            Ok(params) => params,
            Err(message) => return Response::error(id, message),
        };

        let removed = self
            .provider
            .unsubscribe(&Subscription::new(self.id.as_str(), params.topic));
        if !removed {
            debug!(connection = %self.id, "Unsubscribe for unknown topic");
        }
        Response::ok(id)
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: Value) -> Result<T, String> {
    // Absent params behave like an empty object
    let params = if params.is_null() {
        Value::Object(Default::default())
    } else {
        params
    };
    serde_json::from_value(params).map_err(|e| format!("invalid params: {}", e))
}

#[cfg(test)]
#[path = "connection_test.rs"]
mod tests;
