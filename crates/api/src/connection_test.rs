//! Tests for the connection dispatcher

use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tokio::time::sleep;
use trail_follow::{BackoffConfig, FetchLimits, Subscriptions};
use trail_source::{Filters, MemorySource, Source};

use super::*;
use crate::rpc::Status;

fn line(i: i64, logger: &str) -> Line {
    Line::new(format!("{i:04}"), Utc.timestamp_millis_opt(1_000 + i).unwrap())
        .with_logger(logger)
        .with_message(format!("message {i}"))
}

fn provider(source: Arc<dyn Source>) -> Arc<DataProvider> {
    Arc::new(DataProvider::new(
        source,
        Subscriptions::new(2),
        BackoffConfig {
            delay: Duration::from_millis(100),
            max_backoff_cycles: 30,
            timeout: Duration::from_secs(60),
            poll_interval: Duration::from_millis(100),
        },
        FetchLimits {
            default_fetch_size: 2,
            max_fetch_size: 10,
        },
    ))
}

fn connection(source: Arc<dyn Source>) -> (Connection, mpsc::Receiver<Outbound>) {
    let (tx, rx) = mpsc::channel(64);
    (Connection::new(provider(source), 100, tx), rx)
}

fn memory(lines: impl IntoIterator<Item = Line>) -> Arc<MemorySource> {
    Arc::new(MemorySource::with_lines(lines))
}

fn drain(rx: &mut mpsc::Receiver<Outbound>) -> Vec<Outbound> {
    let mut out = Vec::new();
    while let Ok(item) = rx.try_recv() {
        out.push(item);
    }
    out
}

fn line_ids(items: &[Outbound]) -> Vec<String> {
    items
        .iter()
        .filter_map(|item| match item {
            Outbound::Line(line) => Some(line.id().to_string()),
            Outbound::Response(_) => None,
        })
        .collect()
}

// =============================================================================
// Envelope handling
// =============================================================================

#[tokio::test]
async fn test_malformed_request_is_error() {
    let (conn, _rx) = connection(memory([]));

    let response = conn.handle_text("{not json");
    assert_eq!(response.status, Status::Error);
    assert_eq!(response.id, Value::Null);
}

#[tokio::test]
async fn test_unknown_method_is_error_with_id() {
    let (conn, _rx) = connection(memory([]));

    let response = conn.handle_text(r#"{"method":"PUBLISH","id":"abc"}"#);
    assert_eq!(response.status, Status::Error);
    assert_eq!(response.id, json!("abc"));
    assert!(response.error.unwrap().contains("PUBLISH"));
}

#[tokio::test]
async fn test_invalid_params_is_error() {
    let (conn, _rx) = connection(memory([]));

    let response = conn.handle_text(r#"{"method":"GET","params":{"direction":"sideways"},"id":1}"#);
    assert_eq!(response.status, Status::Error);
    assert_eq!(response.id, json!(1));
}

// =============================================================================
// GET
// =============================================================================

#[tokio::test]
async fn test_get_acks_then_pushes_lines() {
    let (conn, mut rx) = connection(memory((0..5).map(|i| line(i, "app"))));

    let response = conn.handle_text(r#"{"method":"GET","params":{},"id":1}"#);
    assert!(response.is_ok());
    assert!(response.payload.is_none());

    let mut ids = Vec::new();
    while ids.len() < 5 {
        match rx.recv().await.unwrap() {
            Outbound::Line(line) => ids.push(line.id().to_string()),
            Outbound::Response(r) => panic!("unexpected response {:?}", r),
        }
    }
    assert_eq!(ids, vec!["0000", "0001", "0002", "0003", "0004"]);
}

#[tokio::test]
async fn test_get_respects_max_lines() {
    let (conn, mut rx) = connection(memory((0..20).map(|i| line(i, "app"))));

    let response = conn.handle_text(r#"{"method":"GET","params":{"maxLines":3},"id":1}"#);
    assert!(response.is_ok());

    sleep(Duration::from_millis(50)).await;
    assert_eq!(line_ids(&drain(&mut rx)), vec!["0000", "0001", "0002"]);
}

#[tokio::test]
async fn test_stalled_clients_do_not_block_other_gets() {
    let source = memory((0..20).map(|i| line(i, "app")));
    let provider = provider(source);

    // One more stalled client than pool slots; none of them read
    let mut stalled = Vec::new();
    for _ in 0..3 {
        let (tx, rx) = mpsc::channel(1);
        let conn = Connection::new(provider.clone(), 100, tx);
        assert!(conn.handle_text(r#"{"method":"GET","params":{},"id":1}"#).is_ok());
        stalled.push((conn, rx));
    }
    sleep(Duration::from_millis(50)).await;

    let (tx, mut rx) = mpsc::channel(64);
    let conn = Connection::new(provider, 100, tx);
    assert!(conn.handle_text(r#"{"method":"GET","params":{"maxLines":3},"id":2}"#).is_ok());

    let mut ids = Vec::new();
    while ids.len() < 3 {
        match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(Outbound::Line(line))) => ids.push(line.id().to_string()),
            other => panic!("GET starved behind stalled clients: {:?}", other),
        }
    }
    assert_eq!(ids, vec!["0000", "0001", "0002"]);
}

#[tokio::test]
async fn test_get_failure_pushes_error_with_same_id() {
    let source = memory([line(0, "app")]);
    source.close().await.unwrap();
    let (conn, mut rx) = connection(source);

    let response = conn.handle_text(r#"{"method":"GET","params":{},"id":42}"#);
    assert!(response.is_ok());

    match rx.recv().await.unwrap() {
        Outbound::Response(late) => {
            assert_eq!(late.status, Status::Error);
            assert_eq!(late.id, json!(42));
        }
        Outbound::Line(line) => panic!("unexpected line {}", line),
    }
}

// =============================================================================
// SUBSCRIBE / UNSUBSCRIBE
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_subscribe_returns_topic_and_tags_lines() {
    let source = memory([line(0, "api"), line(1, "db"), line(2, "api")]);
    let (conn, mut rx) = connection(source);
    let filters = Filters::new().with_match("logger", "api");

    let response = conn.handle_text(
        &json!({
            "method": "SUBSCRIBE",
            "params": {"matchFilters": {"logger": ["api"]}},
            "id": 1
        })
        .to_string(),
    );
    assert!(response.is_ok());
    assert_eq!(response.payload, Some(json!(filters.signature())));

    sleep(Duration::from_millis(250)).await;
    let items = drain(&mut rx);
    assert_eq!(line_ids(&items), vec!["0000", "0002"]);
    for item in &items {
        if let Outbound::Line(line) = item {
            assert_eq!(line.topic(), Some(filters.signature().as_str()));
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_stops_stream() {
    let source = memory([line(0, "app")]);
    let (conn, mut rx) = connection(source.clone());

    let response = conn.handle_text(r#"{"method":"SUBSCRIBE","params":{},"id":1}"#);
    let topic = response.payload.unwrap();
    sleep(Duration::from_millis(150)).await;
    drain(&mut rx);

    let response = conn.handle_text(
        &json!({"method": "UNSUBSCRIBE", "params": {"topic": topic}, "id": 2}).to_string(),
    );
    assert!(response.is_ok());
    assert!(conn.provider.subscriptions().is_empty());

    source.append(line(1, "app"));
    sleep(Duration::from_secs(2)).await;
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_unsubscribe_unknown_topic_is_ok() {
    let (conn, _rx) = connection(memory([]));

    let response =
        conn.handle_text(r#"{"method":"UNSUBSCRIBE","params":{"topic":"nope"},"id":3}"#);
    assert!(response.is_ok());
    assert_eq!(response.id, json!(3));
}

#[tokio::test]
async fn test_unsubscribe_without_topic_is_error() {
    let (conn, _rx) = connection(memory([]));

    let response = conn.handle_text(r#"{"method":"UNSUBSCRIBE","id":4}"#);
    assert_eq!(response.status, Status::Error);
}

// =============================================================================
// Connection close
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_close_removes_only_own_subscriptions() {
    let source: Arc<dyn Source> = memory([line(0, "api"), line(1, "db")]);
    let provider = provider(source);
    let (tx_a, _rx_a) = mpsc::channel(64);
    let (tx_b, _rx_b) = mpsc::channel(64);
    let a = Connection::new(provider.clone(), 100, tx_a);
    let b = Connection::new(provider.clone(), 100, tx_b);

    a.handle_text(r#"{"method":"SUBSCRIBE","params":{"matchFilters":{"logger":["api"]}},"id":1}"#);
    a.handle_text(r#"{"method":"SUBSCRIBE","params":{"matchFilters":{"logger":["db"]}},"id":2}"#);
    b.handle_text(r#"{"method":"SUBSCRIBE","params":{},"id":1}"#);
    assert_eq!(provider.subscriptions().len(), 3);

    assert_eq!(a.close(), 2);
    let remaining = provider.subscriptions().get_all();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].client_id(), b.id());
}
