//! Tests for filters and queries

use super::*;
use chrono::{TimeZone, Utc};

fn line(id: &str, ms: i64) -> Line {
    Line::new(id, Utc.timestamp_millis_opt(ms).unwrap())
        .with_logger("api.http")
        .with_message("GET /health")
        .with_context("host", "web-1")
}

// =============================================================================
// Matching
// =============================================================================

#[test]
fn test_empty_filters_match_everything() {
    let filters = Filters::new();
    assert!(filters.is_empty());
    assert!(filters.matches(&line("a", 0)));
}

#[test]
fn test_match_filter_any_value() {
    let filters = Filters::new()
        .with_match("logger", "worker")
        .with_match("logger", "api.http");
    assert!(filters.matches(&line("a", 0)));

    let filters = Filters::new().with_match("logger", "worker");
    assert!(!filters.matches(&line("a", 0)));
}

#[test]
fn test_match_filter_on_context_key() {
    assert!(Filters::new().with_match("host", "web-1").matches(&line("a", 0)));
    assert!(!Filters::new().with_match("host", "web-2").matches(&line("a", 0)));
    assert!(!Filters::new().with_match("region", "eu").matches(&line("a", 0)));
}

#[test]
fn test_prefix_filter() {
    assert!(Filters::new().with_prefix("logger", "api.").matches(&line("a", 0)));
    assert!(Filters::new().with_prefix("message", "GET").matches(&line("a", 0)));
    assert!(!Filters::new().with_prefix("message", "POST").matches(&line("a", 0)));
}

#[test]
fn test_all_fields_must_match() {
    let filters = Filters::new()
        .with_match("host", "web-1")
        .with_prefix("message", "POST");
    assert!(!filters.matches(&line("a", 0)));
}

#[test]
fn test_empty_value_list_constrains_nothing() {
    let mut filters = Filters::new();
    filters.match_filters.insert("logger".to_string(), Vec::new());
    assert!(filters.is_empty());
    assert!(filters.matches(&line("a", 0)));
}

// =============================================================================
// Signature
// =============================================================================

#[test]
fn test_signature_is_order_independent() {
    let a = Filters::new()
        .with_match("logger", "b")
        .with_match("logger", "a")
        .with_prefix("host", "web");
    let b = Filters::new()
        .with_prefix("host", "web")
        .with_match("logger", "a")
        .with_match("logger", "b")
        .with_match("logger", "a");
    assert_eq!(a.signature(), b.signature());
}

#[test]
fn test_signature_distinguishes_match_from_prefix() {
    let a = Filters::new().with_match("logger", "api");
    let b = Filters::new().with_prefix("logger", "api");
    assert_ne!(a.signature(), b.signature());
}

#[test]
fn test_signature_ignores_empty_lists() {
    let mut filters = Filters::new();
    filters.prefix_filters.insert("host".to_string(), Vec::new());
    assert_eq!(filters.signature(), Filters::new().signature());
}

#[test]
fn test_filters_from_request_json() {
    let filters: Filters =
        serde_json::from_str(r#"{"matchFilters":{"logger":["app"]},"prefixFilters":{}}"#)
            .unwrap();
    assert_eq!(filters.match_filters["logger"], vec!["app".to_string()]);
}

// =============================================================================
// Query bounds
// =============================================================================

#[test]
fn test_query_after_is_exclusive_ascending() {
    let query = Query::new(Filters::new()).with_after(Some(line("b", 10)));
    assert!(!query.accepts(&line("b", 10)));
    assert!(!query.accepts(&line("a", 10)));
    assert!(query.accepts(&line("c", 10)));
    assert!(query.accepts(&line("a", 11)));
}

#[test]
fn test_query_after_is_exclusive_descending() {
    let query = Query::new(Filters::new())
        .with_direction(Direction::Desc)
        .with_after(Some(line("b", 10)));
    assert!(!query.accepts(&line("b", 10)));
    assert!(query.accepts(&line("a", 10)));
    assert!(query.accepts(&line("z", 9)));
    assert!(!query.accepts(&line("a", 11)));
}

#[test]
fn test_normalized_forces_cursor_last() {
    let query = Query::new(Filters::new())
        .with_after(Some(line("a", 0).with_last(false)))
        .normalized();
    assert!(query.after.unwrap().is_last());
}
