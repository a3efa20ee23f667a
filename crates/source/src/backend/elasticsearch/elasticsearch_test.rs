//! Tests for the Elasticsearch backend

use super::*;
use crate::filter::Filters;
use crate::line::Direction;
use chrono::TimeZone;

fn cursor(id: &str, ms: i64) -> Line {
    Line::new(id, Utc.timestamp_millis_opt(ms).unwrap()).as_cursor()
}

// =============================================================================
// Query Building Tests
// =============================================================================

#[test]
fn test_body_requests_one_extra_candidate() {
    let body = build_search_body(&Query::new(Filters::new()).with_fetch_size(50));
    assert_eq!(body["size"], 51);
}

#[test]
fn test_body_sorts_by_timestamp_then_id() {
    let body = build_search_body(&Query::new(Filters::new()).with_direction(Direction::Desc));
    assert_eq!(body["sort"][0]["@timestamp"]["order"], "desc");
    assert_eq!(body["sort"][1]["id"]["order"], "desc");
}

#[test]
fn test_body_without_cursor_has_no_search_after() {
    let body = build_search_body(&Query::new(Filters::new()));
    assert!(body.get("search_after").is_none());
    assert_eq!(body["query"]["bool"]["filter"], json!([]));
}

#[test]
fn test_body_search_after_from_cursor() {
    let query = Query::new(Filters::new()).with_after(Some(cursor("abc", 1_700_000_000_000)));
    let body = build_search_body(&query);
    assert_eq!(body["search_after"], json!([1_700_000_000_000_i64, "abc"]));
}

#[test]
fn test_body_match_filters_become_terms() {
    let filters = Filters::new()
        .with_match("logger", "app")
        .with_match("requestId", "r-1");
    let body = build_search_body(&Query::new(filters));
    let filter = body["query"]["bool"]["filter"].as_array().unwrap();

    assert!(filter.contains(&json!({ "terms": { "logger": ["app"] } })));
    assert!(filter.contains(&json!({ "terms": { "context.requestId": ["r-1"] } })));
}

#[test]
fn test_body_prefix_filters_are_or_within_field() {
    let filters = Filters::new()
        .with_prefix("message", "GET")
        .with_prefix("message", "POST");
    let body = build_search_body(&Query::new(filters));
    let clause = &body["query"]["bool"]["filter"][0]["bool"];

    assert_eq!(clause["minimum_should_match"], 1);
    assert_eq!(clause["should"].as_array().unwrap().len(), 2);
    assert_eq!(clause["should"][0], json!({ "prefix": { "message": "GET" } }));
}

#[test]
fn test_document_field_mapping() {
    assert_eq!(document_field("id"), "id");
    assert_eq!(document_field("logger"), "logger");
    assert_eq!(document_field("pid"), "context.pid");
}

// =============================================================================
// Response Parsing Tests
// =============================================================================

#[test]
fn test_parse_hits() {
    let response: SearchResponse = serde_json::from_value(json!({
        "hits": { "hits": [
            {
                "_id": "doc-1",
                "_source": {
                    "@timestamp": "2024-01-01T00:00:00.250Z",
                    "id": "line-1",
                    "seq": 3,
                    "logger": "app",
                    "message": "hello",
                    "context": { "requestId": "r-1", "pid": 42, "empty": null }
                }
            },
            {
                "_id": "doc-2",
                "_source": { "@timestamp": 1704067200500_i64, "id": "line-2" }
            }
        ]}
    }))
    .unwrap();

    let lines = parse_hits(response).unwrap();
    assert_eq!(lines.len(), 2);

    assert_eq!(lines[0].id(), "line-1");
    assert_eq!(lines[0].seq(), 3);
    assert_eq!(lines[0].timestamp().timestamp_millis(), 1_704_067_200_250);
    assert_eq!(lines[0].field("requestId"), Some("r-1"));
    assert_eq!(lines[0].field("pid"), Some("42"));
    assert_eq!(lines[0].field("empty"), None);

    assert_eq!(lines[1].id(), "line-2");
    assert_eq!(lines[1].timestamp().timestamp_millis(), 1_704_067_200_500);
}

#[test]
fn test_parse_hit_without_id_fails() {
    let response: SearchResponse = serde_json::from_value(json!({
        "hits": { "hits": [
            { "_id": "doc-1", "_source": { "@timestamp": 1704067200500_i64 } }
        ]}
    }))
    .unwrap();

    let err = parse_hits(response).unwrap_err();
    assert!(matches!(err, SourceError::Serialization(_)));
    assert!(err.to_string().contains("doc-1"));
}

#[test]
fn test_parse_empty_hits() {
    let response: SearchResponse = serde_json::from_value(json!({ "hits": {} })).unwrap();
    assert!(parse_hits(response).unwrap().is_empty());
}

#[test]
fn test_parse_bad_timestamp() {
    assert!(parse_timestamp(&json!("yesterday")).is_err());
    assert!(parse_timestamp(&json!(true)).is_err());
}

#[test]
fn test_search_url() {
    let config = ElasticsearchConfig::new("http://es:9200/", "logs-*");
    let source = ElasticsearchSource::new(&config).unwrap();
    assert_eq!(source.search_url(), "http://es:9200/logs-*/_search");
    assert_eq!(source.name(), "elasticsearch");
}
