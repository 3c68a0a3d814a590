//! End-to-end flow: expectations parsed from JSON, requests matched through the registry.

use bytes::Bytes;
use mock_matcher::predicate::FieldName;
use mock_matcher::{parse_expectations, HttpRequest, MatcherChange, MatcherConfig, RequestMatchers};
use serde_json::json;
use std::sync::Arc;

const EXPECTATIONS: &str = r#"[
  {
    "id": "create-user",
    "priority": 10,
    "httpRequest": {
      "method": "POST",
      "path": "/users",
      "headers": { "Content-Type": "application/json" },
      "body": { "type": "JSON", "json": { "name": "alice" } }
    },
    "action": { "statusCode": 201 }
  },
  {
    "id": "get-user",
    "httpRequest": {
      "method": "GET",
      "path": "/users/{id}",
      "pathParameters": { "id": "[0-9]+" }
    }
  },
  {
    "id": "fallback",
    "priority": -1,
    "httpRequest": { "path": "/.*" }
  }
]"#;

fn registry() -> RequestMatchers {
    let registry = RequestMatchers::from_config(&MatcherConfig::default());
    for expectation in parse_expectations(EXPECTATIONS).unwrap() {
        registry.add(expectation).unwrap();
    }
    registry
}

fn request(value: serde_json::Value) -> HttpRequest {
    serde_json::from_value(value).unwrap()
}

fn first_id(registry: &RequestMatchers, request: &HttpRequest) -> Option<String> {
    registry.first_match(request).map(|m| m.id().to_string())
}

#[test]
fn test_json_body_and_headers() {
    let registry = registry();
    let create = request(json!({
        "method": "POST",
        "path": "/users",
        "headers": { "content-type": "application/json" },
        "body": "{\"name\": \"alice\", \"age\": 3}"
    }));
    assert_eq!(first_id(&registry, &create).as_deref(), Some("create-user"));

    let matched = registry.first_match(&create).unwrap();
    assert_eq!(matched.expectation().action, json!({ "statusCode": 201 }));

    let other_name = request(json!({
        "method": "POST",
        "path": "/users",
        "headers": { "content-type": "application/json" },
        "body": "{\"name\": \"bob\"}"
    }));
    assert_eq!(first_id(&registry, &other_name).as_deref(), Some("fallback"));
}

#[test]
fn test_path_template_parameters() {
    let registry = registry();
    let get = request(json!({ "method": "GET", "path": "/users/42" }));
    assert_eq!(first_id(&registry, &get).as_deref(), Some("get-user"));

    let not_numeric = request(json!({ "method": "GET", "path": "/users/abc" }));
    assert_eq!(first_id(&registry, &not_numeric).as_deref(), Some("fallback"));
}

#[test]
fn test_all_matches_in_priority_order() {
    let registry = registry();
    let get = request(json!({ "method": "GET", "path": "/users/42" }));
    let ids: Vec<_> = registry
        .all_matches(&get)
        .iter()
        .map(|m| m.id().to_string())
        .collect();
    assert_eq!(ids, ["get-user", "fallback"]);
}

#[test]
fn test_explain_reports_every_failing_field() {
    let registry = registry();
    let wrong = request(json!({
        "method": "PUT",
        "path": "/users",
        "body": "[1, 2]"
    }));
    let (matched, diagnostics) = registry.explain("create-user", &wrong).unwrap();
    assert!(!matched);
    assert!(!diagnostics.differences(FieldName::Method).is_empty());
    assert!(!diagnostics.differences(FieldName::Headers).is_empty());
    assert!(!diagnostics.differences(FieldName::Body).is_empty());
    assert!(diagnostics.differences(FieldName::Path).is_empty());

    let report = diagnostics.report();
    assert!(report.contains("PUT /users"));
}

#[test]
fn test_request_from_hyper_parts() {
    let registry = registry();
    let (parts, ()) = hyper::Request::builder()
        .method("POST")
        .uri("https://example.com/users?source=web")
        .header("Content-Type", "application/json")
        .header("Cookie", "session=abc; theme=dark")
        .body(())
        .unwrap()
        .into_parts();
    let candidate = HttpRequest::from_parts(&parts, Bytes::from_static(b"{\"name\":\"alice\"}"));

    assert_eq!(candidate.secure, Some(true));
    assert_eq!(candidate.query_parameters.first_value("source"), Some("web"));
    assert_eq!(candidate.cookies.first_value("theme"), Some("dark"));
    assert_eq!(first_id(&registry, &candidate).as_deref(), Some("create-user"));
}

#[tokio::test]
async fn test_change_listener() {
    let registry = Arc::new(RequestMatchers::from_config(&MatcherConfig::default()));
    let mut changes = registry.subscribe();

    let writer = registry.clone();
    tokio::spawn(async move {
        for expectation in parse_expectations(EXPECTATIONS).unwrap() {
            writer.add(expectation).unwrap();
        }
        writer.remove("fallback");
    });

    let mut seen = Vec::new();
    while seen.len() < 4 {
        seen.push(changes.recv().await.unwrap());
    }
    assert_eq!(
        seen,
        [
            MatcherChange::Added("create-user".into()),
            MatcherChange::Added("get-user".into()),
            MatcherChange::Added("fallback".into()),
            MatcherChange::Removed("fallback".into()),
        ]
    );
    assert_eq!(registry.len(), 2);
}
