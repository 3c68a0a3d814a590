//! Structural JSON body matching.
//!
//! Two modes:
//! - `STRICT`: trees must be equal, including array order and with no extra
//!   object fields or array items in the candidate.
//! - `ONLY_MATCHING_FIELDS`: every expected field and array item must be present
//!   in the candidate; extra fields and items are tolerated and arrays are
//!   compared without regard to order.
//!
//! Expected string values may be placeholders:
//! `${json-unit.ignore}`, `${json-unit.any-string}`, `${json-unit.any-number}`,
//! `${json-unit.any-boolean}`.

use super::precheck;
use crate::predicate::diagnostics::{diff, FieldName, MatchDiagnostics};
use crate::predicate::subset::maximum_matching;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tracing::warn;

const IGNORE: &str = "${json-unit.ignore}";
const ANY_STRING: &str = "${json-unit.any-string}";
const ANY_NUMBER: &str = "${json-unit.any-number}";
const ANY_BOOLEAN: &str = "${json-unit.any-boolean}";

/// How strictly candidate JSON must follow the expected tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JsonMatchType {
    #[serde(alias = "strict")]
    Strict,
    #[default]
    #[serde(alias = "onlyMatchingFields")]
    OnlyMatchingFields,
}

/// Classification of a structural difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonDifferenceKind {
    /// Present in the candidate but not expected
    Extra,
    /// Expected but absent from the candidate
    Missing,
    /// Present on both sides with different values
    Different,
}

impl fmt::Display for JsonDifferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JsonDifferenceKind::Extra => "EXTRA",
            JsonDifferenceKind::Missing => "MISSING",
            JsonDifferenceKind::Different => "DIFFERENT",
        })
    }
}

/// One structural difference between expected and actual JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonDifference {
    pub kind: JsonDifferenceKind,
    /// JSONPath-like location, e.g. `$.items[1].id`
    pub path: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl fmt::Display for JsonDifference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.path)?;
        if let Some(expected) = &self.expected {
            write!(f, " expected: {expected}")?;
        }
        if let Some(actual) = &self.actual {
            write!(f, " found: {actual}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Segment<'a> {
    Field(&'a str),
    Index(usize),
}

fn render_path(trail: &[Segment<'_>]) -> String {
    let mut path = String::from("$");
    for segment in trail {
        match segment {
            Segment::Field(name) => {
                path.push('.');
                path.push_str(name);
            }
            Segment::Index(i) => path.push_str(&format!("[{i}]")),
        }
    }
    path
}

/// Walks two trees and collects differences.
struct Comparison<'a> {
    match_type: JsonMatchType,
    /// Stop at the first difference
    first_only: bool,
    trail: Vec<Segment<'a>>,
    differences: Vec<JsonDifference>,
}

impl<'a> Comparison<'a> {
    fn new(match_type: JsonMatchType, first_only: bool) -> Self {
        Self {
            match_type,
            first_only,
            trail: Vec::new(),
            differences: Vec::new(),
        }
    }

    fn done(&self) -> bool {
        self.first_only && !self.differences.is_empty()
    }

    fn record(&mut self, kind: JsonDifferenceKind, expected: Option<&Value>, actual: Option<&Value>) {
        self.differences.push(JsonDifference {
            kind,
            path: render_path(&self.trail),
            expected: expected.map(Value::to_string),
            actual: actual.map(Value::to_string),
        });
    }

    fn compare(&mut self, expected: &'a Value, actual: &'a Value) {
        if self.done() {
            return;
        }
        match (expected, actual) {
            (Value::String(placeholder), _) if is_placeholder(placeholder) => {
                if !placeholder_matches(placeholder, actual) {
                    self.record(JsonDifferenceKind::Different, Some(expected), Some(actual));
                }
            }
            (Value::Object(expected_fields), Value::Object(actual_fields)) => {
                for (name, expected_value) in expected_fields {
                    self.trail.push(Segment::Field(name));
                    match actual_fields.get(name) {
                        Some(actual_value) => self.compare(expected_value, actual_value),
                        None => self.record(JsonDifferenceKind::Missing, Some(expected_value), None),
                    }
                    self.trail.pop();
                    if self.done() {
                        return;
                    }
                }
                if self.match_type == JsonMatchType::Strict {
                    for (name, actual_value) in actual_fields {
                        if !expected_fields.contains_key(name) {
                            self.trail.push(Segment::Field(name));
                            self.record(JsonDifferenceKind::Extra, None, Some(actual_value));
                            self.trail.pop();
                            if self.done() {
                                return;
                            }
                        }
                    }
                }
            }
            (Value::Array(expected_items), Value::Array(actual_items)) => match self.match_type {
                JsonMatchType::Strict => self.compare_ordered(expected_items, actual_items),
                JsonMatchType::OnlyMatchingFields => self.compare_unordered(expected_items, actual_items),
            },
            (Value::Number(e), Value::Number(a)) => {
                if !numbers_equal(e, a) {
                    self.record(JsonDifferenceKind::Different, Some(expected), Some(actual));
                }
            }
            _ => {
                if expected != actual {
                    self.record(JsonDifferenceKind::Different, Some(expected), Some(actual));
                }
            }
        }
    }

    fn compare_ordered(&mut self, expected: &'a [Value], actual: &'a [Value]) {
        for (i, expected_item) in expected.iter().enumerate() {
            self.trail.push(Segment::Index(i));
            match actual.get(i) {
                Some(actual_item) => self.compare(expected_item, actual_item),
                None => self.record(JsonDifferenceKind::Missing, Some(expected_item), None),
            }
            self.trail.pop();
            if self.done() {
                return;
            }
        }
        for (i, actual_item) in actual.iter().enumerate().skip(expected.len()) {
            self.trail.push(Segment::Index(i));
            self.record(JsonDifferenceKind::Extra, None, Some(actual_item));
            self.trail.pop();
            if self.done() {
                return;
            }
        }
    }

    /// Every expected item must be matched by a distinct actual item.
    fn compare_unordered(&mut self, expected: &'a [Value], actual: &'a [Value]) {
        // candidates[i] = actual indexes that item i of expected matches
        let candidates: Vec<Vec<usize>> = expected
            .iter()
            .map(|e| {
                actual
                    .iter()
                    .enumerate()
                    .filter(|(_, a)| tree_matches(e, a, self.match_type))
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();

        let assignment = maximum_matching(&candidates, actual.len());
        for (i, assigned) in assignment.iter().enumerate() {
            if assigned.is_none() {
                self.trail.push(Segment::Index(i));
                self.record(JsonDifferenceKind::Missing, Some(&expected[i]), None);
                self.trail.pop();
                if self.done() {
                    return;
                }
            }
        }
    }
}

fn tree_matches(expected: &Value, actual: &Value, match_type: JsonMatchType) -> bool {
    let mut comparison = Comparison::new(match_type, true);
    comparison.compare(expected, actual);
    comparison.differences.is_empty()
}

fn is_placeholder(value: &str) -> bool {
    matches!(value, IGNORE | ANY_STRING | ANY_NUMBER | ANY_BOOLEAN)
}

fn placeholder_matches(placeholder: &str, actual: &Value) -> bool {
    match placeholder {
        IGNORE => true,
        ANY_STRING => actual.is_string(),
        ANY_NUMBER => actual.is_number(),
        ANY_BOOLEAN => actual.is_boolean(),
        _ => false,
    }
}

fn numbers_equal(expected: &serde_json::Number, actual: &serde_json::Number) -> bool {
    if let (Some(e), Some(a)) = (expected.as_i64(), actual.as_i64()) {
        return e == a;
    }
    if let (Some(e), Some(a)) = (expected.as_u64(), actual.as_u64()) {
        return e == a;
    }
    match (expected.as_f64(), actual.as_f64()) {
        (Some(e), Some(a)) => e == a,
        _ => false,
    }
}

/// Compare two JSON trees, returning every difference found.
pub fn compare_json(expected: &Value, actual: &Value, match_type: JsonMatchType) -> Vec<JsonDifference> {
    let mut comparison = Comparison::new(match_type, false);
    comparison.compare(expected, actual);
    comparison.differences
}

/// JSON body matcher.
#[derive(Debug)]
pub struct JsonBodyMatcher {
    pattern: String,
    match_type: JsonMatchType,
    compiled: OnceCell<Result<Value, String>>,
}

impl JsonBodyMatcher {
    pub fn new(pattern: impl Into<String>, match_type: JsonMatchType) -> Self {
        Self {
            pattern: pattern.into(),
            match_type,
            compiled: OnceCell::new(),
        }
    }

    /// Pattern given as a JSON value; a JSON string is taken as the pattern text.
    pub fn from_value(value: &Value, match_type: JsonMatchType) -> Self {
        match value {
            Value::String(text) => Self::new(text.clone(), match_type),
            other => Self::new(other.to_string(), match_type),
        }
    }

    pub fn match_type(&self) -> JsonMatchType {
        self.match_type
    }

    pub fn is_blank(&self) -> bool {
        self.pattern.trim().is_empty()
    }

    fn expected(&self) -> &Result<Value, String> {
        self.compiled.get_or_init(|| {
            serde_json::from_str(&self.pattern).map_err(|e| {
                warn!("JSON body pattern is not valid JSON, it will never match: {}", e);
                e.to_string()
            })
        })
    }

    pub fn matches(&self, mut diagnostics: Option<&mut MatchDiagnostics>, candidate: Option<&str>) -> bool {
        if let Some(result) = precheck(diagnostics.as_deref_mut(), self.is_blank(), candidate) {
            return result;
        }
        let Some(candidate) = candidate else {
            return false;
        };
        if candidate == self.pattern {
            return true;
        }

        let expected = match self.expected() {
            Ok(expected) => expected,
            Err(e) => {
                diff!(diagnostics, FieldName::Body, "json pattern failed to parse: {}", e);
                return false;
            }
        };
        let actual: Value = match serde_json::from_str(candidate) {
            Ok(actual) => actual,
            Err(e) => {
                diff!(
                    diagnostics,
                    FieldName::Body,
                    "failed to parse body as json: {} body: {}",
                    e,
                    candidate
                );
                return false;
            }
        };

        let detailed = diagnostics.as_deref().is_some_and(MatchDiagnostics::is_enabled);
        let mut comparison = Comparison::new(self.match_type, !detailed);
        comparison.compare(expected, &actual);
        if comparison.differences.is_empty() {
            return true;
        }

        if detailed {
            let reasons: Vec<String> = comparison
                .differences
                .iter()
                .map(|d| format!("  {d}"))
                .collect();
            diff!(
                diagnostics,
                FieldName::Body,
                "json match failed expected:\n  {}\nfound:\n  {}\nfailed because:\n{}",
                self.pattern,
                candidate,
                reasons.join("\n")
            );
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relaxed(pattern: &str) -> JsonBodyMatcher {
        JsonBodyMatcher::new(pattern, JsonMatchType::OnlyMatchingFields)
    }

    fn strict(pattern: &str) -> JsonBodyMatcher {
        JsonBodyMatcher::new(pattern, JsonMatchType::Strict)
    }

    #[test]
    fn test_relaxed_tolerates_extra_fields() {
        assert!(relaxed(r#"{"a":1}"#).matches(None, Some(r#"{"a":1,"b":2}"#)));
        assert!(!strict(r#"{"a":1}"#).matches(None, Some(r#"{"a":1,"b":2}"#)));
    }

    #[test]
    fn test_key_order_is_irrelevant() {
        assert!(strict(r#"{"a":1,"b":2}"#).matches(None, Some(r#"{"b":2,"a":1}"#)));
    }

    #[test]
    fn test_arrays() {
        // order
        assert!(relaxed("[1,2,3]").matches(None, Some("[3,1,2]")));
        assert!(!strict("[1,2,3]").matches(None, Some("[3,1,2]")));
        // extra items
        assert!(relaxed("[1,2]").matches(None, Some("[1,2,3]")));
        assert!(!strict("[1,2]").matches(None, Some("[1,2,3]")));
        // duplicates need distinct items
        assert!(!relaxed("[1,1]").matches(None, Some("[1,2]")));
    }

    #[test]
    fn test_unordered_arrays_need_an_assignment() {
        // A greedy pass would pair {"a":1} with the richer object first
        let pattern = r#"[{"a":1},{"a":1,"b":2}]"#;
        let candidate = r#"[{"a":1,"b":2},{"a":1}]"#;
        assert!(relaxed(pattern).matches(None, Some(candidate)));
    }

    #[test]
    fn test_nested_relaxed() {
        let pattern = r#"{"user":{"name":"John","roles":["admin"]}}"#;
        let candidate = r#"{"user":{"name":"John","age":30,"roles":["dev","admin"]},"x":true}"#;
        assert!(relaxed(pattern).matches(None, Some(candidate)));
        assert!(!strict(pattern).matches(None, Some(candidate)));
    }

    #[test]
    fn test_numbers_compare_numerically() {
        assert!(strict(r#"{"a":1}"#).matches(None, Some(r#"{"a":1.0}"#)));
        assert!(!strict(r#"{"a":1}"#).matches(None, Some(r#"{"a":1.5}"#)));
    }

    #[test]
    fn test_placeholders() {
        let m = strict(r#"{"id":"${json-unit.any-number}","name":"${json-unit.any-string}","x":"${json-unit.ignore}"}"#);
        assert!(m.matches(None, Some(r#"{"id":7,"name":"n","x":[1]}"#)));
        assert!(!m.matches(None, Some(r#"{"id":"7","name":"n","x":null}"#)));
    }

    #[test]
    fn test_candidate_parse_failure() {
        let mut d = MatchDiagnostics::new(true);
        assert!(!relaxed(r#"{"a":1}"#).matches(Some(&mut d), Some("{not json")));
        assert!(d.differences(FieldName::Body)[0].starts_with("failed to parse body as json:"));
    }

    #[test]
    fn test_invalid_pattern_never_matches() {
        let m = relaxed("{broken");
        let mut d = MatchDiagnostics::new(true);
        assert!(!m.matches(Some(&mut d), Some(r#"{"a":1}"#)));
        assert!(d.differences(FieldName::Body)[0].starts_with("json pattern failed to parse:"));
        // exact text still short-circuits
        assert!(m.matches(None, Some("{broken")));
    }

    #[test]
    fn test_difference_classification() {
        let diffs = compare_json(
            &json!({"a": 1, "b": [1], "c": "x"}),
            &json!({"a": 2, "b": [1, 2], "d": true}),
            JsonMatchType::Strict,
        );
        assert_eq!(
            diffs,
            vec![
                JsonDifference {
                    kind: JsonDifferenceKind::Different,
                    path: "$.a".to_string(),
                    expected: Some("1".to_string()),
                    actual: Some("2".to_string()),
                },
                JsonDifference {
                    kind: JsonDifferenceKind::Extra,
                    path: "$.b[1]".to_string(),
                    expected: None,
                    actual: Some("2".to_string()),
                },
                JsonDifference {
                    kind: JsonDifferenceKind::Missing,
                    path: "$.c".to_string(),
                    expected: Some("\"x\"".to_string()),
                    actual: None,
                },
                JsonDifference {
                    kind: JsonDifferenceKind::Extra,
                    path: "$.d".to_string(),
                    expected: None,
                    actual: Some("true".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_detailed_report_is_stable() {
        let m = relaxed(r#"{"a":1}"#);
        let mut first = MatchDiagnostics::new(true);
        let mut second = MatchDiagnostics::new(true);
        assert!(!m.matches(Some(&mut first), Some(r#"{"a":2}"#)));
        assert!(!m.matches(Some(&mut second), Some(r#"{"a":2}"#)));
        assert_eq!(first.report(), second.report());
        assert!(first.differences(FieldName::Body)[0].contains("DIFFERENT at $.a expected: 1 found: 2"));
    }
}
