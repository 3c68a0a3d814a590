//! JSONPath body matching: the query must select at least one node.

use super::precheck;
use crate::predicate::diagnostics::{diff, FieldName, MatchDiagnostics};
use once_cell::sync::OnceCell;
use serde_json::Value;
use serde_json_path::JsonPath;
use tracing::warn;

/// Matches bodies for which a JSONPath query selects something.
#[derive(Debug)]
pub struct JsonPathMatcher {
    pattern: String,
    compiled: OnceCell<Result<JsonPath, String>>,
}

impl JsonPathMatcher {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            compiled: OnceCell::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_blank(&self) -> bool {
        self.pattern.trim().is_empty()
    }

    fn query(&self) -> &Result<JsonPath, String> {
        self.compiled.get_or_init(|| {
            JsonPath::parse(self.pattern.trim()).map_err(|e| {
                warn!("invalid JSONPath {:?}, it will never match: {}", self.pattern, e);
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

        let query = match self.query() {
            Ok(query) => query,
            Err(e) => {
                diff!(
                    diagnostics,
                    FieldName::Body,
                    "json path {} is invalid: {}",
                    self.pattern,
                    e
                );
                return false;
            }
        };
        let document: Value = match serde_json::from_str(candidate) {
            Ok(document) => document,
            Err(e) => {
                diff!(
                    diagnostics,
                    FieldName::Body,
                    "json path match failed expected: {} found: {} failed because: {}",
                    self.pattern,
                    candidate,
                    e
                );
                return false;
            }
        };

        let selected = !query.query(&document).is_empty();
        if !selected {
            diff!(
                diagnostics,
                FieldName::Body,
                "json path {} selected nothing in {}",
                self.pattern,
                candidate
            );
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selects_nodes() {
        let m = JsonPathMatcher::new("$.store.book[?@.price < 10]");
        assert!(m.matches(
            None,
            Some(r#"{"store":{"book":[{"price":8.95},{"price":22.99}]}}"#)
        ));
        assert!(!m.matches(None, Some(r#"{"store":{"book":[{"price":22.99}]}}"#)));
    }

    #[test]
    fn test_missing_member() {
        let m = JsonPathMatcher::new("$.name");
        assert!(m.matches(None, Some(r#"{"name":"x"}"#)));
        assert!(!m.matches(None, Some(r#"{"other":"x"}"#)));
    }

    #[test]
    fn test_string_equality_short_circuit() {
        let m = JsonPathMatcher::new("$.name");
        assert!(m.matches(None, Some("$.name")));
    }

    #[test]
    fn test_invalid_query_is_diagnosed_each_time() {
        let m = JsonPathMatcher::new("$[?");
        for _ in 0..2 {
            let mut d = MatchDiagnostics::new(true);
            assert!(!m.matches(Some(&mut d), Some(r#"{"a":1}"#)));
            assert_eq!(d.differences(FieldName::Body).len(), 1);
            assert!(d.differences(FieldName::Body)[0].starts_with("json path $[? is invalid:"));
        }
    }

    #[test]
    fn test_malformed_candidate() {
        let m = JsonPathMatcher::new("$.a");
        let mut d = MatchDiagnostics::new(true);
        assert!(!m.matches(Some(&mut d), Some("<xml/>")));
        assert!(d.differences(FieldName::Body)[0].contains("failed because:"));
    }
}
