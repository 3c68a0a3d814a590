//! Pattern comparator for nottable values.
//!
//! A pattern value matches a candidate value when:
//! - the pattern is blank, or
//! - the two strings are equal, or
//! - the pattern, read as a full-string regex, matches the candidate, or
//! - in control-plane mode only, the candidate read as a regex matches the pattern.
//!
//! Negation is applied on top of that structural result. When exactly one side
//! is negated the result is inverted. When both sides are negated the values are
//! compared structurally without inversion, so `!x` recognises another `!x`.

use super::diagnostics::{diff, MatchDiagnostics};
use super::nottable::NottableValue;
use super::regex_cache::RegexCache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which side of the server a comparison is performed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchMode {
    /// Incoming traffic: only the pattern is interpreted as a regex
    #[default]
    DataPlane,
    /// Expectation management (e.g. clearing by pattern): both sides may be regexes
    ControlPlane,
}

/// Compares pattern values against candidate values.
///
/// Cheap to clone; clones share the regex cache.
#[derive(Debug, Clone)]
pub struct PatternComparator {
    mode: MatchMode,
    regex_cache: Arc<RegexCache>,
}

impl PatternComparator {
    pub fn new(mode: MatchMode, regex_cache: Arc<RegexCache>) -> Self {
        Self { mode, regex_cache }
    }

    pub fn data_plane(regex_cache: Arc<RegexCache>) -> Self {
        Self::new(MatchMode::DataPlane, regex_cache)
    }

    pub fn control_plane(regex_cache: Arc<RegexCache>) -> Self {
        Self::new(MatchMode::ControlPlane, regex_cache)
    }

    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    pub fn regex_cache(&self) -> &Arc<RegexCache> {
        &self.regex_cache
    }

    /// Compare `pattern` with `candidate`, honouring negation on both sides.
    ///
    /// A false result is explained through `diagnostics` when present.
    pub fn matches(
        &self,
        mut diagnostics: Option<&mut MatchDiagnostics>,
        pattern: &NottableValue,
        candidate: &NottableValue,
    ) -> bool {
        let result = self.matches_quietly(pattern, candidate);
        if !result {
            diff!(
                diagnostics,
                "string or regex match failed expected: {} found: {}",
                pattern,
                candidate
            );
        }
        result
    }

    /// Same as [`matches`](Self::matches) without recording a difference.
    ///
    /// Used where a failed comparison is an expected part of a search, such as
    /// scanning candidate entries for a key.
    pub fn matches_quietly(&self, pattern: &NottableValue, candidate: &NottableValue) -> bool {
        let structural = self.matches_values(pattern.value(), candidate.value());
        if pattern.is_negated() && candidate.is_negated() {
            structural
        } else {
            (pattern.is_negated() || candidate.is_negated()) ^ structural
        }
    }

    /// Un-negated structural comparison of two raw strings.
    pub fn matches_values(&self, pattern: &str, candidate: &str) -> bool {
        if pattern.trim().is_empty() || pattern == candidate {
            return true;
        }
        if self.regex_cache.is_full_match(pattern, candidate) {
            return true;
        }
        self.mode == MatchMode::ControlPlane && self.regex_cache.is_full_match(candidate, pattern)
    }
}

impl Default for PatternComparator {
    fn default() -> Self {
        Self::data_plane(Arc::new(RegexCache::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::diagnostics::FieldName;

    fn data_plane() -> PatternComparator {
        PatternComparator::default()
    }

    #[test]
    fn test_exact_and_regex() {
        let c = data_plane();
        assert!(c.matches_values("GET", "GET"));
        assert!(!c.matches_values("GET", "POST"));
        assert!(c.matches_values("/users/\\d+", "/users/42"));
        assert!(!c.matches_values("/users/\\d+", "/users/abc"));
    }

    #[test]
    fn test_blank_pattern_matches_anything() {
        let c = data_plane();
        assert!(c.matches_values("", "anything"));
        assert!(c.matches_values("  ", ""));
    }

    #[test]
    fn test_invalid_regex_falls_back_to_equality() {
        let c = data_plane();
        assert!(c.matches_values("([", "(["));
        assert!(!c.matches_values("([", "x"));
    }

    #[test]
    fn test_negated_pattern() {
        let c = data_plane();
        let pattern = NottableValue::not("x");
        assert!(!c.matches(None, &pattern, &NottableValue::new("x")));
        assert!(c.matches(None, &pattern, &NottableValue::new("y")));
    }

    #[test]
    fn test_both_negated_compare_structurally() {
        let c = data_plane();
        let pattern = NottableValue::not("x");
        assert!(c.matches(None, &pattern, &NottableValue::not("x")));
        assert!(!c.matches(None, &pattern, &NottableValue::not("y")));
    }

    #[test]
    fn test_negated_candidate_inverts() {
        let c = data_plane();
        assert!(!c.matches(None, &NottableValue::new("x"), &NottableValue::not("x")));
        assert!(c.matches(None, &NottableValue::new("x"), &NottableValue::not("y")));
    }

    #[test]
    fn test_control_plane_reverse_regex() {
        let cache = Arc::new(RegexCache::default());
        let data = PatternComparator::data_plane(cache.clone());
        let control = PatternComparator::control_plane(cache);

        // candidate is the regex here
        assert!(!data.matches_values("/users/42", "/users/\\d+"));
        assert!(control.matches_values("/users/42", "/users/\\d+"));
    }

    #[test]
    fn test_records_difference_on_failure() {
        let c = data_plane();
        let mut d = MatchDiagnostics::new(true);
        d.set_current_field(FieldName::Method);
        assert!(!c.matches(
            Some(&mut d),
            &NottableValue::new("POST"),
            &NottableValue::new("GET")
        ));
        assert_eq!(
            d.differences(FieldName::Method),
            ["string or regex match failed expected: POST found: GET"]
        );

        // Successful comparisons record nothing
        let mut d = MatchDiagnostics::new(true);
        d.set_current_field(FieldName::Method);
        assert!(c.matches(
            Some(&mut d),
            &NottableValue::new("GET"),
            &NottableValue::new("GET")
        ));
        assert!(!d.has_differences());
    }
}
