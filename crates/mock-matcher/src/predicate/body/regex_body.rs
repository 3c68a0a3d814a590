//! Whole-body regular expression matching.

use super::precheck;
use crate::predicate::diagnostics::{diff, FieldName, MatchDiagnostics};
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::warn;

/// The body must match the expression in full; `.` also matches newlines.
#[derive(Debug)]
pub struct RegexBodyMatcher {
    pattern: String,
    compiled: OnceCell<Result<Regex, String>>,
}

impl RegexBodyMatcher {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            compiled: OnceCell::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.pattern.trim().is_empty()
    }

    fn regex(&self) -> &Result<Regex, String> {
        self.compiled.get_or_init(|| {
            Regex::new(&format!("(?s)^(?:{})$", self.pattern)).map_err(|e| {
                warn!("invalid body regex {:?}, it will never match: {}", self.pattern, e);
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

        match self.regex() {
            Ok(regex) if regex.is_match(candidate) => true,
            Ok(_) => {
                diff!(
                    diagnostics,
                    FieldName::Body,
                    "regex match failed expected: {} found: {}",
                    self.pattern,
                    candidate
                );
                false
            }
            Err(e) => {
                diff!(diagnostics, FieldName::Body, "body regex {} is invalid: {}", self.pattern, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_match() {
        let m = RegexBodyMatcher::new(r"\d{3}-\d{4}");
        assert!(m.matches(None, Some("123-4567")));
        assert!(!m.matches(None, Some("Call me at 123-4567")));
    }

    #[test]
    fn test_dot_matches_newline() {
        let m = RegexBodyMatcher::new("start.*end");
        assert!(m.matches(None, Some("start\nmiddle\nend")));
    }

    #[test]
    fn test_invalid_regex() {
        let m = RegexBodyMatcher::new("([a-z");
        let mut d = MatchDiagnostics::new(true);
        assert!(!m.matches(Some(&mut d), Some("abc")));
        assert!(d.differences(FieldName::Body)[0].starts_with("body regex ([a-z is invalid:"));
        // literal text still matches
        assert!(m.matches(None, Some("([a-z")));
    }
}
