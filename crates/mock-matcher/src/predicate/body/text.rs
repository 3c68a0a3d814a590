//! Plain text body matching.

use super::precheck;
use crate::predicate::diagnostics::{diff, FieldName, MatchDiagnostics};
use similar::TextDiff;

/// Exact or substring text match.
#[derive(Debug, Clone)]
pub struct TextBodyMatcher {
    pattern: String,
    sub_string: bool,
}

impl TextBodyMatcher {
    pub fn new(pattern: impl Into<String>, sub_string: bool) -> Self {
        Self {
            pattern: pattern.into(),
            sub_string,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.pattern.trim().is_empty()
    }

    pub fn matches(&self, mut diagnostics: Option<&mut MatchDiagnostics>, candidate: Option<&str>) -> bool {
        if let Some(result) = precheck(diagnostics.as_deref_mut(), self.is_blank(), candidate) {
            return result;
        }
        let Some(candidate) = candidate else {
            return false;
        };

        if self.sub_string {
            let found = candidate.contains(&self.pattern);
            if !found {
                diff!(
                    diagnostics,
                    FieldName::Body,
                    "substring match failed expected: {} found: {}",
                    self.pattern,
                    candidate
                );
            }
            return found;
        }

        if candidate == self.pattern {
            return true;
        }
        if diagnostics.as_deref().is_some_and(MatchDiagnostics::is_enabled) {
            let unified = TextDiff::from_lines(self.pattern.as_str(), candidate)
                .unified_diff()
                .header("expected", "found")
                .to_string();
            diff!(diagnostics, FieldName::Body, "exact string match failed:\n{}", unified);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact() {
        let m = TextBodyMatcher::new("hello world", false);
        assert!(m.matches(None, Some("hello world")));
        assert!(!m.matches(None, Some("hello world!")));
        assert!(!m.matches(None, Some("HELLO WORLD")));
    }

    #[test]
    fn test_sub_string() {
        let m = TextBodyMatcher::new("api", true);
        assert!(m.matches(None, Some("this is an api call")));
        assert!(!m.matches(None, Some("this is an API call")));
    }

    #[test]
    fn test_diff_in_diagnostics() {
        let m = TextBodyMatcher::new("line one\nline two\n", false);
        let mut d = MatchDiagnostics::new(true);
        assert!(!m.matches(Some(&mut d), Some("line one\nline 2\n")));
        let message = &d.differences(FieldName::Body)[0];
        assert!(message.contains("--- expected"));
        assert!(message.contains("-line two"));
        assert!(message.contains("+line 2"));
    }
}
