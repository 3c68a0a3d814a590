//! Request path matching.
//!
//! A path pattern is either a plain value compared with the pattern comparator
//! (exact or full-string regex), or a template with `{name}` segments such as
//! `/users/{id}/orders/{orderId}`. Templates match any concrete value in each
//! parameter segment, and the values are exposed as path parameters so that
//! they can be constrained separately.

use super::comparator::PatternComparator;
use super::diagnostics::{diff, MatchDiagnostics};
use super::multimap::NottableMultiMap;
use super::nottable::NottableValue;
use matchit::Router;
use std::borrow::Cow;
use std::fmt;
use tracing::warn;

/// Matches the request path.
pub struct PathMatcher {
    pattern: NottableValue,
    template: Option<Router<()>>,
}

impl fmt::Debug for PathMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PathMatcher")
            .field("pattern", &self.pattern)
            .field("template", &self.template.is_some())
            .finish()
    }
}

impl PathMatcher {
    pub fn new(pattern: NottableValue) -> Self {
        let template = if is_template(pattern.value()) {
            let mut router = Router::new();
            match router.insert(pattern.value(), ()) {
                Ok(()) => Some(router),
                Err(e) => {
                    // Fall back to comparator semantics (regex or equality)
                    warn!("path template {:?} rejected: {}", pattern.value(), e);
                    None
                }
            }
        } else {
            None
        };
        Self { pattern, template }
    }

    pub fn pattern(&self) -> &NottableValue {
        &self.pattern
    }

    pub fn is_blank(&self) -> bool {
        self.pattern.is_blank()
    }

    pub fn is_template(&self) -> bool {
        self.template.is_some()
    }

    pub fn matches(
        &self,
        mut diagnostics: Option<&mut MatchDiagnostics>,
        comparator: &PatternComparator,
        path: &str,
    ) -> bool {
        if self.is_blank() {
            return true;
        }
        match &self.template {
            Some(router) => {
                let result = self.pattern.is_negated() ^ router.at(path).is_ok();
                if !result {
                    diff!(
                        diagnostics,
                        "path template match failed expected: {} found: {}",
                        self.pattern,
                        path
                    );
                }
                result
            }
            None => comparator.matches(diagnostics, &self.pattern, &NottableValue::new(path)),
        }
    }

    /// Parameters captured by the template from `path`, percent-decoded.
    ///
    /// Empty when the pattern is not a template or does not match.
    pub fn path_parameters(&self, path: &str) -> NottableMultiMap {
        let Some(router) = &self.template else {
            return NottableMultiMap::new();
        };
        match router.at(path) {
            Ok(matched) => NottableMultiMap::from_literal_pairs(
                matched
                    .params
                    .iter()
                    .map(|(name, value)| (name.to_string(), decode(value).into_owned())),
            ),
            Err(_) => NottableMultiMap::new(),
        }
    }
}

fn is_template(pattern: &str) -> bool {
    pattern.starts_with('/')
        && pattern.split('/').any(|segment| {
            segment.len() > 2
                && segment.starts_with('{')
                && segment.ends_with('}')
                && segment[1..segment.len() - 1]
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

fn decode(value: &str) -> Cow<'_, str> {
    urlencoding::decode(value).unwrap_or(Cow::Borrowed(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_and_regex_paths() {
        let c = PatternComparator::default();
        assert!(PathMatcher::new("/health".into()).matches(None, &c, "/health"));
        assert!(!PathMatcher::new("/health".into()).matches(None, &c, "/health/live"));
        assert!(PathMatcher::new("/users/\\d+".into()).matches(None, &c, "/users/42"));
        assert!(PathMatcher::new("!/health".into()).matches(None, &c, "/users"));
        assert!(PathMatcher::new("".into()).matches(None, &c, "/anything"));
    }

    #[test]
    fn test_template() {
        let c = PatternComparator::default();
        let m = PathMatcher::new("/users/{id}/orders/{orderId}".into());
        assert!(m.is_template());
        assert!(m.matches(None, &c, "/users/7/orders/abc"));
        assert!(!m.matches(None, &c, "/users/7/orders"));

        let params = m.path_parameters("/users/7/orders/a%20b");
        assert_eq!(params.first_value("id"), Some("7"));
        assert_eq!(params.first_value("orderId"), Some("a b"));
    }

    #[test]
    fn test_negated_template() {
        let c = PatternComparator::default();
        let m = PathMatcher::new("!/users/{id}".into());
        assert!(!m.matches(None, &c, "/users/7"));
        assert!(m.matches(None, &c, "/accounts/7"));
    }

    #[test]
    fn test_regex_quantifiers_are_not_templates() {
        let c = PatternComparator::default();
        let m = PathMatcher::new("/files/[a-z]{3}".into());
        assert!(!m.is_template());
        assert!(m.matches(None, &c, "/files/abc"));
        assert!(m.path_parameters("/files/abc").is_empty());
    }

    #[test]
    fn test_diagnostics() {
        let c = PatternComparator::default();
        let mut d = MatchDiagnostics::new(true);
        d.set_current_field(crate::predicate::diagnostics::FieldName::Path);
        assert!(!PathMatcher::new("/users/{id}".into()).matches(Some(&mut d), &c, "/items/1"));
        assert!(d.has_differences());
    }
}
