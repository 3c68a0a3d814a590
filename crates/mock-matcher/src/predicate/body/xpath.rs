//! XPath body matching: the expression must evaluate to true.
//!
//! Node-sets are true when non-empty, strings when non-empty, numbers when
//! non-zero (standard XPath `boolean()` conversion).

use super::precheck;
use crate::predicate::diagnostics::{diff, FieldName, MatchDiagnostics};
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use sxd_document::parser;
use sxd_xpath::{Context, Factory, XPath};
use tracing::warn;

/// Matches XML bodies against an XPath expression.
///
/// The expression is validated once on first use. Compiled `sxd_xpath`
/// expressions are not `Send`, so evaluation compiles a fresh copy; only the
/// validation outcome is cached.
#[derive(Debug)]
pub struct XPathMatcher {
    pattern: String,
    namespaces: BTreeMap<String, String>,
    validated: OnceCell<Result<(), String>>,
}

impl XPathMatcher {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self::with_namespaces(pattern, BTreeMap::new())
    }

    /// Matcher with prefix to namespace-URI bindings available to the expression.
    pub fn with_namespaces(pattern: impl Into<String>, namespaces: BTreeMap<String, String>) -> Self {
        Self {
            pattern: pattern.into(),
            namespaces,
            validated: OnceCell::new(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn namespaces(&self) -> &BTreeMap<String, String> {
        &self.namespaces
    }

    pub fn is_blank(&self) -> bool {
        self.pattern.trim().is_empty()
    }

    fn compile(&self) -> Result<XPath, String> {
        match Factory::new().build(self.pattern.trim()) {
            Ok(Some(xpath)) => Ok(xpath),
            Ok(None) => Err("expression is empty".to_string()),
            Err(e) => Err(e.to_string()),
        }
    }

    fn validation(&self) -> &Result<(), String> {
        self.validated.get_or_init(|| {
            self.compile().map(|_| ()).map_err(|e| {
                warn!("invalid XPath {:?}, it will never match: {}", self.pattern, e);
                e
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

        if let Err(e) = self.validation() {
            diff!(diagnostics, FieldName::Body, "xpath {} is invalid: {}", self.pattern, e);
            return false;
        }

        match self.evaluate(candidate) {
            Ok(true) => true,
            Ok(false) => {
                diff!(
                    diagnostics,
                    FieldName::Body,
                    "xpath match failed expected: {} found: {}",
                    self.pattern,
                    candidate
                );
                false
            }
            Err(e) => {
                diff!(
                    diagnostics,
                    FieldName::Body,
                    "xpath match failed expected: {} found: {} failed because: {}",
                    self.pattern,
                    candidate,
                    e
                );
                false
            }
        }
    }

    fn evaluate(&self, candidate: &str) -> Result<bool, String> {
        let package = parser::parse(candidate).map_err(|e| format!("invalid XML: {e:?}"))?;
        let document = package.as_document();

        let xpath = self.compile()?;
        let mut context = Context::new();
        for (prefix, uri) in &self.namespaces {
            context.set_namespace(prefix, uri);
        }

        let value = xpath
            .evaluate(&context, document.root())
            .map_err(|e| e.to_string())?;
        Ok(value.boolean())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOOKS: &str = r#"<bookstore><book category="cooking"><title>Everyday Italian</title><price>30.00</price></book><book category="web"><title>Learning XML</title><price>39.95</price></book></bookstore>"#;

    #[test]
    fn test_node_selection() {
        assert!(XPathMatcher::new("/bookstore/book[price>35]/title").matches(None, Some(BOOKS)));
        assert!(!XPathMatcher::new("/bookstore/book[price>50]").matches(None, Some(BOOKS)));
    }

    #[test]
    fn test_boolean_expressions() {
        assert!(XPathMatcher::new("count(//book) = 2").matches(None, Some(BOOKS)));
        assert!(!XPathMatcher::new("count(//book) = 3").matches(None, Some(BOOKS)));
        assert!(XPathMatcher::new("//book[@category='web']/title = 'Learning XML'").matches(None, Some(BOOKS)));
    }

    #[test]
    fn test_namespaces() {
        let body = r#"<a:root xmlns:a="urn:example:a"><a:item>1</a:item></a:root>"#;
        let mut namespaces = BTreeMap::new();
        namespaces.insert("x".to_string(), "urn:example:a".to_string());
        let m = XPathMatcher::with_namespaces("/x:root/x:item", namespaces);
        assert!(m.matches(None, Some(body)));
        assert!(!XPathMatcher::new("/root/item").matches(None, Some(body)));
    }

    #[test]
    fn test_malformed_candidate() {
        let m = XPathMatcher::new("/a");
        let mut d = MatchDiagnostics::new(true);
        assert!(!m.matches(Some(&mut d), Some("<a><b></a>")));
        assert!(d.differences(FieldName::Body)[0].contains("invalid XML"));
    }

    #[test]
    fn test_invalid_expression() {
        let m = XPathMatcher::new("/a[");
        let mut d = MatchDiagnostics::new(true);
        assert!(!m.matches(Some(&mut d), Some("<a/>")));
        assert!(d.differences(FieldName::Body)[0].starts_with("xpath /a[ is invalid:"));
    }
}
