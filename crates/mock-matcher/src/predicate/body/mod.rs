//! Body matching strategies.
//!
//! Every strategy shares one contract: `matches(diagnostics, candidate)` and
//! `is_blank()`. A blank pattern matches any body; otherwise a missing or blank
//! candidate never matches. Parse and evaluation failures are converted into a
//! `false` result plus a diagnostic, never an error.
//!
//! Compiled artifacts (parsed JSON trees, JSONPath queries, schemas, regexes)
//! are built once on first use and then shared read-only across threads.
//!
//! - `json` - structural JSON comparison (strict or only-matching-fields)
//! - `json_path` - JSONPath query must select something
//! - `xpath` - XPath expression must evaluate to true
//! - `xml_schema` - document must validate against an XSD
//! - `text` - exact or substring text
//! - `regex_body` - whole-body regular expression
//! - `binary` - exact bytes given as base64

mod binary;
mod json;
mod json_path;
mod regex_body;
mod text;
mod xml_schema;
mod xpath;

pub use binary::BinaryBodyMatcher;
pub use json::{compare_json, JsonBodyMatcher, JsonDifference, JsonDifferenceKind, JsonMatchType};
pub use json_path::JsonPathMatcher;
pub use regex_body::RegexBodyMatcher;
pub use text::TextBodyMatcher;
pub use xml_schema::{XmlSchema, XmlSchemaMatcher};
pub use xpath::XPathMatcher;

use super::diagnostics::{diff, FieldName, MatchDiagnostics};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body pattern as written in an expectation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BodyPattern {
    /// Structural JSON comparison
    Json {
        json: serde_json::Value,
        #[serde(default, rename = "matchType", skip_serializing_if = "Option::is_none")]
        match_type: Option<JsonMatchType>,
    },
    /// JSONPath query that must select at least one node
    JsonPath {
        #[serde(rename = "jsonPath")]
        json_path: String,
    },
    /// XPath expression that must evaluate to true
    Xpath {
        xpath: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        namespaces: BTreeMap<String, String>,
    },
    /// XML schema the body must validate against
    XmlSchema {
        #[serde(rename = "xmlSchema")]
        xml_schema: String,
    },
    /// Exact text, or substring when `subString` is set
    String {
        string: String,
        #[serde(default, rename = "subString")]
        sub_string: bool,
    },
    /// Regular expression matching the whole body
    Regex { regex: String },
    /// Exact bytes, base64 encoded
    Binary { base64: String },
}

/// Body pattern plus negation, as carried by a request definition.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BodyDefinition {
    #[serde(flatten)]
    pub pattern: BodyPattern,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub not: bool,
}

impl BodyDefinition {
    pub fn new(pattern: BodyPattern) -> Self {
        Self {
            pattern,
            not: false,
        }
    }

    pub fn negated(pattern: BodyPattern) -> Self {
        Self { pattern, not: true }
    }
}

impl From<BodyPattern> for BodyDefinition {
    fn from(pattern: BodyPattern) -> Self {
        Self::new(pattern)
    }
}

/// The interchangeable body strategies.
#[derive(Debug)]
pub enum BodyMatcherKind {
    Json(JsonBodyMatcher),
    JsonPath(JsonPathMatcher),
    XPath(XPathMatcher),
    XmlSchema(XmlSchemaMatcher),
    Text(TextBodyMatcher),
    Regex(RegexBodyMatcher),
    Binary(BinaryBodyMatcher),
}

/// A body matcher with optional negation.
#[derive(Debug)]
pub struct BodyMatcher {
    kind: BodyMatcherKind,
    not: bool,
}

impl BodyMatcher {
    /// Build a matcher from a definition.
    ///
    /// `default_json_match_type` applies to JSON patterns that do not name one.
    pub fn from_definition(definition: &BodyDefinition, default_json_match_type: JsonMatchType) -> Self {
        let kind = match &definition.pattern {
            BodyPattern::Json { json, match_type } => BodyMatcherKind::Json(JsonBodyMatcher::from_value(
                json,
                match_type.unwrap_or(default_json_match_type),
            )),
            BodyPattern::JsonPath { json_path } => {
                BodyMatcherKind::JsonPath(JsonPathMatcher::new(json_path))
            }
            BodyPattern::Xpath { xpath, namespaces } => {
                BodyMatcherKind::XPath(XPathMatcher::with_namespaces(xpath, namespaces.clone()))
            }
            BodyPattern::XmlSchema { xml_schema } => {
                BodyMatcherKind::XmlSchema(XmlSchemaMatcher::new(xml_schema))
            }
            BodyPattern::String { string, sub_string } => {
                BodyMatcherKind::Text(TextBodyMatcher::new(string, *sub_string))
            }
            BodyPattern::Regex { regex } => BodyMatcherKind::Regex(RegexBodyMatcher::new(regex)),
            BodyPattern::Binary { base64 } => BodyMatcherKind::Binary(BinaryBodyMatcher::new(base64)),
        };
        Self {
            kind,
            not: definition.not,
        }
    }

    pub fn new(kind: BodyMatcherKind) -> Self {
        Self { kind, not: false }
    }

    pub fn negate(mut self) -> Self {
        self.not = !self.not;
        self
    }

    pub fn kind(&self) -> &BodyMatcherKind {
        &self.kind
    }

    pub fn is_blank(&self) -> bool {
        match &self.kind {
            BodyMatcherKind::Json(m) => m.is_blank(),
            BodyMatcherKind::JsonPath(m) => m.is_blank(),
            BodyMatcherKind::XPath(m) => m.is_blank(),
            BodyMatcherKind::XmlSchema(m) => m.is_blank(),
            BodyMatcherKind::Text(m) => m.is_blank(),
            BodyMatcherKind::Regex(m) => m.is_blank(),
            BodyMatcherKind::Binary(m) => m.is_blank(),
        }
    }

    /// Match a textual body.
    pub fn matches(&self, mut diagnostics: Option<&mut MatchDiagnostics>, candidate: Option<&str>) -> bool {
        let result = match &self.kind {
            BodyMatcherKind::Json(m) => m.matches(diagnostics.as_deref_mut(), candidate),
            BodyMatcherKind::JsonPath(m) => m.matches(diagnostics.as_deref_mut(), candidate),
            BodyMatcherKind::XPath(m) => m.matches(diagnostics.as_deref_mut(), candidate),
            BodyMatcherKind::XmlSchema(m) => m.matches(diagnostics.as_deref_mut(), candidate),
            BodyMatcherKind::Text(m) => m.matches(diagnostics.as_deref_mut(), candidate),
            BodyMatcherKind::Regex(m) => m.matches(diagnostics.as_deref_mut(), candidate),
            BodyMatcherKind::Binary(m) => {
                m.matches_bytes(diagnostics.as_deref_mut(), candidate.map(str::as_bytes))
            }
        };
        self.apply_not(diagnostics, result)
    }

    /// Match a raw body. Textual strategies see the bytes decoded as UTF-8
    /// (lossily), binary patterns compare the bytes themselves.
    pub fn matches_bytes(&self, mut diagnostics: Option<&mut MatchDiagnostics>, candidate: Option<&[u8]>) -> bool {
        if let BodyMatcherKind::Binary(m) = &self.kind {
            let result = m.matches_bytes(diagnostics.as_deref_mut(), candidate);
            return self.apply_not(diagnostics, result);
        }
        let text = candidate.map(String::from_utf8_lossy);
        self.matches(diagnostics, text.as_deref())
    }

    fn apply_not(&self, mut diagnostics: Option<&mut MatchDiagnostics>, result: bool) -> bool {
        if !self.not {
            return result;
        }
        if result {
            diff!(diagnostics, FieldName::Body, "body matched but the body pattern is negated");
        }
        !result
    }
}

/// Shared guard for the blank-pattern and missing-candidate rules.
///
/// Returns `Some(result)` when the outcome is decided without parsing.
pub(crate) fn precheck(
    mut diagnostics: Option<&mut MatchDiagnostics>,
    pattern_blank: bool,
    candidate: Option<&str>,
) -> Option<bool> {
    if pattern_blank {
        return Some(true);
    }
    match candidate {
        Some(body) if !body.trim().is_empty() => None,
        _ => {
            diff!(diagnostics, FieldName::Body, "body is missing or blank");
            Some(false)
        }
    }
}
