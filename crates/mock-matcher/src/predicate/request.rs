//! Request definitions, candidate requests and the per-expectation matcher.
//!
//! A [`RequestDefinition`] is the pattern side as written in an expectation;
//! [`HttpRequest`] is the concrete request being matched; [`RequestMatcher`]
//! compiles a definition into field matchers and evaluates them.

use super::body::{BodyDefinition, BodyMatcher, JsonMatchType};
use super::comparator::PatternComparator;
use super::diagnostics::{diff, FieldName, MatchDiagnostics};
use super::entry::PatternEntry;
use super::multimap::{MultiMapMatcher, NottableMultiMap, OneOrMany};
use super::nottable::NottableValue;
use super::path::PathMatcher;
use crate::expectation::Expectation;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use hyper::http::request::Parts;
use hyper::http::{header, Version};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// HTTP protocol of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Protocol {
    #[serde(rename = "HTTP_1_1")]
    Http1_1,
    #[serde(rename = "HTTP_2")]
    Http2,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Http1_1 => "HTTP_1_1",
            Protocol::Http2 => "HTTP_2",
        })
    }
}

/// Pattern side of an expectation: which requests it applies to.
///
/// Every attribute is optional; an absent attribute matches anything.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<NottableValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<NottableValue>,

    /// Constraints on values captured by `{name}` segments of `path`
    #[serde(default, skip_serializing_if = "NottableMultiMap::is_empty")]
    pub path_parameters: NottableMultiMap,

    #[serde(default, skip_serializing_if = "NottableMultiMap::is_empty")]
    pub query_string_parameters: NottableMultiMap,

    #[serde(default, skip_serializing_if = "NottableMultiMap::is_empty")]
    pub cookies: NottableMultiMap,

    #[serde(default, skip_serializing_if = "NottableMultiMap::is_empty")]
    pub headers: NottableMultiMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<BodyDefinition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_alive: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

impl RequestDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(NottableValue::parse(method));
        self
    }

    pub fn with_path(mut self, path: &str) -> Self {
        self.path = Some(NottableValue::parse(path));
        self
    }

    pub fn with_path_parameter(mut self, name: &str, value: &str) -> Self {
        self.path_parameters.push(PatternEntry::new(name, value));
        self
    }

    pub fn with_query_parameter(mut self, name: &str, value: &str) -> Self {
        self.query_string_parameters.push(PatternEntry::new(name, value));
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push(PatternEntry::new(name, value));
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(PatternEntry::new(name, value));
        self
    }

    pub fn with_body(mut self, body: impl Into<BodyDefinition>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }
}

/// A concrete request presented for matching.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(try_from = "RawHttpRequest")]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query_parameters: NottableMultiMap,
    pub headers: NottableMultiMap,
    pub cookies: NottableMultiMap,
    pub body: Option<Bytes>,
    pub secure: Option<bool>,
    pub keep_alive: Option<bool>,
    pub protocol: Option<Protocol>,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Build a candidate from request head parts and the collected body.
    ///
    /// Query parameters are URL-decoded and may repeat; cookies come from
    /// every `Cookie` header.
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let mut headers = NottableMultiMap::new();
        for (name, value) in &parts.headers {
            headers.push(PatternEntry::literal(
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes()),
            ));
        }

        let mut cookies = NottableMultiMap::new();
        for value in parts.headers.get_all(header::COOKIE) {
            if let Ok(value) = value.to_str() {
                for (name, value) in parse_cookies(value) {
                    cookies.push(PatternEntry::literal(name, value));
                }
            }
        }

        let keep_alive = match parts.headers.get(header::CONNECTION).and_then(|v| v.to_str().ok()) {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => parts.version != Version::HTTP_10,
        };

        Self {
            method: parts.method.as_str().to_string(),
            path: parts.uri.path().to_string(),
            query_parameters: NottableMultiMap::from_literal_pairs(
                parts.uri.query().map(parse_query).unwrap_or_default(),
            ),
            headers,
            cookies,
            body: (!body.is_empty()).then_some(body),
            secure: parts.uri.scheme_str().map(|scheme| scheme == "https"),
            keep_alive: Some(keep_alive),
            protocol: Some(if parts.version == Version::HTTP_2 {
                Protocol::Http2
            } else {
                Protocol::Http1_1
            }),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push(PatternEntry::literal(name, value));
        self
    }

    pub fn with_query_parameter(mut self, name: &str, value: &str) -> Self {
        self.query_parameters.push(PatternEntry::literal(name, value));
        self
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.push(PatternEntry::literal(name, value));
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = Some(secure);
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = Some(keep_alive);
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Body decoded as UTF-8, lossily.
    pub fn body_text(&self) -> Option<Cow<'_, str>> {
        self.body.as_deref().map(String::from_utf8_lossy)
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// File form of a candidate request.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawHttpRequest {
    #[serde(default = "default_method")]
    method: String,
    #[serde(default = "default_path")]
    path: String,
    #[serde(default)]
    query_string_parameters: BTreeMap<String, OneOrMany>,
    #[serde(default)]
    headers: BTreeMap<String, OneOrMany>,
    #[serde(default)]
    cookies: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<String>,
    /// Binary body, base64 encoded; takes precedence over `body`
    #[serde(default)]
    body_base64: Option<String>,
    #[serde(default)]
    secure: Option<bool>,
    #[serde(default)]
    keep_alive: Option<bool>,
    #[serde(default)]
    protocol: Option<Protocol>,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_path() -> String {
    "/".to_string()
}

fn literal_map(map: BTreeMap<String, OneOrMany>) -> NottableMultiMap {
    NottableMultiMap::from_literal_pairs(map.into_iter().flat_map(|(key, values)| {
        let values = match values {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        };
        values.into_iter().map(move |value| (key.clone(), value))
    }))
}

impl TryFrom<RawHttpRequest> for HttpRequest {
    type Error = String;

    fn try_from(raw: RawHttpRequest) -> Result<Self, Self::Error> {
        let body = match (raw.body_base64, raw.body) {
            (Some(encoded), _) => Some(Bytes::from(
                STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| format!("invalid bodyBase64: {e}"))?,
            )),
            (None, Some(text)) => Some(Bytes::from(text)),
            (None, None) => None,
        };
        Ok(Self {
            method: raw.method,
            path: raw.path,
            query_parameters: literal_map(raw.query_string_parameters),
            headers: literal_map(raw.headers),
            cookies: NottableMultiMap::from_literal_pairs(raw.cookies),
            body,
            secure: raw.secure,
            keep_alive: raw.keep_alive,
            protocol: raw.protocol,
        })
    }
}

fn decode_component(value: &str) -> String {
    let spaced = value.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Parse a raw query string into decoded (name, value) pairs, keeping repeats.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(name), decode_component(value))
        })
        .collect()
}

/// Parse a `Cookie` header value into (name, value) pairs.
pub fn parse_cookies(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let (name, value) = part.split_once('=').unwrap_or((part, ""));
            Some((name.trim().to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

/// Where a matcher's expectation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatcherSource {
    #[default]
    Api,
    AutomatedInitialization,
    Recorded,
    Openapi,
}

/// Field evaluation order; diagnostics are grouped in this order.
const FIELD_ORDER: [FieldName; 10] = [
    FieldName::Method,
    FieldName::Path,
    FieldName::PathParameters,
    FieldName::QueryParameters,
    FieldName::Cookies,
    FieldName::Headers,
    FieldName::Body,
    FieldName::Secure,
    FieldName::Protocol,
    FieldName::KeepAlive,
];

/// Compiled field matchers for one definition. Replaced as a whole on update.
#[derive(Debug)]
struct FieldMatchers {
    method: Option<NottableValue>,
    path: Option<PathMatcher>,
    path_parameters: MultiMapMatcher,
    query_parameters: MultiMapMatcher,
    cookies: MultiMapMatcher,
    headers: MultiMapMatcher,
    body: Option<BodyMatcher>,
    secure: Option<bool>,
    protocol: Option<Protocol>,
    keep_alive: Option<bool>,
}

impl FieldMatchers {
    fn compile(definition: &RequestDefinition, default_json_match_type: JsonMatchType) -> Self {
        Self {
            method: definition.method.clone().filter(|m| !m.is_blank()),
            path: definition
                .path
                .clone()
                .filter(|p| !p.is_blank())
                .map(PathMatcher::new),
            path_parameters: MultiMapMatcher::new(definition.path_parameters.clone()),
            query_parameters: MultiMapMatcher::new(definition.query_string_parameters.clone()),
            cookies: MultiMapMatcher::new(definition.cookies.clone()),
            headers: MultiMapMatcher::case_insensitive(definition.headers.clone()),
            body: definition
                .body
                .as_ref()
                .map(|body| BodyMatcher::from_definition(body, default_json_match_type)),
            secure: definition.secure,
            protocol: definition.protocol,
            keep_alive: definition.keep_alive,
        }
    }

    fn field_matches(
        &self,
        field: FieldName,
        mut diagnostics: Option<&mut MatchDiagnostics>,
        comparator: &PatternComparator,
        request: &HttpRequest,
    ) -> bool {
        match field {
            FieldName::Method => self.method.as_ref().map_or(true, |method| {
                comparator.matches(diagnostics, method, &NottableValue::new(request.method.as_str()))
            }),
            FieldName::Path => self
                .path
                .as_ref()
                .map_or(true, |path| path.matches(diagnostics, comparator, &request.path)),
            FieldName::PathParameters => {
                if self.path_parameters.is_blank() {
                    return true;
                }
                let captured = self
                    .path
                    .as_ref()
                    .map(|path| path.path_parameters(&request.path))
                    .unwrap_or_default();
                self.path_parameters.matches(diagnostics, comparator, &captured)
            }
            FieldName::QueryParameters => {
                self.query_parameters
                    .matches(diagnostics, comparator, &request.query_parameters)
            }
            FieldName::Cookies => self.cookies.matches(diagnostics, comparator, &request.cookies),
            FieldName::Headers => self.headers.matches(diagnostics, comparator, &request.headers),
            FieldName::Body => self
                .body
                .as_ref()
                .map_or(true, |body| body.matches_bytes(diagnostics, request.body.as_deref())),
            FieldName::Secure => expect_flag(
                diagnostics.as_deref_mut(),
                self.secure,
                request.secure.unwrap_or(false),
            ),
            FieldName::KeepAlive => expect_flag(
                diagnostics.as_deref_mut(),
                self.keep_alive,
                request.keep_alive.unwrap_or(true),
            ),
            FieldName::Protocol => match self.protocol {
                None => true,
                Some(expected) => {
                    let actual = request.protocol.unwrap_or(Protocol::Http1_1);
                    if expected != actual {
                        diff!(diagnostics, "expected: {} found: {}", expected, actual);
                    }
                    expected == actual
                }
            },
            // OpenAPI-only fields carry no request attribute
            FieldName::Operation | FieldName::Openapi => true,
        }
    }
}

fn expect_flag(mut diagnostics: Option<&mut MatchDiagnostics>, expected: Option<bool>, actual: bool) -> bool {
    match expected {
        Some(expected) if expected != actual => {
            diff!(diagnostics, "expected: {} found: {}", expected, actual);
            false
        }
        _ => true,
    }
}

/// An expectation together with the field matchers compiled from it.
#[derive(Debug)]
struct Compiled {
    expectation: Arc<Expectation>,
    fields: Arc<FieldMatchers>,
}

/// Matcher for one registered expectation.
///
/// The expectation and its field matchers sit behind one `Arc` that is
/// swapped as a whole on update, so a match running concurrently with an
/// update sees either the old or the new expectation, never a mix.
#[derive(Debug)]
pub struct RequestMatcher {
    id: String,
    comparator: PatternComparator,
    default_json_match_type: JsonMatchType,
    compiled: RwLock<Arc<Compiled>>,
    source: MatcherSource,
    active: AtomicBool,
    response_in_progress: AtomicBool,
}

impl RequestMatcher {
    pub fn new(
        expectation: Arc<Expectation>,
        comparator: PatternComparator,
        default_json_match_type: JsonMatchType,
    ) -> Self {
        Self::with_source(expectation, comparator, default_json_match_type, MatcherSource::Api)
    }

    pub fn with_source(
        expectation: Arc<Expectation>,
        comparator: PatternComparator,
        default_json_match_type: JsonMatchType,
        source: MatcherSource,
    ) -> Self {
        let fields = FieldMatchers::compile(&expectation.http_request, default_json_match_type);
        Self {
            id: expectation.id.clone(),
            comparator,
            default_json_match_type,
            compiled: RwLock::new(Arc::new(Compiled {
                expectation,
                fields: Arc::new(fields),
            })),
            source,
            active: AtomicBool::new(true),
            response_in_progress: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> MatcherSource {
        self.source
    }

    /// The expectation this matcher currently belongs to.
    pub fn expectation(&self) -> Arc<Expectation> {
        self.compiled.read().expectation.clone()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub fn is_response_in_progress(&self) -> bool {
        self.response_in_progress.load(Ordering::Acquire)
    }

    pub fn set_response_in_progress(&self, in_progress: bool) {
        self.response_in_progress.store(in_progress, Ordering::Release);
    }

    /// Replace the expectation, recompiling field matchers if its request
    /// definition changed. Returns whether anything changed.
    pub fn update(&self, expectation: Arc<Expectation>) -> bool {
        let mut current = self.compiled.write();
        if *current.expectation == *expectation {
            return false;
        }
        let fields = if current.expectation.http_request == expectation.http_request {
            current.fields.clone()
        } else {
            Arc::new(FieldMatchers::compile(
                &expectation.http_request,
                self.default_json_match_type,
            ))
        };
        *current = Arc::new(Compiled { expectation, fields });
        true
    }

    /// Whether `request` satisfies every configured field matcher.
    ///
    /// With detailed diagnostics every field is evaluated so that all
    /// differences are reported; otherwise evaluation stops at the first
    /// failing field.
    pub fn matches(&self, diagnostics: Option<&mut MatchDiagnostics>, request: &HttpRequest) -> bool {
        let compiled = self.compiled.read().clone();
        self.fields_match(&compiled.fields, diagnostics, request)
    }

    /// The expectation `request` matched, taken from the same snapshot the
    /// fields were evaluated against.
    pub fn matched_expectation(
        &self,
        diagnostics: Option<&mut MatchDiagnostics>,
        request: &HttpRequest,
    ) -> Option<Arc<Expectation>> {
        let compiled = self.compiled.read().clone();
        self.fields_match(&compiled.fields, diagnostics, request)
            .then(|| compiled.expectation.clone())
    }

    fn fields_match(
        &self,
        fields: &FieldMatchers,
        mut diagnostics: Option<&mut MatchDiagnostics>,
        request: &HttpRequest,
    ) -> bool {
        let detailed = diagnostics.as_deref().is_some_and(MatchDiagnostics::is_enabled);

        let mut result = true;
        for field in FIELD_ORDER {
            if let Some(d) = diagnostics.as_deref_mut() {
                d.set_current_field(field);
            }
            if !fields.field_matches(field, diagnostics.as_deref_mut(), &self.comparator, request) {
                result = false;
                if !detailed {
                    break;
                }
            }
        }
        result
    }
}
