//! Per-attempt collector of mismatch explanations.
//!
//! One `MatchDiagnostics` is created for each (request, matcher) attempt and
//! dropped once the attempt has been reported. It is never shared between
//! threads.
//!
//! When detailed failures are disabled every `add_difference` call is a no-op
//! and the message arguments are never formatted, so the hot path does not
//! allocate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Request attribute a difference belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldName {
    Method,
    Path,
    PathParameters,
    QueryParameters,
    Cookies,
    Headers,
    Body,
    Secure,
    Protocol,
    KeepAlive,
    /// OpenAPI operation id, for expectations generated from a specification document
    Operation,
    /// OpenAPI document reference
    Openapi,
}

impl FieldName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::Method => "method",
            FieldName::Path => "path",
            FieldName::PathParameters => "path parameters",
            FieldName::QueryParameters => "query parameters",
            FieldName::Cookies => "cookies",
            FieldName::Headers => "headers",
            FieldName::Body => "body",
            FieldName::Secure => "secure",
            FieldName::Protocol => "protocol",
            FieldName::KeepAlive => "keep-alive",
            FieldName::Operation => "operation",
            FieldName::Openapi => "openapi",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-grouped mismatch explanations for one match attempt.
#[derive(Debug, Clone, Default)]
pub struct MatchDiagnostics {
    detailed: bool,
    subject: Option<String>,
    current_field: Option<FieldName>,
    /// Fields in the order their first difference was recorded
    differences: Vec<(FieldName, Vec<String>)>,
}

impl MatchDiagnostics {
    pub fn new(detailed: bool) -> Self {
        Self {
            detailed,
            ..Default::default()
        }
    }

    /// Diagnostics that record nothing.
    pub fn disabled() -> Self {
        Self::new(false)
    }

    /// Attach a short description of the request being matched.
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.detailed
    }

    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    /// Field that differences without an explicit field are filed under.
    pub fn set_current_field(&mut self, field: FieldName) {
        self.current_field = Some(field);
    }

    pub fn current_field(&self) -> Option<FieldName> {
        self.current_field
    }

    /// Record a difference for `field`, or for the current field when `None`.
    ///
    /// Differences with no resolvable field are dropped.
    pub fn add_difference(&mut self, field: Option<FieldName>, message: fmt::Arguments<'_>) {
        if !self.detailed {
            return;
        }
        let Some(field) = field.or(self.current_field) else {
            return;
        };
        let message = message.to_string();
        match self.differences.iter_mut().find(|(f, _)| *f == field) {
            Some((_, messages)) => messages.push(message),
            None => self.differences.push((field, vec![message])),
        }
    }

    /// Record a difference for the current field.
    pub fn difference(&mut self, message: fmt::Arguments<'_>) {
        self.add_difference(None, message);
    }

    pub fn differences(&self, field: FieldName) -> &[String] {
        self.differences
            .iter()
            .find(|(f, _)| *f == field)
            .map(|(_, messages)| messages.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_differences(&self) -> &[(FieldName, Vec<String>)] {
        &self.differences
    }

    pub fn has_differences(&self) -> bool {
        !self.differences.is_empty()
    }

    /// Human-readable report of every recorded difference, grouped by field.
    pub fn report(&self) -> String {
        let mut out = String::new();
        if let Some(subject) = &self.subject {
            out.push_str(&format!("request {subject} didn't match"));
        } else {
            out.push_str("request didn't match");
        }
        if self.differences.is_empty() {
            return out;
        }
        out.push_str(" because:");
        for (field, messages) in &self.differences {
            out.push_str(&format!("\n  {field} didn't match:"));
            for message in messages {
                for line in message.lines() {
                    out.push_str("\n    ");
                    out.push_str(line);
                }
            }
        }
        out
    }
}

/// Record a difference through an optional diagnostics handle.
///
/// ```ignore
/// diff!(diagnostics, "expected {} found {}", expected, actual);
/// diff!(diagnostics, FieldName::Body, "failed to parse: {}", err);
/// ```
macro_rules! diff {
    ($diagnostics:expr, $field:path, $($arg:tt)+) => {
        if let Some(d) = $diagnostics.as_deref_mut() {
            d.add_difference(Some($field), format_args!($($arg)+));
        }
    };
    ($diagnostics:expr, $($arg:tt)+) => {
        if let Some(d) = $diagnostics.as_deref_mut() {
            d.difference(format_args!($($arg)+));
        }
    };
}

pub(crate) use diff;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_records_nothing() {
        let mut d = MatchDiagnostics::disabled();
        d.set_current_field(FieldName::Path);
        d.add_difference(Some(FieldName::Method), format_args!("x"));
        d.difference(format_args!("y"));
        assert!(!d.has_differences());
        assert!(d.differences(FieldName::Method).is_empty());
    }

    #[test]
    fn test_groups_by_field_in_evaluation_order() {
        let mut d = MatchDiagnostics::new(true);
        d.add_difference(Some(FieldName::Path), format_args!("p1"));
        d.add_difference(Some(FieldName::Method), format_args!("m1"));
        d.add_difference(Some(FieldName::Path), format_args!("p2"));

        let fields: Vec<_> = d.all_differences().iter().map(|(f, _)| *f).collect();
        assert_eq!(fields, vec![FieldName::Path, FieldName::Method]);
        assert_eq!(d.differences(FieldName::Path), ["p1", "p2"]);
    }

    #[test]
    fn test_current_field_used_when_unspecified() {
        let mut d = MatchDiagnostics::new(true);
        d.difference(format_args!("dropped"));
        assert!(!d.has_differences());

        d.set_current_field(FieldName::Headers);
        d.difference(format_args!("missing {}", "x-api-key"));
        assert_eq!(d.differences(FieldName::Headers), ["missing x-api-key"]);
    }

    #[test]
    fn test_diff_macro_with_optional_handle() {
        let mut d = MatchDiagnostics::new(true);
        let mut handle = Some(&mut d);
        diff!(handle, FieldName::Body, "bad {}", 1);
        let mut none: Option<&mut MatchDiagnostics> = None;
        diff!(none, FieldName::Body, "never {}", 2);
        assert_eq!(d.differences(FieldName::Body), ["bad 1"]);
    }

    #[test]
    fn test_report() {
        let mut d = MatchDiagnostics::new(true).with_subject("GET /users");
        d.add_difference(Some(FieldName::Method), format_args!("expected POST found GET"));
        let report = d.report();
        assert!(report.starts_with("request GET /users didn't match because:"));
        assert!(report.contains("method didn't match:"));
        assert!(report.contains("expected POST found GET"));
    }
}
