//! Nottable values: strings annotated with negation and optionality.
//!
//! The textual form mirrors how expectations are written by hand:
//! - `!value` - negated ("anything but value")
//! - `?value` - optional (absence is not a failure)
//! - `?!value` / `!?value` - both flags
//!
//! Serde reads and writes that textual form, so a header pattern can be
//! declared as `{"name": "!X-Debug"}` in JSON or YAML.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const NOT_PREFIX: char = '!';
const OPTIONAL_PREFIX: char = '?';

/// A string value with orthogonal negation and optional flags.
///
/// Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NottableValue {
    value: String,
    negated: bool,
    optional: bool,
}

impl NottableValue {
    /// A plain value: neither negated nor optional.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            negated: false,
            optional: false,
        }
    }

    /// A negated value, matching anything except `value`.
    pub fn not(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            negated: true,
            optional: false,
        }
    }

    /// An optional value whose absence is not a failure.
    pub fn optional(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            negated: false,
            optional: true,
        }
    }

    /// A value with explicit flags.
    pub fn with_flags(value: impl Into<String>, negated: bool, optional: bool) -> Self {
        Self {
            value: value.into(),
            negated,
            optional,
        }
    }

    /// Parse the `!`/`?` prefixed textual form.
    pub fn parse(text: &str) -> Self {
        let mut rest = text;
        let mut negated = false;
        let mut optional = false;
        // At most one of each prefix, in either order
        for _ in 0..2 {
            if !negated && rest.starts_with(NOT_PREFIX) {
                negated = true;
                rest = &rest[1..];
            } else if !optional && rest.starts_with(OPTIONAL_PREFIX) {
                optional = true;
                rest = &rest[1..];
            }
        }
        Self::with_flags(rest, negated, optional)
    }

    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[inline]
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    #[inline]
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Whether the underlying value is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.value.trim().is_empty()
    }

    /// The same value with the negation flag cleared.
    pub fn without_negation(&self) -> Self {
        Self::with_flags(self.value.clone(), false, self.optional)
    }

    /// Lower-case copy, flags preserved. Used for case-insensitive keys.
    pub fn to_lowercase(&self) -> Self {
        Self::with_flags(self.value.to_lowercase(), self.negated, self.optional)
    }

    /// Lower-case copy of a pattern value. The character after a backslash
    /// keeps its case so escapes such as `\D` or `\S` keep their meaning.
    pub fn to_lowercase_pattern(&self) -> Self {
        let mut lowered = String::with_capacity(self.value.len());
        let mut escaped = false;
        for c in self.value.chars() {
            if escaped {
                lowered.push(c);
                escaped = false;
            } else {
                escaped = c == '\\';
                lowered.extend(c.to_lowercase());
            }
        }
        Self::with_flags(lowered, self.negated, self.optional)
    }
}

impl fmt::Display for NottableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.optional {
            write!(f, "{OPTIONAL_PREFIX}")?;
        }
        if self.negated {
            write!(f, "{NOT_PREFIX}")?;
        }
        f.write_str(&self.value)
    }
}

impl From<&str> for NottableValue {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl From<String> for NottableValue {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl Serialize for NottableValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NottableValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Ok(Self::parse(&text))
    }
}
