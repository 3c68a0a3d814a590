//! Key/value entries of nottable values.

use super::comparator::PatternComparator;
use super::nottable::NottableValue;
use std::fmt;

/// An immutable (key, value) pair, e.g. one header value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternEntry {
    key: NottableValue,
    value: NottableValue,
}

impl PatternEntry {
    pub fn new(key: impl Into<NottableValue>, value: impl Into<NottableValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Entry built from concrete request data, with no pattern syntax applied.
    pub fn literal(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: NottableValue::new(key),
            value: NottableValue::new(value),
        }
    }

    pub fn key(&self) -> &NottableValue {
        &self.key
    }

    pub fn value(&self) -> &NottableValue {
        &self.value
    }

    /// Absence of this entry's key is not a failure.
    pub fn is_optional(&self) -> bool {
        self.key.is_optional()
    }

    /// The key is forbidden outright rather than one of its values.
    pub fn is_notted(&self) -> bool {
        self.key.is_negated() && !self.value.is_negated()
    }

    /// Pattern equality against a candidate entry.
    ///
    /// Key and value must both match. An entry whose key does not match is
    /// still considered equal when either key is optional, so optional
    /// patterns are not penalised by a key mismatch.
    pub fn matches_entry(&self, comparator: &PatternComparator, candidate: &PatternEntry) -> bool {
        let key_matches = comparator.matches_quietly(&self.key, &candidate.key);
        if key_matches {
            comparator.matches_quietly(&self.value, &candidate.value)
        } else {
            self.key.is_optional() || candidate.key.is_optional()
        }
    }

    pub(crate) fn with_lowercase_key(&self) -> Self {
        Self {
            key: self.key.to_lowercase(),
            value: self.value.clone(),
        }
    }

    pub(crate) fn with_lowercase_pattern_key(&self) -> Self {
        Self {
            key: self.key.to_lowercase_pattern(),
            value: self.value.clone(),
        }
    }
}

impl fmt::Display for PatternEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}
