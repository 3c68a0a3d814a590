//! Ordered multi-maps of nottable entries (headers, query parameters, cookies,
//! path parameters) and the matcher built on them.
//!
//! Keys need not be unique: a header sent twice produces two entries.
//!
//! Serde form is a map from key to one value or a list of values:
//!
//! ```json
//! { "Accept": ["application/json", "text/plain"], "!X-Debug": "", "?X-Trace": "1" }
//! ```

use super::comparator::PatternComparator;
use super::diagnostics::{diff, MatchDiagnostics};
use super::entry::PatternEntry;
use super::subset::contains_subset;
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Ordered list of key/value entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NottableMultiMap {
    entries: Vec<PatternEntry>,
}

impl NottableMultiMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<PatternEntry>) -> Self {
        Self { entries }
    }

    /// Pattern map: keys and values parsed for `!`/`?` prefixes.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| PatternEntry::new(k.as_ref(), v.as_ref()))
                .collect(),
        }
    }

    /// Candidate map: keys and values taken verbatim.
    pub fn from_literal_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: pairs
                .into_iter()
                .map(|(k, v)| PatternEntry::literal(k, v))
                .collect(),
        }
    }

    pub fn push(&mut self, entry: PatternEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[PatternEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First value stored under `key` (exact, case-sensitive comparison).
    pub fn first_value(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.key().value() == key)
            .map(|e| e.value().value())
    }

    pub fn all_keys_negated(&self) -> bool {
        self.entries.iter().all(|e| e.key().is_negated())
    }

    pub fn all_keys_optional(&self) -> bool {
        self.entries.iter().all(|e| e.key().is_optional())
    }

    /// Whether any entry is pattern-equal to `entry`.
    pub fn contains_entry(&self, comparator: &PatternComparator, entry: &PatternEntry) -> bool {
        self.entries.iter().any(|e| entry.matches_entry(comparator, e))
    }

    /// Whether this map (the actual side) contains every entry of `subset`.
    pub fn contains_all(
        &self,
        diagnostics: Option<&mut MatchDiagnostics>,
        comparator: &PatternComparator,
        subset: &NottableMultiMap,
    ) -> bool {
        if subset.is_empty() {
            return true;
        }
        contains_subset(diagnostics, comparator, &subset.entries, &self.entries)
    }

    /// Copy with every key lower-cased (header names compare case-insensitively).
    pub fn with_lowercase_keys(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(PatternEntry::with_lowercase_key)
                .collect(),
        }
    }

    /// Like [`with_lowercase_keys`](Self::with_lowercase_keys) for pattern
    /// keys, leaving regex escapes intact.
    pub fn with_lowercase_pattern_keys(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(PatternEntry::with_lowercase_pattern_key)
                .collect(),
        }
    }
}

impl fmt::Display for NottableMultiMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{entry}")?;
        }
        write!(f, "]")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl Serialize for NottableMultiMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Group values by key while keeping first-seen key order
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for entry in &self.entries {
            let key = entry.key().to_string();
            let value = entry.value().to_string();
            match grouped.iter_mut().find(|(k, _)| *k == key) {
                Some((_, values)) => values.push(value),
                None => grouped.push((key, vec![value])),
            }
        }
        let mut map = serializer.serialize_map(Some(grouped.len()))?;
        for (key, values) in &grouped {
            if values.len() == 1 {
                map.serialize_entry(key, &values[0])?;
            } else {
                map.serialize_entry(key, values)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NottableMultiMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MultiMapVisitor;

        impl<'de> Visitor<'de> for MultiMapVisitor {
            type Value = NottableMultiMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of keys to a value or a list of values")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut map = NottableMultiMap::new();
                while let Some((key, values)) = access.next_entry::<String, OneOrMany>()? {
                    match values {
                        OneOrMany::One(value) => map.push(PatternEntry::new(key.as_str(), value)),
                        OneOrMany::Many(values) => {
                            for value in values {
                                map.push(PatternEntry::new(key.as_str(), value));
                            }
                        }
                    }
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(MultiMapVisitor)
    }
}

/// Matcher for one multi-valued request attribute.
///
/// - empty pattern: always matches
/// - empty candidate: matches only when every pattern key is negated or optional
/// - otherwise: subset containment
#[derive(Debug, Clone)]
pub struct MultiMapMatcher {
    pattern: NottableMultiMap,
    case_insensitive_keys: bool,
    all_keys_negated: bool,
    all_keys_optional: bool,
}

impl MultiMapMatcher {
    pub fn new(pattern: NottableMultiMap) -> Self {
        Self::build(pattern, false)
    }

    /// Matcher comparing keys case-insensitively, as HTTP header names are.
    pub fn case_insensitive(pattern: NottableMultiMap) -> Self {
        Self::build(pattern.with_lowercase_pattern_keys(), true)
    }

    fn build(pattern: NottableMultiMap, case_insensitive_keys: bool) -> Self {
        Self {
            all_keys_negated: pattern.all_keys_negated(),
            all_keys_optional: pattern.all_keys_optional(),
            pattern,
            case_insensitive_keys,
        }
    }

    pub fn pattern(&self) -> &NottableMultiMap {
        &self.pattern
    }

    pub fn is_blank(&self) -> bool {
        self.pattern.is_empty()
    }

    pub fn matches(
        &self,
        mut diagnostics: Option<&mut MatchDiagnostics>,
        comparator: &PatternComparator,
        candidate: &NottableMultiMap,
    ) -> bool {
        if self.pattern.is_empty() {
            return true;
        }
        if candidate.is_empty() {
            let result = self.all_keys_negated || self.all_keys_optional;
            if !result {
                diff!(
                    diagnostics,
                    "multimap subset match failed expected: {} found: none",
                    self.pattern
                );
            }
            return result;
        }

        let lowered;
        let candidate = if self.case_insensitive_keys {
            lowered = candidate.with_lowercase_keys();
            &lowered
        } else {
            candidate
        };
        candidate.contains_all(diagnostics, comparator, &self.pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predicate::diagnostics::FieldName;

    #[test]
    fn test_flags() {
        let map = NottableMultiMap::from_pairs([("!a", ""), ("!b", "")]);
        assert!(map.all_keys_negated());
        assert!(!map.all_keys_optional());

        let map = NottableMultiMap::from_pairs([("?a", ""), ("b", "")]);
        assert!(!map.all_keys_optional());
    }

    #[test]
    fn test_contains_all() {
        let c = PatternComparator::default();
        let actual = NottableMultiMap::from_literal_pairs([("a", "1"), ("b", "2"), ("a", "3")]);

        assert!(actual.contains_all(None, &c, &NottableMultiMap::new()));
        assert!(actual.contains_all(None, &c, &NottableMultiMap::from_pairs([("a", "3")])));
        assert!(actual.contains_all(
            None,
            &c,
            &NottableMultiMap::from_pairs([("a", "1"), ("a", "3")])
        ));
        assert!(!actual.contains_all(None, &c, &NottableMultiMap::from_pairs([("c", "1")])));
    }

    #[test]
    fn test_contains_entry() {
        let c = PatternComparator::default();
        let actual = NottableMultiMap::from_literal_pairs([("a", "1")]);
        assert!(actual.contains_entry(&c, &PatternEntry::new("a", "[0-9]")));
        assert!(!actual.contains_entry(&c, &PatternEntry::new("a", "2")));
    }

    #[test]
    fn test_matcher_empty_candidate() {
        let c = PatternComparator::default();
        let empty = NottableMultiMap::new();

        assert!(MultiMapMatcher::new(NottableMultiMap::new()).matches(None, &c, &empty));
        assert!(
            MultiMapMatcher::new(NottableMultiMap::from_pairs([("!x", "")])).matches(None, &c, &empty)
        );
        assert!(
            MultiMapMatcher::new(NottableMultiMap::from_pairs([("?x", "1")])).matches(None, &c, &empty)
        );
        assert!(
            !MultiMapMatcher::new(NottableMultiMap::from_pairs([("x", "1")])).matches(None, &c, &empty)
        );
    }

    #[test]
    fn test_matcher_case_insensitive_keys() {
        let c = PatternComparator::default();
        let matcher =
            MultiMapMatcher::case_insensitive(NottableMultiMap::from_pairs([("Content-Type", "application/json")]));
        let actual = NottableMultiMap::from_literal_pairs([("content-type", "application/json")]);
        assert!(matcher.matches(None, &c, &actual));

        let strict = MultiMapMatcher::new(NottableMultiMap::from_pairs([("Content-Type", "application/json")]));
        assert!(!strict.matches(None, &c, &actual));
    }

    #[test]
    fn test_matcher_case_insensitive_regex_key_keeps_escapes() {
        let c = PatternComparator::default();
        let matcher = MultiMapMatcher::case_insensitive(NottableMultiMap::from_pairs([("X-\\D+", "1")]));
        assert!(matcher.matches(None, &c, &NottableMultiMap::from_literal_pairs([("X-Trace", "1")])));
        assert!(!matcher.matches(None, &c, &NottableMultiMap::from_literal_pairs([("X-42", "1")])));
    }

    #[test]
    fn test_matcher_diagnostics_for_empty_candidate() {
        let c = PatternComparator::default();
        let mut d = MatchDiagnostics::new(true);
        d.set_current_field(FieldName::Cookies);
        let matcher = MultiMapMatcher::new(NottableMultiMap::from_pairs([("session", "abc")]));
        assert!(!matcher.matches(Some(&mut d), &c, &NottableMultiMap::new()));
        assert_eq!(
            d.differences(FieldName::Cookies),
            ["multimap subset match failed expected: [session=abc] found: none"]
        );
    }

    #[test]
    fn test_serde() {
        let json = r#"{"Accept": ["application/json", "text/plain"], "!X-Debug": "", "?X-Trace": "1"}"#;
        let map: NottableMultiMap = serde_json::from_str(json).unwrap();
        assert_eq!(map.len(), 4);
        assert!(map.entries()[2].key().is_negated());
        assert!(map.entries()[3].is_optional());

        let back: NottableMultiMap =
            serde_json::from_str(&serde_json::to_string(&map).unwrap()).unwrap();
        assert_eq!(back, map);
    }
}
