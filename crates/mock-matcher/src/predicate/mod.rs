//! Request matching primitives.
//!
//! # Module Structure
//!
//! - `nottable` - strings carrying negation (`!`) and optional (`?`) flags
//! - `regex_cache` - owned, bounded cache of compiled regexes
//! - `comparator` - pattern comparison (equality, full-string regex, negation)
//! - `entry` - key/value pattern entries
//! - `subset` - injective subset containment over entry lists
//! - `multimap` - ordered multi-maps and the multi-map matcher
//! - `diagnostics` - per-attempt, field-grouped mismatch explanations
//! - `body` - body matching strategies (JSON, JSONPath, XPath, XML Schema, ...)
//! - `path` - path matching with `{name}` templates
//! - `request` - request definitions, candidates and the per-expectation matcher

pub mod body;
mod comparator;
mod diagnostics;
mod entry;
mod multimap;
mod nottable;
mod path;
mod regex_cache;
mod request;
mod subset;

pub use comparator::{MatchMode, PatternComparator};
pub use diagnostics::{FieldName, MatchDiagnostics};
pub use entry::PatternEntry;
pub use multimap::{MultiMapMatcher, NottableMultiMap};
pub use nottable::NottableValue;
pub use path::PathMatcher;
pub use regex_cache::{RegexCache, RegexCacheConfig};
pub use request::{
    parse_cookies, parse_query, HttpRequest, MatcherSource, Protocol, RequestDefinition,
    RequestMatcher,
};
pub use subset::contains_subset;
