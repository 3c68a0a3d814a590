//! Bounded, time-limited cache of compiled regular expressions.
//!
//! Pattern values are tried as full-string regexes on every comparison, and in
//! control-plane mode candidate values are compiled too. Compiling on every
//! request would dominate matching cost, so compiled expressions (and failed
//! compilations) are memoised here.
//!
//! The cache is an ordinary owned object: components that need it hold an
//! `Arc<RegexCache>`, and tests can build isolated instances.
//!
//! Eviction policy:
//! - entries older than `ttl` are dropped on access
//! - when `max_size` is reached the least recently accessed entry is evicted
//!
//! Hits take only a read lock. Misses compile outside any lock and take the
//! write lock just to insert.

use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Configuration for the regex cache.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexCacheConfig {
    /// Maximum number of cached expressions
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// TTL for cache entries in seconds (0 = no expiration)
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_max_size() -> usize {
    1000
}

fn default_ttl_seconds() -> u64 {
    300
}

impl Default for RegexCacheConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    /// `None` when the source is not a valid regex
    regex: Option<Arc<Regex>>,
    created_at: Instant,
    /// Access sequence number, higher is more recent
    last_accessed: AtomicU64,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        !ttl.is_zero() && self.created_at.elapsed() > ttl
    }
}

/// Memoising regex compiler.
#[derive(Debug)]
pub struct RegexCache {
    max_size: usize,
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    tick: AtomicU64,
}

impl RegexCache {
    pub fn new(config: &RegexCacheConfig) -> Self {
        Self {
            max_size: config.max_size.max(1),
            ttl: Duration::from_secs(config.ttl_seconds),
            entries: RwLock::new(HashMap::new()),
            tick: AtomicU64::new(0),
        }
    }

    /// Compile `source` as a whole-string match, returning `None` if it is not
    /// a valid regular expression.
    pub fn full_match(&self, source: &str) -> Option<Arc<Regex>> {
        let tick = self.tick.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(entry) = self.entries.read().get(source) {
            if !entry.is_expired(self.ttl) {
                entry.last_accessed.fetch_max(tick, Ordering::Relaxed);
                return entry.regex.clone();
            }
        }

        let regex = match Regex::new(&format!("^(?:{source})$")) {
            Ok(regex) => Some(Arc::new(regex)),
            Err(e) => {
                trace!("'{}' is not a valid regex: {}", source, e);
                None
            }
        };

        let mut entries = self.entries.write();
        // Another thread may have compiled the same source meanwhile
        if let Some(entry) = entries.get(source) {
            if !entry.is_expired(self.ttl) {
                entry.last_accessed.fetch_max(tick, Ordering::Relaxed);
                return entry.regex.clone();
            }
            entries.remove(source);
        }
        if entries.len() >= self.max_size {
            Self::evict_one(&mut entries, self.ttl);
        }
        entries.insert(
            source.to_string(),
            CacheEntry {
                regex: regex.clone(),
                created_at: Instant::now(),
                last_accessed: AtomicU64::new(tick),
            },
        );
        regex
    }

    /// Whether `candidate` is matched in full by `pattern` interpreted as a regex.
    pub fn is_full_match(&self, pattern: &str, candidate: &str) -> bool {
        self.full_match(pattern)
            .is_some_and(|regex| regex.is_match(candidate))
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn evict_one(entries: &mut HashMap<String, CacheEntry>, ttl: Duration) {
        // Expired entries go first; otherwise the least recently used one
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(ttl));
        if entries.len() < before {
            return;
        }
        let oldest = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed.load(Ordering::Relaxed))
            .map(|(key, _)| key.clone());
        if let Some(key) = oldest {
            entries.remove(&key);
        }
    }
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new(&RegexCacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_match_is_anchored() {
        let cache = RegexCache::default();
        assert!(cache.is_full_match("/api/.*", "/api/users"));
        assert!(!cache.is_full_match("api", "/api/users"));
        assert!(cache.is_full_match("[a-z]+", "abc"));
    }

    #[test]
    fn test_invalid_regex_is_cached_as_none() {
        let cache = RegexCache::default();
        assert!(cache.full_match("([").is_none());
        assert_eq!(cache.len(), 1);
        assert!(!cache.is_full_match("([", "(["));
    }

    #[test]
    fn test_reuses_compiled_regex() {
        let cache = RegexCache::default();
        let first = cache.full_match("a+").unwrap();
        let second = cache.full_match("a+").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_bounded_size() {
        let cache = RegexCache::new(&RegexCacheConfig {
            max_size: 2,
            ttl_seconds: 0,
        });
        cache.full_match("a");
        cache.full_match("b");
        cache.full_match("a");
        cache.full_match("c");

        assert_eq!(cache.len(), 2);
        // "b" was the least recently used entry
        let entries = cache.entries.read();
        assert!(entries.contains_key("a"));
        assert!(entries.contains_key("c"));
    }

    #[test]
    fn test_concurrent_lookups_share_one_compilation() {
        let cache = RegexCache::default();
        let first = cache.full_match("[0-9]+").unwrap();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for i in 0..500 {
                        let regex = cache.full_match("[0-9]+").unwrap();
                        assert!(Arc::ptr_eq(&first, &regex));
                        assert!(cache.is_full_match("[a-z]+", "abc"));
                        assert!(cache.is_full_match(&format!("id-{}", i % 10), &format!("id-{}", i % 10)));
                    }
                });
            }
        });
        assert_eq!(cache.len(), 12);
    }

    #[test]
    fn test_concurrent_misses_stay_bounded() {
        let cache = RegexCache::new(&RegexCacheConfig {
            max_size: 16,
            ttl_seconds: 0,
        });
        std::thread::scope(|scope| {
            for t in 0..4 {
                let cache = &cache;
                scope.spawn(move || {
                    for i in 0..200 {
                        let source = format!("t{t}-{i}");
                        assert!(cache.is_full_match(&source, &source));
                    }
                });
            }
        });
        assert!(cache.len() <= 16);
    }
}
