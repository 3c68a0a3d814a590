//! Registry of request matchers keyed by expectation id.
//!
//! Lookups walk the store in priority order (highest priority first, then
//! oldest first) and return the first active matcher that accepts the request.
//! Changes are published on a broadcast channel so listeners (UI, persistence,
//! clustering) can follow the registry without polling.

use super::bounded::BoundedDualOrderedStore;
use crate::config::MatcherConfig;
use crate::error::MatcherError;
use crate::expectation::{Expectation, ExpectationPriority};
use crate::metrics;
use crate::predicate::body::JsonMatchType;
use crate::predicate::{HttpRequest, MatchDiagnostics, MatcherSource, PatternComparator, RequestMatcher};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A change to the set of registered matchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatcherChange {
    Added(String),
    Updated(String),
    /// Removed explicitly or evicted because the store was full
    Removed(String),
    Reset,
}

type MatcherStore = BoundedDualOrderedStore<String, Arc<RequestMatcher>, ExpectationPriority>;

pub struct RequestMatchers {
    store: MatcherStore,
    comparator: PatternComparator,
    detailed_match_failures: bool,
    default_json_match_type: JsonMatchType,
    changes: broadcast::Sender<MatcherChange>,
}

impl std::fmt::Debug for RequestMatchers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestMatchers")
            .field("store", &self.store)
            .field("detailed_match_failures", &self.detailed_match_failures)
            .finish()
    }
}

impl RequestMatchers {
    pub fn new(
        max_expectations: usize,
        comparator: PatternComparator,
        detailed_match_failures: bool,
        default_json_match_type: JsonMatchType,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store: BoundedDualOrderedStore::new(
                max_expectations,
                |m: &Arc<RequestMatcher>| m.id().to_string(),
                |m: &Arc<RequestMatcher>| m.expectation().priority_key(),
            ),
            comparator,
            detailed_match_failures,
            default_json_match_type,
            changes,
        }
    }

    pub fn from_config(config: &MatcherConfig) -> Self {
        Self::new(
            config.max_expectations,
            config.comparator(),
            config.detailed_match_failures,
            config.default_json_match_type,
        )
    }

    /// Receive every subsequent change.
    pub fn subscribe(&self) -> broadcast::Receiver<MatcherChange> {
        self.changes.subscribe()
    }

    pub fn comparator(&self) -> &PatternComparator {
        &self.comparator
    }

    pub fn len(&self) -> usize {
        self.store.size()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<RequestMatcher>> {
        self.store.get_by_key(&id.to_string())
    }

    pub fn add(&self, expectation: Expectation) -> Result<Arc<RequestMatcher>, MatcherError> {
        self.add_with_source(expectation, MatcherSource::Api)
    }

    /// Register `expectation`, or update the matcher already registered under
    /// its id.
    ///
    /// An update keeps the original creation time and insertion position, and
    /// moves the matcher in priority order if its priority changed.
    pub fn add_with_source(
        &self,
        expectation: Expectation,
        source: MatcherSource,
    ) -> Result<Arc<RequestMatcher>, MatcherError> {
        expectation.validate()?;
        let mut expectation = expectation;

        if let Some(existing) = self.store.get_by_key(&expectation.id) {
            expectation.created = existing.expectation().created;
            if existing.update(Arc::new(expectation)) {
                self.store.add(existing.clone());
                debug!(id = existing.id(), "updated expectation");
                self.notify(MatcherChange::Updated(existing.id().to_string()));
            }
            return Ok(existing);
        }

        let matcher = Arc::new(RequestMatcher::with_source(
            Arc::new(expectation),
            self.comparator.clone(),
            self.default_json_match_type,
            source,
        ));
        if self.store.is_disabled() {
            debug!(id = matcher.id(), "expectation store disabled, not registering");
            return Ok(matcher);
        }

        let evicted = self.store.add(matcher.clone());
        debug!(id = matcher.id(), "added expectation");
        self.notify(MatcherChange::Added(matcher.id().to_string()));
        if let Some(evicted) = evicted {
            info!(
                id = evicted.id(),
                max_expectations = self.store.max_size(),
                "evicted oldest expectation"
            );
            metrics::record_eviction();
            self.notify(MatcherChange::Removed(evicted.id().to_string()));
        }
        metrics::set_expectations(self.store.size());
        Ok(matcher)
    }

    /// Remove the expectation with `id`. Returns whether it was registered.
    pub fn remove(&self, id: &str) -> bool {
        let removed = self.store.remove_by_key(&id.to_string());
        if removed {
            debug!(id, "removed expectation");
            metrics::set_expectations(self.store.size());
            self.notify(MatcherChange::Removed(id.to_string()));
        }
        removed
    }

    /// Remove every expectation.
    pub fn reset(&self) {
        self.store.clear();
        debug!("reset expectations");
        metrics::set_expectations(0);
        self.notify(MatcherChange::Reset);
    }

    /// Highest-priority active matcher accepting `request`.
    ///
    /// Matchers that are inactive or already producing a response are skipped.
    /// When nothing matches and detailed failures are enabled, the reason each
    /// matcher rejected the request is logged at debug level.
    pub fn first_match(&self, request: &HttpRequest) -> Option<Arc<RequestMatcher>> {
        let mut reports = Vec::new();
        for matcher in self.store.stream_in_priority_order() {
            if !matcher.is_active() || matcher.is_response_in_progress() {
                continue;
            }
            let mut diagnostics = self.diagnostics_for(request);
            if matcher.matches(Some(&mut diagnostics), request) {
                debug!(id = matcher.id(), request = %request, "request matched expectation");
                metrics::record_match_attempt(true);
                return Some(matcher);
            }
            if diagnostics.has_differences() {
                reports.push((matcher.id().to_string(), diagnostics.report()));
            }
        }

        metrics::record_match_attempt(false);
        if reports.is_empty() {
            debug!(request = %request, "no expectation matched request");
        }
        for (id, report) in reports {
            debug!(id = %id, "{}", report);
        }
        None
    }

    /// Every active matcher accepting `request`, in priority order.
    pub fn all_matches(&self, request: &HttpRequest) -> Vec<Arc<RequestMatcher>> {
        self.store
            .stream_in_priority_order()
            .filter(|matcher| matcher.is_active())
            .filter(|matcher| matcher.matches(None, request))
            .collect()
    }

    /// Active matchers in priority order.
    pub fn retrieve_active(&self) -> Vec<Arc<RequestMatcher>> {
        self.store
            .stream_in_priority_order()
            .filter(|matcher| matcher.is_active())
            .collect()
    }

    /// Every registered expectation, oldest first.
    pub fn retrieve_expectations(&self) -> Vec<Arc<Expectation>> {
        self.store
            .values_in_insertion_order()
            .iter()
            .map(|matcher| matcher.expectation())
            .collect()
    }

    /// Explain why `request` does or does not match the expectation `id`.
    ///
    /// Returns `None` when no such expectation is registered.
    pub fn explain(&self, id: &str, request: &HttpRequest) -> Option<(bool, MatchDiagnostics)> {
        let matcher = self.get(id)?;
        let mut diagnostics = MatchDiagnostics::new(true).with_subject(request.to_string());
        let matched = matcher.matches(Some(&mut diagnostics), request);
        Some((matched, diagnostics))
    }

    fn diagnostics_for(&self, request: &HttpRequest) -> MatchDiagnostics {
        if self.detailed_match_failures {
            MatchDiagnostics::new(true).with_subject(request.to_string())
        } else {
            MatchDiagnostics::disabled()
        }
    }

    fn notify(&self, change: MatcherChange) {
        // No receivers is not an error
        let _ = self.changes.send(change);
    }
}
