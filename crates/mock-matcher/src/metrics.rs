//! Prometheus metrics for the matching engine.
//!
//! Tracks match attempts, store evictions and the number of live expectations.
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, Encoder, IntCounter,
    IntCounterVec, IntGauge, TextEncoder,
};
use tracing::warn;

lazy_static! {
    /// Requests matched against the registry
    pub static ref MATCH_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "mock_matcher_match_attempts_total",
        "Total number of requests matched against the expectation registry",
        &["result"]  // result: matched|unmatched
    )
    .unwrap();

    /// Expectations evicted because the store was full
    pub static ref STORE_EVICTIONS_TOTAL: IntCounter = register_int_counter!(
        "mock_matcher_store_evictions_total",
        "Total number of expectations evicted from a full store"
    )
    .unwrap();

    /// Expectations currently registered
    pub static ref EXPECTATIONS: IntGauge = register_int_gauge!(
        "mock_matcher_expectations",
        "Number of expectations currently registered"
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        warn!("failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Record the outcome of one registry lookup.
pub fn record_match_attempt(matched: bool) {
    let result = if matched { "matched" } else { "unmatched" };
    MATCH_ATTEMPTS_TOTAL.with_label_values(&[result]).inc();
}

pub fn record_eviction() {
    STORE_EVICTIONS_TOTAL.inc();
}

pub fn set_expectations(count: usize) {
    EXPECTATIONS.set(i64::try_from(count).unwrap_or(i64::MAX));
}
