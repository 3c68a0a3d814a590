//! Expectation-matching engine for an HTTP mock server.
//!
//! - `predicate` - pattern values, comparators, body matchers and the per-expectation
//!   request matcher
//! - `store` - bounded priority store and the matcher registry
//! - `expectation` - expectation records
//! - `config`, `error`, `metrics`, `telemetry` - ambient plumbing

pub mod config;
pub mod error;
pub mod expectation;
pub mod metrics;
pub mod predicate;
pub mod store;
pub mod telemetry;

pub use config::MatcherConfig;
pub use error::MatcherError;
pub use expectation::{parse_expectations, Expectation};
pub use predicate::{HttpRequest, MatchDiagnostics, RequestDefinition, RequestMatcher};
pub use store::{MatcherChange, RequestMatchers};
