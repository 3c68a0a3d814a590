//! Expectation storage.
//!
//! - `bounded` - generic capacity-limited store ordered by insertion and priority
//! - `matchers` - registry of compiled request matchers built on it

mod bounded;
mod matchers;

pub use bounded::{BoundedDualOrderedStore, PriorityStream};
pub use matchers::{MatcherChange, RequestMatchers};
