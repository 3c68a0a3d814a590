//! Expectations: a request definition plus the action to run on a match.
//!
//! The action is opaque to the matching engine and carried as JSON.

use crate::error::MatcherError;
use crate::predicate::RequestDefinition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// A registered expectation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Expectation {
    /// Unique identifier; generated when absent
    #[serde(default = "generate_id")]
    pub id: String,

    /// Higher priorities are attempted first
    #[serde(default)]
    pub priority: i32,

    /// Creation time; earlier expectations win among equal priorities
    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,

    #[serde(default)]
    pub http_request: RequestDefinition,

    /// What to do on a match (response, forward, callback, ...)
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub action: serde_json::Value,
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Sort key for attempting expectations: priority descending, then oldest first.
pub type ExpectationPriority = (Reverse<i32>, DateTime<Utc>);

impl Expectation {
    pub fn new(http_request: RequestDefinition) -> Self {
        Self {
            id: generate_id(),
            priority: 0,
            created: Utc::now(),
            http_request,
            action: serde_json::Value::Null,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_action(mut self, action: serde_json::Value) -> Self {
        self.action = action;
        self
    }

    pub fn priority_key(&self) -> ExpectationPriority {
        (Reverse(self.priority), self.created)
    }

    pub fn validate(&self) -> Result<(), MatcherError> {
        if self.id.trim().is_empty() {
            return Err(MatcherError::InvalidExpectation("id must not be blank".to_string()));
        }
        Ok(())
    }
}

/// Parse one expectation or a list of expectations from JSON.
pub fn parse_expectations(json: &str) -> Result<Vec<Expectation>, MatcherError> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<Expectation>),
        One(Box<Expectation>),
    }

    let expectations = match serde_json::from_str(json).map_err(MatcherError::json)? {
        OneOrMany::Many(list) => list,
        OneOrMany::One(one) => vec![*one],
    };
    for expectation in &expectations {
        expectation.validate()?;
    }
    Ok(expectations)
}
