//! Error types for matcher construction and configuration.
//!
//! Matching itself never fails: malformed candidates and broken patterns are
//! reported as a non-match plus a diagnostic. These errors only surface from
//! loading configuration or building expectations from external definitions.

/// Errors raised while configuring the matching engine.
#[derive(Debug, thiserror::Error)]
pub enum MatcherError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse {format}: {message}")]
    Parse { format: &'static str, message: String },
    #[error("Invalid expectation: {0}")]
    InvalidExpectation(String),
    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),
}

impl MatcherError {
    pub(crate) fn json(err: serde_json::Error) -> Self {
        MatcherError::Parse {
            format: "json",
            message: err.to_string(),
        }
    }

    pub(crate) fn yaml(err: serde_yaml::Error) -> Self {
        MatcherError::Parse {
            format: "yaml",
            message: err.to_string(),
        }
    }
}
