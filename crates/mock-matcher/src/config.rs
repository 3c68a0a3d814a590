//! Configuration for the matching engine.
//!
//! Loaded from YAML or JSON, then adjusted by `MOCK_MATCHER_*` environment
//! variables:
//!
//! ```yaml
//! detailedMatchFailures: true
//! maxExpectations: 5000
//! matchMode: dataPlane
//! regexCache:
//!   maxSize: 1000
//!   ttlSeconds: 300
//! defaultJsonMatchType: onlyMatchingFields
//! logLevel: info
//! ```

use crate::error::MatcherError;
use crate::predicate::body::JsonMatchType;
use crate::predicate::{MatchMode, PatternComparator, RegexCache, RegexCacheConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

pub const ENV_DETAILED_MATCH_FAILURES: &str = "MOCK_MATCHER_DETAILED_MATCH_FAILURES";
pub const ENV_MAX_EXPECTATIONS: &str = "MOCK_MATCHER_MAX_EXPECTATIONS";
pub const ENV_MATCH_MODE: &str = "MOCK_MATCHER_MATCH_MODE";
pub const ENV_LOG_LEVEL: &str = "MOCK_MATCHER_LOG_LEVEL";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatcherConfig {
    /// Record per-field explanations for failed matches
    #[serde(default = "default_detailed_match_failures")]
    pub detailed_match_failures: bool,
    /// Store capacity; 0 disables the store
    #[serde(default = "default_max_expectations")]
    pub max_expectations: usize,
    #[serde(default)]
    pub match_mode: MatchMode,
    #[serde(default)]
    pub regex_cache: RegexCacheConfig,
    #[serde(default)]
    pub default_json_match_type: JsonMatchType,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_detailed_match_failures() -> bool {
    true
}

fn default_max_expectations() -> usize {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            detailed_match_failures: default_detailed_match_failures(),
            max_expectations: default_max_expectations(),
            match_mode: MatchMode::default(),
            regex_cache: RegexCacheConfig::default(),
            default_json_match_type: JsonMatchType::default(),
            log_level: default_log_level(),
        }
    }
}

impl MatcherConfig {
    /// Load from a file; `.json` files are read as JSON, everything else as YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MatcherError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| MatcherError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_str(&contents)?
        } else {
            Self::from_yaml_str(&contents)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, MatcherError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(MatcherError::yaml)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, MatcherError> {
        serde_json::from_str(contents).map_err(MatcherError::json)
    }

    /// Override fields from `MOCK_MATCHER_*` environment variables.
    pub fn apply_env_overrides(&mut self) -> Result<(), MatcherError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), MatcherError> {
        if let Some(value) = lookup(ENV_DETAILED_MATCH_FAILURES) {
            self.detailed_match_failures = parse_bool(ENV_DETAILED_MATCH_FAILURES, &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_EXPECTATIONS) {
            self.max_expectations = value.trim().parse().map_err(|_| {
                MatcherError::InvalidConfig(format!(
                    "{ENV_MAX_EXPECTATIONS} must be a non-negative integer, got '{value}'"
                ))
            })?;
        }
        if let Some(value) = lookup(ENV_MATCH_MODE) {
            self.match_mode = match value.trim() {
                "dataPlane" | "data_plane" | "DATA_PLANE" => MatchMode::DataPlane,
                "controlPlane" | "control_plane" | "CONTROL_PLANE" => MatchMode::ControlPlane,
                other => {
                    return Err(MatcherError::InvalidConfig(format!(
                        "{ENV_MATCH_MODE} must be dataPlane or controlPlane, got '{other}'"
                    )))
                }
            };
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log_level = value.trim().to_string();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), MatcherError> {
        if self.regex_cache.max_size == 0 {
            return Err(MatcherError::InvalidConfig(
                "regexCache.maxSize must be greater than 0".to_string(),
            ));
        }
        if self.log_level.trim().is_empty() {
            return Err(MatcherError::InvalidConfig(
                "logLevel must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Comparator sharing a fresh regex cache sized from this configuration.
    pub fn comparator(&self) -> PatternComparator {
        PatternComparator::new(
            self.match_mode,
            Arc::new(RegexCache::new(&self.regex_cache)),
        )
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, MatcherError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(MatcherError::InvalidConfig(format!(
            "{name} must be a boolean, got '{value}'"
        ))),
    }
}
