//! Exact binary body matching.

use super::precheck;
use crate::predicate::diagnostics::{diff, FieldName, MatchDiagnostics};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::OnceCell;
use tracing::warn;

/// Body bytes must equal the base64-decoded pattern.
#[derive(Debug)]
pub struct BinaryBodyMatcher {
    pattern: String,
    decoded: OnceCell<Result<Vec<u8>, String>>,
}

impl BinaryBodyMatcher {
    pub fn new(base64: impl Into<String>) -> Self {
        Self {
            pattern: base64.into(),
            decoded: OnceCell::new(),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.pattern.trim().is_empty()
    }

    fn expected(&self) -> &Result<Vec<u8>, String> {
        self.decoded.get_or_init(|| {
            STANDARD.decode(self.pattern.trim()).map_err(|e| {
                warn!("binary body pattern is not valid base64, it will never match: {}", e);
                e.to_string()
            })
        })
    }

    pub fn matches_bytes(&self, mut diagnostics: Option<&mut MatchDiagnostics>, candidate: Option<&[u8]>) -> bool {
        if self.is_blank() {
            return true;
        }
        let Some(candidate) = candidate.filter(|bytes| !bytes.is_empty()) else {
            return precheck(diagnostics, false, None).unwrap_or(false);
        };

        match self.expected() {
            Ok(expected) if expected.as_slice() == candidate => true,
            Ok(_) => {
                diff!(
                    diagnostics,
                    FieldName::Body,
                    "binary match failed expected: {} found: {}",
                    self.pattern,
                    STANDARD.encode(candidate)
                );
                false
            }
            Err(e) => {
                diff!(diagnostics, FieldName::Body, "binary pattern is invalid base64: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes() {
        let m = BinaryBodyMatcher::new("AAEC");
        assert!(m.matches_bytes(None, Some(&[0, 1, 2])));
        assert!(!m.matches_bytes(None, Some(&[0, 1, 3])));
        assert!(!m.matches_bytes(None, None));
    }

    #[test]
    fn test_diagnostics() {
        let m = BinaryBodyMatcher::new("AAEC");
        let mut d = MatchDiagnostics::new(true);
        assert!(!m.matches_bytes(Some(&mut d), Some(&[1])));
        assert_eq!(
            d.differences(FieldName::Body),
            ["binary match failed expected: AAEC found: AQ=="]
        );
    }

    #[test]
    fn test_invalid_base64() {
        let m = BinaryBodyMatcher::new("***");
        let mut d = MatchDiagnostics::new(true);
        assert!(!m.matches_bytes(Some(&mut d), Some(b"x")));
        assert!(d.differences(FieldName::Body)[0].starts_with("binary pattern is invalid base64"));
    }
}
