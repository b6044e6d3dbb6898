// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Secure Argument Validation
//!
//! Validates CLI arguments before they reach application code: path
//! canonicalization, traversal rejection, and a conservative character
//! allowlist for free-form string arguments (pipeline names, tenant
//! slugs, profile tags).

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while parsing or validating CLI arguments.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("argument '{arg}' is invalid: {reason}")]
    InvalidValue { arg: String, reason: String },

    #[error("path does not exist: {0}")]
    PathNotFound(String),

    #[error("path contains disallowed traversal sequence: {0}")]
    PathTraversal(String),

    #[error("argument contains disallowed characters: {0}")]
    DisallowedCharacters(String),

    #[error("failed to canonicalize path: {0}")]
    Io(#[from] std::io::Error),
}

/// Stateless validator applied to every CLI argument before use.
pub struct SecureArgParser;

impl SecureArgParser {
    /// Validate a path argument that is expected to already exist
    /// (e.g. a config file). Canonicalizes and rejects traversal.
    pub fn validate_path(raw: &str) -> Result<PathBuf, ParseError> {
        if raw.is_empty() {
            return Err(ParseError::InvalidValue {
                arg: "path".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if raw.contains("..") {
            return Err(ParseError::PathTraversal(raw.to_string()));
        }

        let path = PathBuf::from(raw);
        if !path.exists() {
            return Err(ParseError::PathNotFound(raw.to_string()));
        }

        path.canonicalize().map_err(ParseError::Io)
    }

    /// Validate a free-form string argument (names, tags, identifiers).
    ///
    /// Rejects shell metacharacters and traversal sequences while
    /// allowing the characters legitimately used in pipeline/tenant
    /// names: alphanumerics, `-`, `_`, `.`, `/`, and whitespace.
    pub fn validate_argument(raw: &str) -> Result<(), ParseError> {
        if raw.contains("..") {
            return Err(ParseError::PathTraversal(raw.to_string()));
        }

        let disallowed = raw
            .chars()
            .find(|c| !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ' ' | ':')));

        if let Some(bad) = disallowed {
            return Err(ParseError::DisallowedCharacters(format!(
                "character '{bad}' in '{raw}'"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_in_argument() {
        let err = SecureArgParser::validate_argument("../../etc/passwd");
        assert!(matches!(err, Err(ParseError::PathTraversal(_))));
    }

    #[test]
    fn rejects_shell_metacharacters() {
        let err = SecureArgParser::validate_argument("tenant; rm -rf /");
        assert!(matches!(err, Err(ParseError::DisallowedCharacters(_))));
    }

    #[test]
    fn accepts_ordinary_identifier() {
        assert!(SecureArgParser::validate_argument("enterprise-erp_v2").is_ok());
    }

    #[test]
    fn rejects_missing_path() {
        let err = SecureArgParser::validate_path("/no/such/path/on/disk.toml");
        assert!(matches!(err, Err(ParseError::PathNotFound(_))));
    }
}
