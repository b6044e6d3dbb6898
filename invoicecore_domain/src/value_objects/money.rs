// /////////////////////////////////////////////////////////////////////////////
// invoicecore
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! Currency value object. Amounts themselves stay plain `rust_decimal::Decimal`
//! — two-place precision is a validation-stage invariant, not a type-level
//! one, mirroring the teacher's preference for validating in constructors
//! rather than encoding every constraint in the type.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// ISO 4217 currency code, always uppercase. Defaults to NGN per spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    pub fn new(code: impl Into<String>) -> Result<Self, CoreError> {
        let code = code.into();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CoreError::invalid_config(format!(
                "`{code}` is not a 3-letter ISO 4217 currency code"
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn ngn() -> Self {
        Self("NGN".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::ngn()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_lowercase_input() {
        assert_eq!(Currency::new("ngn").unwrap().as_str(), "NGN");
    }

    #[test]
    fn rejects_non_alpha_or_wrong_length() {
        assert!(Currency::new("N1").is_err());
        assert!(Currency::new("NGNX").is_err());
    }

    #[test]
    fn default_is_ngn() {
        assert_eq!(Currency::default(), Currency::ngn());
    }
}
