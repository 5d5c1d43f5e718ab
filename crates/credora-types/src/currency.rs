//! Currency codes and amount validation
//!
//! Amounts are exact decimals. Conversion between currencies is not
//! supported: every wallet, transaction and loan carries exactly one code.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CredoraError, Result};

/// Maximum fractional digits accepted on an amount
pub const AMOUNT_SCALE: u32 = 2;

/// ISO 4217 style currency code (three ASCII uppercase letters)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parse and validate a currency code
    pub fn new(code: impl AsRef<str>) -> Result<Self> {
        let code = code.as_ref().trim().to_ascii_uppercase();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CredoraError::validation(
                "currency",
                format!("'{}' is not a three-letter currency code", code),
            ));
        }
        Ok(Self(code))
    }

    pub fn ngn() -> Self {
        Self("NGN".to_string())
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn code(&self) -> &str {
        &self.0
    }

    /// Fails with `Validation` unless both codes match
    pub fn ensure_matches(&self, other: &Currency) -> Result<()> {
        if self == other {
            Ok(())
        } else {
            Err(CredoraError::validation(
                "currency",
                format!("expected {}, got {}", self, other),
            ))
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Currency {
    type Err = CredoraError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Currency {
    type Error = CredoraError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// Validate a monetary amount supplied by a caller.
///
/// The amount must be strictly positive and carry at most [`AMOUNT_SCALE`]
/// fractional digits.
pub fn validate_amount(field: &str, amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO {
        return Err(CredoraError::validation(field, "amount must be positive"));
    }
    let normalized = amount.normalize();
    if normalized.scale() > AMOUNT_SCALE {
        return Err(CredoraError::validation(
            field,
            format!("amount has more than {} decimal places", AMOUNT_SCALE),
        ));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_currency_normalizes_case() {
        assert_eq!(Currency::new("ngn").unwrap(), Currency::ngn());
        assert_eq!(Currency::new(" usd ").unwrap().code(), "USD");
    }

    #[test]
    fn test_currency_rejects_malformed_codes() {
        assert!(Currency::new("US").is_err());
        assert!(Currency::new("US1").is_err());
        assert!(Currency::new("EURO").is_err());
    }

    #[test]
    fn test_currency_serde_validates() {
        let parsed: Currency = serde_json::from_str("\"eur\"").unwrap();
        assert_eq!(parsed.code(), "EUR");
        assert!(serde_json::from_str::<Currency>("\"e\"").is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert_eq!(validate_amount("amount", dec!(10.50)).unwrap(), dec!(10.5));
        assert!(validate_amount("amount", Decimal::ZERO).is_err());
        assert!(validate_amount("amount", dec!(-1)).is_err());
        assert!(validate_amount("amount", dec!(1.005)).is_err());
    }
}
