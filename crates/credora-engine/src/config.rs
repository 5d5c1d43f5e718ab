//! Engine configuration

use credora_types::{CredoraError, Currency, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Lending and ledger policy knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Nominal annual interest rate in percent, applied at approval
    pub annual_interest_rate: Decimal,
    /// Days between installments
    pub repayment_interval_days: i64,
    /// Currency used when a request does not name one
    pub default_currency: Currency,
    pub min_loan_amount: Decimal,
    pub max_loan_amount: Decimal,
    pub min_duration_months: u32,
    pub max_duration_months: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            annual_interest_rate: dec!(5.5),
            repayment_interval_days: 30,
            default_currency: Currency::ngn(),
            min_loan_amount: dec!(1000),
            max_loan_amount: dec!(50000000),
            min_duration_months: 1,
            max_duration_months: 360,
        }
    }
}

impl EngineConfig {
    /// Check the configuration is internally consistent
    pub fn validate(&self) -> Result<()> {
        if self.annual_interest_rate < Decimal::ZERO {
            return Err(CredoraError::validation(
                "annual_interest_rate",
                "must not be negative",
            ));
        }
        if self.repayment_interval_days <= 0 {
            return Err(CredoraError::validation(
                "repayment_interval_days",
                "must be positive",
            ));
        }
        if self.min_loan_amount <= Decimal::ZERO || self.min_loan_amount > self.max_loan_amount {
            return Err(CredoraError::validation(
                "min_loan_amount",
                "must be positive and not exceed max_loan_amount",
            ));
        }
        if self.min_duration_months == 0 || self.min_duration_months > self.max_duration_months {
            return Err(CredoraError::validation(
                "min_duration_months",
                "must be at least 1 and not exceed max_duration_months",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"annual_interest_rate": "12", "default_currency": "usd"}"#).unwrap();
        assert_eq!(config.annual_interest_rate, dec!(12));
        assert_eq!(config.default_currency, Currency::usd());
        assert_eq!(config.repayment_interval_days, 30);
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let config = EngineConfig {
            min_duration_months: 24,
            max_duration_months: 12,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
