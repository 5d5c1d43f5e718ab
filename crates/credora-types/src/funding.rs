//! Funding records: deposits, gateway payments and withdrawals
//!
//! Funding records move value only through the ledger. Each carries an
//! optional link to the provisional transaction it created so the record can
//! be settled or failed later.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CredoraError, Currency, DepositId, PaymentId, Result, TransactionId, UserId, WithdrawalId};

macro_rules! status_strings {
    ($name:ident, $entity:literal, { $($variant:ident => $text:literal),* $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)*
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CredoraError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($text => Ok(Self::$variant),)*
                    other => Err(CredoraError::validation(
                        "status",
                        format!(concat!("unknown ", $entity, " value '{}'"), other),
                    )),
                }
            }
        }
    };
}

/// How a deposit is funded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositMethod {
    /// Bank transfer with an uploaded proof, decided by an admin
    Manual,
    /// Card/bank payment through the payment gateway, confirmed by webhook
    Gateway,
}

status_strings!(DepositMethod, "deposit method", {
    Manual => "MANUAL",
    Gateway => "GATEWAY",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

status_strings!(DepositStatus, "deposit status", {
    Pending => "PENDING",
    Processing => "PROCESSING",
    Completed => "COMPLETED",
    Failed => "FAILED",
});

impl DepositStatus {
    /// Statuses from which an admin may still decide the deposit
    pub fn is_decidable(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: DepositId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: Currency,
    pub method: DepositMethod,
    pub status: DepositStatus,
    /// Provisional transaction created alongside the deposit
    pub transaction_id: Option<TransactionId>,
    /// Gateway payment reference, for gateway deposits
    pub payment_reference: Option<String>,
    pub proof_url: Option<String>,
    pub failure_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Deposit {
    pub fn new(user_id: UserId, amount: Decimal, currency: Currency, method: DepositMethod) -> Self {
        let now = Utc::now();
        Self {
            id: DepositId::new(),
            user_id,
            amount,
            currency,
            method,
            status: DepositStatus::Pending,
            transaction_id: None,
            payment_reference: None,
            proof_url: None,
            failure_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Fails with `InvalidState` unless an admin may still decide it
    pub fn ensure_decidable(&self) -> Result<()> {
        if self.status.is_decidable() {
            Ok(())
        } else {
            Err(CredoraError::invalid_state(format!(
                "deposit {} is {}, expected PENDING or PROCESSING",
                self.id, self.status
            )))
        }
    }

    /// Gateway deposits are reconciled by their payment, never by hand
    pub fn ensure_manual(&self) -> Result<()> {
        if self.method == DepositMethod::Manual {
            Ok(())
        } else {
            Err(CredoraError::invalid_state(format!(
                "deposit {} is a {} deposit and settles through its payment",
                self.id, self.method
            )))
        }
    }
}

/// Status of an external gateway payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
}

status_strings!(PaymentStatus, "payment status", {
    Pending => "PENDING",
    Success => "SUCCESS",
    Failed => "FAILED",
});

/// Idempotency anchor for webhook confirmation of a gateway deposit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    /// Unique reference shared with the gateway
    pub reference: String,
    pub user_id: UserId,
    pub deposit_id: DepositId,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Fails with `Conflict` unless the payment is still `PENDING`
    pub fn ensure_pending(&self) -> Result<()> {
        if self.status == PaymentStatus::Pending {
            Ok(())
        } else {
            Err(CredoraError::conflict(format!(
                "payment {} already processed ({})",
                self.reference, self.status
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Failed,
}

status_strings!(WithdrawalStatus, "withdrawal status", {
    Pending => "PENDING",
    Completed => "COMPLETED",
    Failed => "FAILED",
});

/// Payout request from a wallet to an external bank account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: WithdrawalId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: WithdrawalStatus,
    pub transaction_id: Option<TransactionId>,
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
    pub failure_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn ensure_pending(&self) -> Result<()> {
        if self.status == WithdrawalStatus::Pending {
            Ok(())
        } else {
            Err(CredoraError::invalid_state(format!(
                "withdrawal {} is {}, expected PENDING",
                self.id, self.status
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_deposit_decidable_states() {
        let mut deposit = Deposit::new(UserId::new(), dec!(500), Currency::ngn(), DepositMethod::Manual);
        assert!(deposit.ensure_decidable().is_ok());
        deposit.status = DepositStatus::Processing;
        assert!(deposit.ensure_decidable().is_ok());
        deposit.status = DepositStatus::Completed;
        assert_eq!(deposit.ensure_decidable().unwrap_err().error_code(), "INVALID_STATE");
    }

    #[test]
    fn test_only_manual_deposits_are_decided_by_hand() {
        let manual = Deposit::new(UserId::new(), dec!(500), Currency::ngn(), DepositMethod::Manual);
        assert!(manual.ensure_manual().is_ok());

        let gateway = Deposit::new(UserId::new(), dec!(500), Currency::ngn(), DepositMethod::Gateway);
        assert_eq!(gateway.ensure_manual().unwrap_err().error_code(), "INVALID_STATE");
    }

    #[test]
    fn test_payment_guard_is_conflict() {
        let payment = Payment {
            id: PaymentId::new(),
            reference: "PAY-1".to_string(),
            user_id: UserId::new(),
            deposit_id: DepositId::new(),
            amount: dec!(100),
            currency: Currency::ngn(),
            status: PaymentStatus::Success,
            version: 1,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert_eq!(payment.ensure_pending().unwrap_err().error_code(), "CONFLICT");
    }

    #[test]
    fn test_status_strings() {
        assert_eq!("PROCESSING".parse::<DepositStatus>().unwrap(), DepositStatus::Processing);
        assert_eq!(PaymentStatus::Success.to_string(), "SUCCESS");
        assert_eq!("GATEWAY".parse::<DepositMethod>().unwrap(), DepositMethod::Gateway);
        assert!("DONE".parse::<WithdrawalStatus>().is_err());
    }
}
