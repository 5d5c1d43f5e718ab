//! Transaction types for Credora
//!
//! A transaction is an append-only record of value moving in or out of a
//! single user's wallet. The only mutation ever applied after creation is a
//! status flip (and, for provisional records, the balance snapshot assigned
//! when they settle).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::{CredoraError, Currency, TransactionId, TransferId, UserId};

/// Free-form key/value annotations on a transaction
pub type Metadata = BTreeMap<String, String>;

/// Well-known metadata keys written by the engine
pub mod metadata_keys {
    pub const LOAN_ID: &str = "loan_id";
    pub const GRANT_ID: &str = "grant_id";
    pub const DEPOSIT_ID: &str = "deposit_id";
    pub const WITHDRAWAL_ID: &str = "withdrawal_id";
    pub const PAYMENT_REFERENCE: &str = "payment_reference";
    pub const PURPOSE: &str = "purpose";
    pub const ADMIN_ID: &str = "admin_id";
}

/// Direction of a value movement relative to a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    /// Apply this direction to an unsigned magnitude
    pub fn sign(&self, amount: Decimal) -> Decimal {
        match self {
            Self::Credit => amount,
            Self::Debit => -amount,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Credit => "credit",
            Self::Debit => "debit",
        }
    }
}

/// Kind of value movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
    Fee,
    PaymentGatewayDeposit,
    PaymentGatewayWithdrawal,
    Refund,
    Investment,
    InvestmentMaturity,
    InvestmentLiquidation,
    Adjustment,
    CardPayment,
    /// Unrecognised kind read back from storage
    Unknown,
}

impl TransactionType {
    /// Direction implied by the kind alone, if the kind has a fixed one.
    ///
    /// `TRANSFER`, `ADJUSTMENT` and unknown kinds are directionless and must be
    /// classified from the record itself.
    pub fn fixed_direction(&self) -> Option<Direction> {
        match self {
            Self::Deposit | Self::PaymentGatewayDeposit | Self::Refund | Self::InvestmentMaturity => {
                Some(Direction::Credit)
            }
            Self::Withdrawal
            | Self::PaymentGatewayWithdrawal
            | Self::Fee
            | Self::CardPayment
            | Self::Investment
            | Self::InvestmentLiquidation => Some(Direction::Debit),
            Self::Transfer | Self::Adjustment | Self::Unknown => None,
        }
    }

    pub fn is_deposit(&self) -> bool {
        matches!(self, Self::Deposit | Self::PaymentGatewayDeposit)
    }

    pub fn is_withdrawal(&self) -> bool {
        matches!(self, Self::Withdrawal | Self::PaymentGatewayWithdrawal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deposit => "DEPOSIT",
            Self::Withdrawal => "WITHDRAWAL",
            Self::Transfer => "TRANSFER",
            Self::Fee => "FEE",
            Self::PaymentGatewayDeposit => "PAYMENT_GATEWAY_DEPOSIT",
            Self::PaymentGatewayWithdrawal => "PAYMENT_GATEWAY_WITHDRAWAL",
            Self::Refund => "REFUND",
            Self::Investment => "INVESTMENT",
            Self::InvestmentMaturity => "INVESTMENT_MATURITY",
            Self::InvestmentLiquidation => "INVESTMENT_LIQUIDATION",
            Self::Adjustment => "ADJUSTMENT",
            Self::CardPayment => "CARD_PAYMENT",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = std::convert::Infallible;

    /// Never fails: unrecognised kinds map to [`TransactionType::Unknown`]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "DEPOSIT" => Self::Deposit,
            "WITHDRAWAL" => Self::Withdrawal,
            "TRANSFER" => Self::Transfer,
            "FEE" => Self::Fee,
            "PAYMENT_GATEWAY_DEPOSIT" => Self::PaymentGatewayDeposit,
            "PAYMENT_GATEWAY_WITHDRAWAL" => Self::PaymentGatewayWithdrawal,
            "REFUND" => Self::Refund,
            "INVESTMENT" => Self::Investment,
            "INVESTMENT_MATURITY" => Self::InvestmentMaturity,
            "INVESTMENT_LIQUIDATION" => Self::InvestmentLiquidation,
            "ADJUSTMENT" => Self::Adjustment,
            "CARD_PAYMENT" => Self::CardPayment,
            _ => Self::Unknown,
        })
    }
}

/// Status of a transaction record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Provisional, visible in history but without wallet effect
    Pending,
    /// Applied to the wallet
    Completed,
    /// Abandoned, never applied
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = CredoraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "COMPLETED" => Ok(Self::Completed),
            "FAILED" => Ok(Self::Failed),
            other => Err(CredoraError::validation(
                "status",
                format!("unknown transaction status '{}'", other),
            )),
        }
    }
}

/// Sender/receiver relation attached to both legs of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLink {
    pub transfer_id: TransferId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
}

/// Immutable ledger record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    /// Unsigned magnitude
    pub amount: Decimal,
    pub currency: Currency,
    /// Wallet balance before the movement; `None` while provisional
    pub balance_before: Option<Decimal>,
    /// Wallet balance after the movement; `None` while provisional
    pub balance_after: Option<Decimal>,
    pub description: String,
    /// Unique external-facing reference
    pub reference: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: Metadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<TransferLink>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A provisional record: visible in history, no balance snapshot, no
    /// wallet effect until it settles.
    pub fn provisional(
        user_id: UserId,
        kind: TransactionType,
        amount: Decimal,
        currency: Currency,
        description: impl Into<String>,
        reference: impl Into<String>,
        metadata: Metadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            user_id,
            kind,
            status: TransactionStatus::Pending,
            amount,
            currency,
            balance_before: None,
            balance_after: None,
            description: description.into(),
            reference: reference.into(),
            metadata,
            transfer: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// `balance_after - balance_before`, when both are known
    pub fn balance_delta(&self) -> Option<Decimal> {
        match (self.balance_before, self.balance_after) {
            (Some(before), Some(after)) => Some(after - before),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransactionStatus::Completed
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_type_string_round_trip() {
        for kind in [
            TransactionType::Deposit,
            TransactionType::PaymentGatewayWithdrawal,
            TransactionType::InvestmentLiquidation,
            TransactionType::CardPayment,
        ] {
            assert_eq!(kind.as_str().parse::<TransactionType>().unwrap(), kind);
        }
        assert_eq!(
            "LOYALTY_POINTS".parse::<TransactionType>().unwrap(),
            TransactionType::Unknown
        );
    }

    #[test]
    fn test_fixed_directions() {
        assert_eq!(TransactionType::Refund.fixed_direction(), Some(Direction::Credit));
        assert_eq!(TransactionType::Fee.fixed_direction(), Some(Direction::Debit));
        assert_eq!(TransactionType::Transfer.fixed_direction(), None);
        assert_eq!(TransactionType::Adjustment.fixed_direction(), None);
    }

    #[test]
    fn test_provisional_has_no_snapshot() {
        let tx = Transaction::provisional(
            UserId::new(),
            TransactionType::Deposit,
            dec!(500),
            Currency::ngn(),
            "Manual deposit",
            "DEP-1",
            Metadata::new(),
        );
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.balance_delta(), None);
    }

    #[test]
    fn test_kind_serializes_as_type() {
        let tx = Transaction::provisional(
            UserId::new(),
            TransactionType::PaymentGatewayDeposit,
            dec!(1),
            Currency::ngn(),
            "x",
            "REF",
            Metadata::new(),
        );
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["type"], "PAYMENT_GATEWAY_DEPOSIT");
        assert_eq!(json["status"], "PENDING");
    }
}
