//! Database models - mapped from PostgreSQL tables
//!
//! Enum columns are stored as their upper-case text form, offers, fees,
//! metadata and transfer links as JSONB, money as `NUMERIC`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use credora_types::{
    AuditId, AuditRecord, Currency, Deposit, DepositId, Grant, GrantId, LoanApplication, LoanId,
    LoanOffer, Metadata, Payment, PaymentId, ProcessingFee, Transaction, TransactionId,
    TransactionType, TransferLink, UserId, Wallet, Withdrawal, WithdrawalId,
};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::{DbError, DbResult};

fn parse<T>(column: &'static str, value: &str) -> DbResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| DbError::decode(column, e))
}

fn currency(value: &str) -> DbResult<Currency> {
    parse("currency", value)
}

// ============================================================================
// Wallets & Transactions
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbWallet {
    pub user_id: Uuid,
    pub balance: Decimal,
    pub currency: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbWallet> for Wallet {
    type Error = DbError;

    fn try_from(row: DbWallet) -> DbResult<Self> {
        Ok(Self {
            user_id: UserId::from_uuid(row.user_id),
            balance: row.balance,
            currency: currency(&row.currency)?,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbTransaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: String,
    pub status: String,
    pub amount: Decimal,
    pub currency: String,
    pub balance_before: Option<Decimal>,
    pub balance_after: Option<Decimal>,
    pub description: String,
    pub reference: String,
    pub metadata: Json<Metadata>,
    pub transfer: Option<Json<TransferLink>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbTransaction> for Transaction {
    type Error = DbError;

    fn try_from(row: DbTransaction) -> DbResult<Self> {
        Ok(Self {
            id: TransactionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            // Kinds written by other systems read back as UNKNOWN
            kind: row.kind.parse().unwrap_or(TransactionType::Unknown),
            status: parse("status", &row.status)?,
            amount: row.amount,
            currency: currency(&row.currency)?,
            balance_before: row.balance_before,
            balance_after: row.balance_after,
            description: row.description,
            reference: row.reference,
            metadata: row.metadata.0,
            transfer: row.transfer.map(|t| t.0),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ============================================================================
// Loans
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbLoan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub duration_months: i32,
    pub purpose: String,
    pub status: String,
    pub interest_rate: Option<Decimal>,
    pub monthly_payment: Option<Decimal>,
    pub total_repaid: Decimal,
    pub next_payment_due: Option<DateTime<Utc>>,
    pub processing_fee: Option<Json<ProcessingFee>>,
    pub offer: Option<Json<LoanOffer>>,
    pub rejection_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbLoan> for LoanApplication {
    type Error = DbError;

    fn try_from(row: DbLoan) -> DbResult<Self> {
        Ok(Self {
            id: LoanId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            amount: row.amount,
            currency: currency(&row.currency)?,
            duration_months: u32::try_from(row.duration_months)
                .map_err(|e| DbError::decode("duration_months", e))?,
            purpose: row.purpose,
            status: parse("status", &row.status)?,
            interest_rate: row.interest_rate,
            monthly_payment: row.monthly_payment,
            total_repaid: row.total_repaid,
            next_payment_due: row.next_payment_due,
            processing_fee: row.processing_fee.map(|f| f.0),
            offer: row.offer.map(|o| o.0),
            rejection_reason: row.rejection_reason,
            approved_at: row.approved_at,
            disbursed_at: row.disbursed_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `duration_months` as stored
pub fn duration_column(loan: &LoanApplication) -> DbResult<i32> {
    i32::try_from(loan.duration_months).map_err(|e| DbError::decode("duration_months", e))
}

// ============================================================================
// Funding
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbDeposit {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub status: String,
    pub transaction_id: Option<Uuid>,
    pub payment_reference: Option<String>,
    pub proof_url: Option<String>,
    pub failure_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbDeposit> for Deposit {
    type Error = DbError;

    fn try_from(row: DbDeposit) -> DbResult<Self> {
        Ok(Self {
            id: DepositId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            amount: row.amount,
            currency: currency(&row.currency)?,
            method: parse("method", &row.method)?,
            status: parse("status", &row.status)?,
            transaction_id: row.transaction_id.map(TransactionId::from_uuid),
            payment_reference: row.payment_reference,
            proof_url: row.proof_url,
            failure_reason: row.failure_reason,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbPayment {
    pub id: Uuid,
    pub reference: String,
    pub user_id: Uuid,
    pub deposit_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbPayment> for Payment {
    type Error = DbError;

    fn try_from(row: DbPayment) -> DbResult<Self> {
        Ok(Self {
            id: PaymentId::from_uuid(row.id),
            reference: row.reference,
            user_id: UserId::from_uuid(row.user_id),
            deposit_id: DepositId::from_uuid(row.deposit_id),
            amount: row.amount,
            currency: currency(&row.currency)?,
            status: parse("status", &row.status)?,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbWithdrawal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub transaction_id: Option<Uuid>,
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
    pub failure_reason: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbWithdrawal> for Withdrawal {
    type Error = DbError;

    fn try_from(row: DbWithdrawal) -> DbResult<Self> {
        Ok(Self {
            id: WithdrawalId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            amount: row.amount,
            currency: currency(&row.currency)?,
            status: parse("status", &row.status)?,
            transaction_id: row.transaction_id.map(TransactionId::from_uuid),
            bank_name: row.bank_name,
            account_number: row.account_number,
            account_name: row.account_name,
            failure_reason: row.failure_reason,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct DbGrant {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub currency: String,
    pub purpose: String,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbGrant> for Grant {
    type Error = DbError;

    fn try_from(row: DbGrant) -> DbResult<Self> {
        Ok(Self {
            id: GrantId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            amount: row.amount,
            currency: currency(&row.currency)?,
            purpose: row.purpose,
            status: parse("status", &row.status)?,
            rejection_reason: row.rejection_reason,
            decided_at: row.decided_at,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

// ============================================================================
// Audit
// ============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbAuditRecord {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl From<DbAuditRecord> for AuditRecord {
    fn from(row: DbAuditRecord) -> Self {
        Self {
            id: AuditId::from_uuid(row.id),
            actor_id: UserId::from_uuid(row.actor_id),
            action: row.action,
            resource_type: row.resource_type,
            resource_id: row.resource_id,
            details: row.details,
            created_at: row.created_at,
        }
    }
}

/// Convert a batch of rows, failing on the first undecodable one
pub fn decode_all<R, T>(rows: Vec<R>) -> DbResult<Vec<T>>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use credora_types::{LoanStatus, TransactionStatus};
    use rust_decimal_macros::dec;

    fn transaction_row(kind: &str) -> DbTransaction {
        DbTransaction {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: kind.to_string(),
            status: "COMPLETED".to_string(),
            amount: dec!(100),
            currency: "NGN".to_string(),
            balance_before: Some(dec!(0)),
            balance_after: Some(dec!(100)),
            description: "Seed".to_string(),
            reference: "DEP-1".to_string(),
            metadata: Json(Metadata::new()),
            transfer: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_unknown_kind_reads_as_unknown() {
        let tx = Transaction::try_from(transaction_row("CASHBACK")).unwrap();
        assert_eq!(tx.kind, TransactionType::Unknown);
        assert_eq!(tx.status, TransactionStatus::Completed);
    }

    #[test]
    fn test_bad_status_is_decode_error() {
        let mut row = transaction_row("DEPOSIT");
        row.status = "SETTLED".to_string();
        let err = Transaction::try_from(row).unwrap_err();
        assert!(matches!(err, DbError::Decode { column: "status", .. }));
    }

    #[test]
    fn test_loan_row_decodes_offer_json() {
        let offer = LoanOffer::new(dec!(10000), Some("Reduced".to_string()));
        let row = DbLoan {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            amount: dec!(12000),
            currency: "NGN".to_string(),
            duration_months: 12,
            purpose: "Stock".to_string(),
            status: "PENDING".to_string(),
            interest_rate: None,
            monthly_payment: None,
            total_repaid: Decimal::ZERO,
            next_payment_due: None,
            processing_fee: None,
            offer: Some(Json(offer.clone())),
            rejection_reason: None,
            approved_at: None,
            disbursed_at: None,
            version: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let loan = LoanApplication::try_from(row).unwrap();
        assert_eq!(loan.status, LoanStatus::Pending);
        assert_eq!(loan.offer, Some(offer));
        assert_eq!(loan.version, 3);
    }

    #[test]
    fn test_oversized_duration_is_rejected() {
        let mut loan = LoanApplication::new(UserId::new(), dec!(1000), Currency::ngn(), 6, "Stock");
        assert_eq!(duration_column(&loan).unwrap(), 6);
        loan.duration_months = u32::MAX;
        assert!(duration_column(&loan).is_err());
    }
}
