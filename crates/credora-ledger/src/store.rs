//! Storage seam for the ledger
//!
//! All writes go through [`LedgerStore::commit`] with a [`UnitOfWork`]. A
//! store applies a unit entirely or not at all, checking every version guard
//! and settlement guard before anything becomes visible.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use credora_types::{
    AuditRecord, Deposit, DepositId, Direction, Grant, GrantId, LoanApplication, LoanId, Payment,
    Result, Transaction, TransactionId, TransactionStatus, UserId, Versioned, Wallet, Withdrawal,
    WithdrawalId,
};
use rust_decimal::Decimal;

/// Pagination window for list reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Page {
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Everything, for aggregate reads
    pub fn unbounded() -> Self {
        Self {
            limit: usize::MAX,
            offset: 0,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

/// A versioned row the store can insert, update or delete
pub trait StoredEntity: Versioned + Clone + Send + Sync {
    type Key: Ord + Clone + std::hash::Hash + Send + Sync + std::fmt::Display;

    /// Entity name used in error messages
    const NAME: &'static str;

    fn key(&self) -> Self::Key;
}

impl StoredEntity for Wallet {
    type Key = UserId;
    const NAME: &'static str = "Wallet";

    fn key(&self) -> UserId {
        self.user_id
    }
}

impl StoredEntity for LoanApplication {
    type Key = LoanId;
    const NAME: &'static str = "Loan";

    fn key(&self) -> LoanId {
        self.id
    }
}

impl StoredEntity for Deposit {
    type Key = DepositId;
    const NAME: &'static str = "Deposit";

    fn key(&self) -> DepositId {
        self.id
    }
}

impl StoredEntity for Payment {
    type Key = String;
    const NAME: &'static str = "Payment";

    fn key(&self) -> String {
        self.reference.clone()
    }
}

impl StoredEntity for Withdrawal {
    type Key = WithdrawalId;
    const NAME: &'static str = "Withdrawal";

    fn key(&self) -> WithdrawalId {
        self.id
    }
}

impl StoredEntity for Grant {
    type Key = GrantId;
    const NAME: &'static str = "Grant";

    fn key(&self) -> GrantId {
        self.id
    }
}

/// A single row write.
///
/// `Update` and `Delete` carry the entity as last read; the store rejects
/// them with `Conflict` when the stored version has moved on. After a
/// successful update the store holds `version + 1`.
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    Insert(T),
    Update(T),
    Delete(T),
}

impl<T> Change<T> {
    pub fn entity(&self) -> &T {
        match self {
            Self::Insert(e) | Self::Update(e) | Self::Delete(e) => e,
        }
    }

    pub fn entity_mut(&mut self) -> &mut T {
        match self {
            Self::Insert(e) | Self::Update(e) | Self::Delete(e) => e,
        }
    }
}

/// Status flip of an existing transaction, guarded by its prior status
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub transaction_id: TransactionId,
    pub expected: TransactionStatus,
    pub status: TransactionStatus,
    pub balance_before: Option<Decimal>,
    pub balance_after: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
}

/// The atomic unit: everything in here commits together or not at all
#[derive(Debug, Default)]
pub struct UnitOfWork {
    /// Wallet writes, keyed (and therefore locked) in ascending user order
    pub wallets: BTreeMap<UserId, Change<Wallet>>,
    pub transactions: Vec<Transaction>,
    pub settlements: Vec<Settlement>,
    pub loans: Vec<Change<LoanApplication>>,
    pub deposits: Vec<Change<Deposit>>,
    pub payments: Vec<Change<Payment>>,
    pub withdrawals: Vec<Change<Withdrawal>>,
    pub grants: Vec<Change<Grant>>,
    pub audits: Vec<AuditRecord>,
    pub(crate) posted: Vec<Direction>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
            && self.transactions.is_empty()
            && self.settlements.is_empty()
            && self.loans.is_empty()
            && self.deposits.is_empty()
            && self.payments.is_empty()
            && self.withdrawals.is_empty()
            && self.grants.is_empty()
            && self.audits.is_empty()
    }

    /// Wallet state as staged in this unit so far
    pub fn staged_wallet(&self, user_id: &UserId) -> Option<&Wallet> {
        self.wallets.get(user_id).map(Change::entity)
    }

    pub fn insert_loan(&mut self, loan: LoanApplication) -> &mut Self {
        self.loans.push(Change::Insert(loan));
        self
    }

    pub fn update_loan(&mut self, loan: LoanApplication) -> &mut Self {
        self.loans.push(Change::Update(loan));
        self
    }

    pub fn delete_loan(&mut self, loan: LoanApplication) -> &mut Self {
        self.loans.push(Change::Delete(loan));
        self
    }

    pub fn insert_deposit(&mut self, deposit: Deposit) -> &mut Self {
        self.deposits.push(Change::Insert(deposit));
        self
    }

    pub fn update_deposit(&mut self, deposit: Deposit) -> &mut Self {
        self.deposits.push(Change::Update(deposit));
        self
    }

    pub fn insert_payment(&mut self, payment: Payment) -> &mut Self {
        self.payments.push(Change::Insert(payment));
        self
    }

    pub fn update_payment(&mut self, payment: Payment) -> &mut Self {
        self.payments.push(Change::Update(payment));
        self
    }

    pub fn insert_withdrawal(&mut self, withdrawal: Withdrawal) -> &mut Self {
        self.withdrawals.push(Change::Insert(withdrawal));
        self
    }

    pub fn update_withdrawal(&mut self, withdrawal: Withdrawal) -> &mut Self {
        self.withdrawals.push(Change::Update(withdrawal));
        self
    }

    pub fn insert_grant(&mut self, grant: Grant) -> &mut Self {
        self.grants.push(Change::Insert(grant));
        self
    }

    pub fn update_grant(&mut self, grant: Grant) -> &mut Self {
        self.grants.push(Change::Update(grant));
        self
    }

    /// Record a provisional or otherwise pre-built transaction
    pub fn insert_transaction(&mut self, transaction: Transaction) -> &mut Self {
        self.transactions.push(transaction);
        self
    }

    pub fn audit(&mut self, record: AuditRecord) -> &mut Self {
        self.audits.push(record);
        self
    }
}

/// Persistence backend for the ledger and the lending workflow
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn wallet(&self, user_id: &UserId) -> Result<Option<Wallet>>;

    async fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>>;

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>>;

    /// A user's transactions, newest first
    async fn transactions_for_user(&self, user_id: &UserId, page: Page) -> Result<Vec<Transaction>>;

    /// All transactions, newest first
    async fn all_transactions(&self, page: Page) -> Result<Vec<Transaction>>;

    async fn loan(&self, id: &LoanId) -> Result<Option<LoanApplication>>;

    async fn loans_for_user(&self, user_id: &UserId) -> Result<Vec<LoanApplication>>;

    async fn all_loans(&self) -> Result<Vec<LoanApplication>>;

    async fn deposit(&self, id: &DepositId) -> Result<Option<Deposit>>;

    async fn deposits_for_user(&self, user_id: &UserId) -> Result<Vec<Deposit>>;

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>>;

    async fn withdrawal(&self, id: &WithdrawalId) -> Result<Option<Withdrawal>>;

    async fn withdrawals_for_user(&self, user_id: &UserId) -> Result<Vec<Withdrawal>>;

    async fn grant(&self, id: &GrantId) -> Result<Option<Grant>>;

    async fn grants_for_user(&self, user_id: &UserId) -> Result<Vec<Grant>>;

    /// Audit trail of one resource, oldest first
    async fn audit_records(&self, resource_type: &str, resource_id: &str) -> Result<Vec<AuditRecord>>;

    /// Apply a unit of work atomically
    async fn commit(&self, unit: UnitOfWork) -> Result<()>;
}
