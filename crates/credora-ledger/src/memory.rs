//! In-memory [`LedgerStore`]
//!
//! Used by tests and by the engine when no database is configured. A single
//! write lock covers the whole commit, so readers never observe a partially
//! applied unit.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use credora_types::{
    AuditRecord, CredoraError, Deposit, DepositId, Grant, GrantId, LoanApplication, LoanId,
    Payment, Result, Transaction, TransactionId, UserId, Wallet, Withdrawal, WithdrawalId,
};
use parking_lot::RwLock;

use crate::store::{Change, LedgerStore, Page, StoredEntity, UnitOfWork};

#[derive(Default)]
struct Tables {
    wallets: HashMap<UserId, Wallet>,
    transactions: HashMap<TransactionId, Transaction>,
    references: HashMap<String, TransactionId>,
    loans: HashMap<LoanId, LoanApplication>,
    deposits: HashMap<DepositId, Deposit>,
    payments: HashMap<String, Payment>,
    withdrawals: HashMap<WithdrawalId, Withdrawal>,
    grants: HashMap<GrantId, Grant>,
    audits: Vec<AuditRecord>,
}

/// Thread-safe in-memory store
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_next_commit: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `commit` fail with a storage error after validation,
    /// leaving every table untouched.
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Number of stored transactions across all users
    pub fn transaction_count(&self) -> usize {
        self.tables.read().transactions.len()
    }
}

fn check_changes<T: StoredEntity>(
    table: &HashMap<T::Key, T>,
    changes: &[Change<T>],
) -> Result<()>
where
    T::Key: Hash + Eq,
{
    let mut inserted = HashSet::new();
    for change in changes {
        let key = change.entity().key();
        match change {
            Change::Insert(_) => {
                if table.contains_key(&key) || !inserted.insert(key.clone()) {
                    return Err(CredoraError::conflict(format!(
                        "{} {} already exists",
                        T::NAME,
                        key
                    )));
                }
            }
            Change::Update(entity) | Change::Delete(entity) => match table.get(&key) {
                None => return Err(CredoraError::not_found(T::NAME, key)),
                Some(stored) if stored.version() != entity.version() => {
                    return Err(CredoraError::conflict(format!(
                        "{} {} was modified concurrently (version {} != {})",
                        T::NAME,
                        key,
                        stored.version(),
                        entity.version()
                    )));
                }
                Some(_) => {}
            },
        }
    }
    Ok(())
}

fn apply_changes<T: StoredEntity>(table: &mut HashMap<T::Key, T>, changes: Vec<Change<T>>)
where
    T::Key: Hash + Eq,
{
    for change in changes {
        match change {
            Change::Insert(entity) => {
                table.insert(entity.key(), entity);
            }
            Change::Update(mut entity) => {
                entity.bump_version();
                table.insert(entity.key(), entity);
            }
            Change::Delete(entity) => {
                table.remove(&entity.key());
            }
        }
    }
}

fn newest_first<'a>(rows: impl Iterator<Item = &'a Transaction>, page: Page) -> Vec<Transaction> {
    let mut rows: Vec<Transaction> = rows.cloned().collect();
    rows.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.reference.cmp(&a.reference))
    });
    rows.into_iter().skip(page.offset).take(page.limit).collect()
}

fn sorted_by_creation<T: Clone, K: Ord>(rows: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut rows: Vec<T> = rows.collect();
    rows.sort_by_key(|row| key(row));
    rows
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn wallet(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        Ok(self.tables.read().wallets.get(user_id).cloned())
    }

    async fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        Ok(self.tables.read().transactions.get(id).cloned())
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let tables = self.tables.read();
        Ok(tables
            .references
            .get(reference)
            .and_then(|id| tables.transactions.get(id))
            .cloned())
    }

    async fn transactions_for_user(&self, user_id: &UserId, page: Page) -> Result<Vec<Transaction>> {
        let tables = self.tables.read();
        Ok(newest_first(
            tables.transactions.values().filter(|tx| &tx.user_id == user_id),
            page,
        ))
    }

    async fn all_transactions(&self, page: Page) -> Result<Vec<Transaction>> {
        let tables = self.tables.read();
        Ok(newest_first(tables.transactions.values(), page))
    }

    async fn loan(&self, id: &LoanId) -> Result<Option<LoanApplication>> {
        Ok(self.tables.read().loans.get(id).cloned())
    }

    async fn loans_for_user(&self, user_id: &UserId) -> Result<Vec<LoanApplication>> {
        let tables = self.tables.read();
        Ok(sorted_by_creation(
            tables.loans.values().filter(|l| &l.user_id == user_id).cloned(),
            |l| l.created_at,
        ))
    }

    async fn all_loans(&self) -> Result<Vec<LoanApplication>> {
        let tables = self.tables.read();
        Ok(sorted_by_creation(tables.loans.values().cloned(), |l| l.created_at))
    }

    async fn deposit(&self, id: &DepositId) -> Result<Option<Deposit>> {
        Ok(self.tables.read().deposits.get(id).cloned())
    }

    async fn deposits_for_user(&self, user_id: &UserId) -> Result<Vec<Deposit>> {
        let tables = self.tables.read();
        Ok(sorted_by_creation(
            tables.deposits.values().filter(|d| &d.user_id == user_id).cloned(),
            |d| d.created_at,
        ))
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        Ok(self.tables.read().payments.get(reference).cloned())
    }

    async fn withdrawal(&self, id: &WithdrawalId) -> Result<Option<Withdrawal>> {
        Ok(self.tables.read().withdrawals.get(id).cloned())
    }

    async fn withdrawals_for_user(&self, user_id: &UserId) -> Result<Vec<Withdrawal>> {
        let tables = self.tables.read();
        Ok(sorted_by_creation(
            tables.withdrawals.values().filter(|w| &w.user_id == user_id).cloned(),
            |w| w.created_at,
        ))
    }

    async fn grant(&self, id: &GrantId) -> Result<Option<Grant>> {
        Ok(self.tables.read().grants.get(id).cloned())
    }

    async fn grants_for_user(&self, user_id: &UserId) -> Result<Vec<Grant>> {
        let tables = self.tables.read();
        Ok(sorted_by_creation(
            tables.grants.values().filter(|g| &g.user_id == user_id).cloned(),
            |g| g.created_at,
        ))
    }

    async fn audit_records(&self, resource_type: &str, resource_id: &str) -> Result<Vec<AuditRecord>> {
        Ok(self
            .tables
            .read()
            .audits
            .iter()
            .filter(|a| a.resource_type == resource_type && a.resource_id == resource_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<()> {
        let mut tables = self.tables.write();

        // Validate everything first; nothing below may fail once applying starts.
        let wallet_changes: Vec<Change<Wallet>> = unit.wallets.into_values().collect();
        check_changes(&tables.wallets, &wallet_changes)?;
        check_changes(&tables.loans, &unit.loans)?;
        check_changes(&tables.deposits, &unit.deposits)?;
        check_changes(&tables.payments, &unit.payments)?;
        check_changes(&tables.withdrawals, &unit.withdrawals)?;
        check_changes(&tables.grants, &unit.grants)?;

        let mut references = HashSet::new();
        for tx in &unit.transactions {
            if tables.references.contains_key(&tx.reference) || !references.insert(tx.reference.as_str()) {
                return Err(CredoraError::conflict(format!(
                    "transaction reference {} already exists",
                    tx.reference
                )));
            }
        }
        for settlement in &unit.settlements {
            match tables.transactions.get(&settlement.transaction_id) {
                None => {
                    return Err(CredoraError::not_found("Transaction", settlement.transaction_id))
                }
                Some(tx) if tx.status != settlement.expected => {
                    return Err(CredoraError::conflict(format!(
                        "transaction {} is {}, expected {}",
                        tx.id, tx.status, settlement.expected
                    )));
                }
                Some(_) => {}
            }
        }

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(CredoraError::storage("injected commit failure"));
        }

        apply_changes(&mut tables.wallets, wallet_changes);
        apply_changes(&mut tables.loans, unit.loans);
        apply_changes(&mut tables.deposits, unit.deposits);
        apply_changes(&mut tables.payments, unit.payments);
        apply_changes(&mut tables.withdrawals, unit.withdrawals);
        apply_changes(&mut tables.grants, unit.grants);

        for tx in unit.transactions {
            tables.references.insert(tx.reference.clone(), tx.id);
            tables.transactions.insert(tx.id, tx);
        }
        for settlement in unit.settlements {
            if let Some(tx) = tables.transactions.get_mut(&settlement.transaction_id) {
                tx.status = settlement.status;
                tx.balance_before = settlement.balance_before;
                tx.balance_after = settlement.balance_after;
                tx.updated_at = settlement.updated_at;
            }
        }
        tables.audits.extend(unit.audits);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use credora_types::{Currency, LoanApplication};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_update_bumps_version() {
        let store = MemoryStore::new();
        let loan = LoanApplication::new(UserId::new(), dec!(1000), Currency::ngn(), 6, "Stock");

        let mut unit = UnitOfWork::new();
        unit.insert_loan(loan.clone());
        store.commit(unit).await.unwrap();

        let mut unit = UnitOfWork::new();
        unit.update_loan(loan.clone());
        store.commit(unit).await.unwrap();

        assert_eq!(store.loan(&loan.id).await.unwrap().unwrap().version, 1);
    }

    #[tokio::test]
    async fn test_stale_update_is_conflict_and_rolls_back() {
        let store = MemoryStore::new();
        let loan = LoanApplication::new(UserId::new(), dec!(1000), Currency::ngn(), 6, "Stock");
        let mut unit = UnitOfWork::new();
        unit.insert_loan(loan.clone());
        store.commit(unit).await.unwrap();

        let mut first = UnitOfWork::new();
        first.update_loan(loan.clone());
        store.commit(first).await.unwrap();

        // Stale copy plus a fresh wallet: neither may land.
        let user = UserId::new();
        let mut stale = UnitOfWork::new();
        stale.update_loan(loan.clone());
        stale
            .wallets
            .insert(user, Change::Insert(Wallet::open(user, Currency::ngn())));
        let err = store.commit(stale).await.unwrap_err();

        assert_eq!(err.error_code(), "CONFLICT");
        assert!(store.wallet(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_injected_failure_applies_nothing() {
        let store = MemoryStore::new();
        let loan = LoanApplication::new(UserId::new(), dec!(1000), Currency::ngn(), 6, "Stock");
        store.fail_next_commit();

        let mut unit = UnitOfWork::new();
        unit.insert_loan(loan.clone());
        let err = store.commit(unit).await.unwrap_err();
        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert!(store.loan(&loan.id).await.unwrap().is_none());

        // One-shot: the next commit goes through.
        let mut unit = UnitOfWork::new();
        unit.insert_loan(loan.clone());
        store.commit(unit).await.unwrap();
        assert!(store.loan(&loan.id).await.unwrap().is_some());
    }
}
