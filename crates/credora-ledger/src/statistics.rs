//! History and statistics read models
//!
//! Reads run against committed state without taking wallet locks.

use chrono::{DateTime, Datelike, Utc};
use credora_types::{Direction, Result, Transaction, TransactionStatus, TransactionType, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classifier;
use crate::ledger::WalletLedger;
use crate::store::Page;

/// A transaction annotated with its direction for one viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub direction: Direction,
    pub signed_amount: Decimal,
}

impl HistoryEntry {
    pub fn new(transaction: Transaction, viewer: &UserId) -> Self {
        let direction = classifier::direction(&transaction, viewer);
        Self {
            signed_amount: direction.sign(transaction.amount),
            direction,
            transaction,
        }
    }
}

/// Totals over one period. Amounts only include `COMPLETED` transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub income: Decimal,
    pub expense: Decimal,
    pub deposits: Decimal,
    pub withdrawals: Decimal,
    pub transfers_in: Decimal,
    pub transfers_out: Decimal,
    pub transaction_count: u64,
}

impl PeriodTotals {
    fn record(&mut self, tx: &Transaction, viewer: &UserId) {
        self.transaction_count += 1;
        if tx.status != TransactionStatus::Completed {
            return;
        }
        let direction = classifier::direction(tx, viewer);
        match direction {
            Direction::Credit => self.income += tx.amount,
            Direction::Debit => self.expense += tx.amount,
        }
        if tx.kind.is_deposit() {
            self.deposits += tx.amount;
        } else if tx.kind.is_withdrawal() {
            self.withdrawals += tx.amount;
        } else if tx.kind == TransactionType::Transfer {
            match direction {
                Direction::Credit => self.transfers_in += tx.amount,
                Direction::Debit => self.transfers_out += tx.amount,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatistics {
    pub user_id: UserId,
    pub all_time: PeriodTotals,
    /// Calendar month (UTC) containing the reference time
    pub this_month: PeriodTotals,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStatistics {
    pub total_transactions: u64,
    pub total_volume: Decimal,
    pub monthly_volume: Decimal,
    pub pending_count: u64,
    pub completed_count: u64,
    pub failed_count: u64,
}

fn same_month(a: &DateTime<Utc>, b: &DateTime<Utc>) -> bool {
    a.year() == b.year() && a.month() == b.month()
}

/// Aggregate a user's transactions, all-time and for the month of `now`
pub fn user_statistics(user_id: UserId, transactions: &[Transaction], now: DateTime<Utc>) -> UserStatistics {
    let mut all_time = PeriodTotals::default();
    let mut this_month = PeriodTotals::default();
    for tx in transactions.iter().filter(|tx| tx.user_id == user_id) {
        all_time.record(tx, &user_id);
        if same_month(&tx.created_at, &now) {
            this_month.record(tx, &user_id);
        }
    }
    UserStatistics {
        user_id,
        all_time,
        this_month,
    }
}

/// Platform-wide counts and completed volume
pub fn admin_statistics(transactions: &[Transaction], now: DateTime<Utc>) -> AdminStatistics {
    let mut stats = AdminStatistics::default();
    for tx in transactions {
        stats.total_transactions += 1;
        match tx.status {
            TransactionStatus::Pending => stats.pending_count += 1,
            TransactionStatus::Failed => stats.failed_count += 1,
            TransactionStatus::Completed => {
                stats.completed_count += 1;
                stats.total_volume += tx.amount;
                if same_month(&tx.created_at, &now) {
                    stats.monthly_volume += tx.amount;
                }
            }
        }
    }
    stats
}

impl WalletLedger {
    /// A user's history, newest first
    pub async fn history(&self, user_id: &UserId, page: Page) -> Result<Vec<HistoryEntry>> {
        debug!(user_id = %user_id, limit = page.limit, offset = page.offset, "Reading history");
        let rows = self.store().transactions_for_user(user_id, page).await?;
        Ok(rows.into_iter().map(|tx| HistoryEntry::new(tx, user_id)).collect())
    }

    /// Every user's history, newest first, each row seen by its owner
    pub async fn global_history(&self, page: Page) -> Result<Vec<HistoryEntry>> {
        debug!(limit = page.limit, offset = page.offset, "Reading global history");
        let rows = self.store().all_transactions(page).await?;
        Ok(rows
            .into_iter()
            .map(|tx| {
                let owner = tx.user_id;
                HistoryEntry::new(tx, &owner)
            })
            .collect())
    }

    pub async fn user_statistics(&self, user_id: UserId, now: DateTime<Utc>) -> Result<UserStatistics> {
        let rows = self
            .store()
            .transactions_for_user(&user_id, Page::unbounded())
            .await?;
        Ok(user_statistics(user_id, &rows, now))
    }

    pub async fn admin_statistics(&self, now: DateTime<Utc>) -> Result<AdminStatistics> {
        let rows = self.store().all_transactions(Page::unbounded()).await?;
        Ok(admin_statistics(&rows, now))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use credora_types::{Currency, Metadata};
    use rust_decimal_macros::dec;

    fn completed(user: UserId, kind: TransactionType, amount: Decimal, at: DateTime<Utc>) -> Transaction {
        let mut tx = Transaction::provisional(user, kind, amount, Currency::ngn(), "t", "R", Metadata::new());
        tx.status = TransactionStatus::Completed;
        tx.created_at = at;
        tx
    }

    #[test]
    fn test_user_statistics_split_by_month() {
        let user = UserId::new();
        let now = Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap();
        let last_month = now - Duration::days(30);

        let mut pending = completed(user, TransactionType::Deposit, dec!(999), now);
        pending.status = TransactionStatus::Pending;

        let rows = vec![
            completed(user, TransactionType::Deposit, dec!(1000), last_month),
            completed(user, TransactionType::PaymentGatewayDeposit, dec!(250), now),
            completed(user, TransactionType::Withdrawal, dec!(100), now),
            completed(user, TransactionType::Fee, dec!(5), now),
            pending,
        ];
        let stats = user_statistics(user, &rows, now);

        assert_eq!(stats.all_time.income, dec!(1250));
        assert_eq!(stats.all_time.expense, dec!(105));
        assert_eq!(stats.all_time.deposits, dec!(1250));
        assert_eq!(stats.all_time.withdrawals, dec!(100));
        assert_eq!(stats.all_time.transaction_count, 5);

        assert_eq!(stats.this_month.income, dec!(250));
        assert_eq!(stats.this_month.deposits, dec!(250));
        assert_eq!(stats.this_month.transaction_count, 4);
    }

    #[test]
    fn test_admin_statistics_counts() {
        let user = UserId::new();
        let now = Utc::now();
        let mut failed = completed(user, TransactionType::Deposit, dec!(70), now);
        failed.status = TransactionStatus::Failed;
        let rows = vec![
            completed(user, TransactionType::Deposit, dec!(100), now),
            completed(user, TransactionType::Withdrawal, dec!(40), now - Duration::days(400)),
            failed,
        ];
        let stats = admin_statistics(&rows, now);

        assert_eq!(stats.total_transactions, 3);
        assert_eq!(stats.completed_count, 2);
        assert_eq!(stats.failed_count, 1);
        assert_eq!(stats.pending_count, 0);
        assert_eq!(stats.total_volume, dec!(140));
        assert_eq!(stats.monthly_volume, dec!(100));
    }
}
