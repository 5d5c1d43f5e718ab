//! PostgreSQL [`LedgerStore`]
//!
//! A unit of work is one database transaction. Wallet rows are locked with
//! `SELECT ... FOR UPDATE` in ascending user order before any write, every
//! update and delete carries the version the caller read, and settlements are
//! guarded by the transaction's prior status. The first failed guard returns
//! early, dropping the transaction and rolling everything back.

use async_trait::async_trait;
use credora_ledger::{Change, LedgerStore, Page, Settlement, UnitOfWork};
use credora_types::{
    AuditRecord, CredoraError, Deposit, DepositId, Grant, GrantId, LoanApplication, LoanId,
    Payment, Result, Transaction, TransactionId, UserId, Wallet, Withdrawal, WithdrawalId,
};
use sqlx::postgres::PgQueryResult;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use tracing::debug;

use crate::models::{
    decode_all, duration_column, DbAuditRecord, DbDeposit, DbGrant, DbLoan, DbPayment,
    DbTransaction, DbWallet, DbWithdrawal,
};
use crate::DbError;

/// Ledger store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn limit_offset(page: Page) -> (i64, i64) {
    (
        i64::try_from(page.limit).unwrap_or(i64::MAX),
        i64::try_from(page.offset).unwrap_or(i64::MAX),
    )
}

/// Zero affected rows on a guarded write means the guard failed
fn guarded(result: PgQueryResult, entity: &str, key: impl std::fmt::Display) -> Result<()> {
    if result.rows_affected() == 0 {
        Err(CredoraError::conflict(format!(
            "{} {} was modified concurrently or no longer exists",
            entity, key
        )))
    } else {
        Ok(())
    }
}

// ============================================================================
// Writes
// ============================================================================

async fn write_wallet(conn: &mut PgConnection, change: Change<Wallet>) -> Result<()> {
    match change {
        Change::Insert(w) => {
            sqlx::query(
                r#"
                INSERT INTO wallets (user_id, balance, currency, version, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(w.user_id.as_uuid())
            .bind(w.balance)
            .bind(w.currency.code())
            .bind(w.version)
            .bind(w.created_at)
            .bind(w.updated_at)
            .execute(conn)
            .await
            .map_err(DbError::from)?;
        }
        Change::Update(w) => {
            let stored: Option<(i64,)> =
                sqlx::query_as("SELECT version FROM wallets WHERE user_id = $1 FOR UPDATE")
                    .bind(w.user_id.as_uuid())
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(DbError::from)?;
            match stored {
                None => return Err(CredoraError::not_found("Wallet", w.user_id)),
                Some((version,)) if version != w.version => {
                    return Err(CredoraError::conflict(format!(
                        "Wallet {} was modified concurrently (version {} != {})",
                        w.user_id, version, w.version
                    )))
                }
                Some(_) => {}
            }
            let result = sqlx::query(
                r#"
                UPDATE wallets
                SET balance = $2, currency = $3, version = version + 1, updated_at = $4
                WHERE user_id = $1 AND version = $5
                "#,
            )
            .bind(w.user_id.as_uuid())
            .bind(w.balance)
            .bind(w.currency.code())
            .bind(w.updated_at)
            .bind(w.version)
            .execute(conn)
            .await
            .map_err(DbError::from)?;
            guarded(result, "Wallet", w.user_id)?;
        }
        Change::Delete(w) => {
            let result = sqlx::query("DELETE FROM wallets WHERE user_id = $1 AND version = $2")
                .bind(w.user_id.as_uuid())
                .bind(w.version)
                .execute(conn)
                .await
                .map_err(DbError::from)?;
            guarded(result, "Wallet", w.user_id)?;
        }
    }
    Ok(())
}

async fn insert_transaction(conn: &mut PgConnection, tx: &Transaction) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO transactions
            (id, user_id, kind, status, amount, currency, balance_before, balance_after,
             description, reference, metadata, transfer, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(tx.id.as_uuid())
    .bind(tx.user_id.as_uuid())
    .bind(tx.kind.as_str())
    .bind(tx.status.as_str())
    .bind(tx.amount)
    .bind(tx.currency.code())
    .bind(tx.balance_before)
    .bind(tx.balance_after)
    .bind(&tx.description)
    .bind(&tx.reference)
    .bind(Json(&tx.metadata))
    .bind(tx.transfer.as_ref().map(Json))
    .bind(tx.created_at)
    .bind(tx.updated_at)
    .execute(conn)
    .await
    .map_err(DbError::from)?;
    Ok(())
}

async fn settle(conn: &mut PgConnection, settlement: &Settlement) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE transactions
        SET status = $2, balance_before = $3, balance_after = $4, updated_at = $6
        WHERE id = $1 AND status = $5
        "#,
    )
    .bind(settlement.transaction_id.as_uuid())
    .bind(settlement.status.as_str())
    .bind(settlement.balance_before)
    .bind(settlement.balance_after)
    .bind(settlement.expected.as_str())
    .bind(settlement.updated_at)
    .execute(conn)
    .await
    .map_err(DbError::from)?;
    if result.rows_affected() == 0 {
        return Err(CredoraError::conflict(format!(
            "transaction {} is no longer {}",
            settlement.transaction_id, settlement.expected
        )));
    }
    Ok(())
}

async fn write_loan(conn: &mut PgConnection, change: Change<LoanApplication>) -> Result<()> {
    let loan = change.entity();
    let duration = duration_column(loan)?;
    let result = match &change {
        Change::Insert(_) => sqlx::query(
            r#"
            INSERT INTO loans
                (id, user_id, amount, currency, duration_months, purpose, status, interest_rate,
                 monthly_payment, total_repaid, next_payment_due, processing_fee, offer,
                 rejection_reason, approved_at, disbursed_at, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            "#,
        ),
        Change::Update(_) => sqlx::query(
            r#"
            UPDATE loans
            SET user_id = $2, amount = $3, currency = $4, duration_months = $5, purpose = $6,
                status = $7, interest_rate = $8, monthly_payment = $9, total_repaid = $10,
                next_payment_due = $11, processing_fee = $12, offer = $13, rejection_reason = $14,
                approved_at = $15, disbursed_at = $16, version = version + 1, created_at = $18,
                updated_at = $19
            WHERE id = $1 AND version = $17
            "#,
        ),
        Change::Delete(_) => {
            let result = sqlx::query("DELETE FROM loans WHERE id = $1 AND version = $2")
                .bind(loan.id.as_uuid())
                .bind(loan.version)
                .execute(conn)
                .await
                .map_err(DbError::from)?;
            return guarded(result, "Loan", loan.id);
        }
    }
    .bind(loan.id.as_uuid())
    .bind(loan.user_id.as_uuid())
    .bind(loan.amount)
    .bind(loan.currency.code())
    .bind(duration)
    .bind(&loan.purpose)
    .bind(loan.status.as_str())
    .bind(loan.interest_rate)
    .bind(loan.monthly_payment)
    .bind(loan.total_repaid)
    .bind(loan.next_payment_due)
    .bind(loan.processing_fee.as_ref().map(Json))
    .bind(loan.offer.as_ref().map(Json))
    .bind(&loan.rejection_reason)
    .bind(loan.approved_at)
    .bind(loan.disbursed_at)
    .bind(loan.version)
    .bind(loan.created_at)
    .bind(loan.updated_at)
    .execute(conn)
    .await
    .map_err(DbError::from)?;
    guarded(result, "Loan", loan.id)
}

async fn write_deposit(conn: &mut PgConnection, change: Change<Deposit>) -> Result<()> {
    let deposit = change.entity();
    let result = match &change {
        Change::Insert(_) => sqlx::query(
            r#"
            INSERT INTO deposits
                (id, user_id, amount, currency, method, status, transaction_id, payment_reference,
                 proof_url, failure_reason, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        ),
        Change::Update(_) => sqlx::query(
            r#"
            UPDATE deposits
            SET user_id = $2, amount = $3, currency = $4, method = $5, status = $6,
                transaction_id = $7, payment_reference = $8, proof_url = $9, failure_reason = $10,
                version = version + 1, created_at = $12, updated_at = $13
            WHERE id = $1 AND version = $11
            "#,
        ),
        Change::Delete(_) => {
            let result = sqlx::query("DELETE FROM deposits WHERE id = $1 AND version = $2")
                .bind(deposit.id.as_uuid())
                .bind(deposit.version)
                .execute(conn)
                .await
                .map_err(DbError::from)?;
            return guarded(result, "Deposit", deposit.id);
        }
    }
    .bind(deposit.id.as_uuid())
    .bind(deposit.user_id.as_uuid())
    .bind(deposit.amount)
    .bind(deposit.currency.code())
    .bind(deposit.method.as_str())
    .bind(deposit.status.as_str())
    .bind(deposit.transaction_id.map(|id| *id.as_uuid()))
    .bind(&deposit.payment_reference)
    .bind(&deposit.proof_url)
    .bind(&deposit.failure_reason)
    .bind(deposit.version)
    .bind(deposit.created_at)
    .bind(deposit.updated_at)
    .execute(conn)
    .await
    .map_err(DbError::from)?;
    guarded(result, "Deposit", deposit.id)
}

async fn write_payment(conn: &mut PgConnection, change: Change<Payment>) -> Result<()> {
    let payment = change.entity();
    let result = match &change {
        Change::Insert(_) => sqlx::query(
            r#"
            INSERT INTO payments
                (reference, id, user_id, deposit_id, amount, currency, status, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        ),
        Change::Update(_) => sqlx::query(
            r#"
            UPDATE payments
            SET id = $2, user_id = $3, deposit_id = $4, amount = $5, currency = $6, status = $7,
                version = version + 1, created_at = $9, updated_at = $10
            WHERE reference = $1 AND version = $8
            "#,
        ),
        Change::Delete(_) => {
            let result = sqlx::query("DELETE FROM payments WHERE reference = $1 AND version = $2")
                .bind(&payment.reference)
                .bind(payment.version)
                .execute(conn)
                .await
                .map_err(DbError::from)?;
            return guarded(result, "Payment", &payment.reference);
        }
    }
    .bind(&payment.reference)
    .bind(payment.id.as_uuid())
    .bind(payment.user_id.as_uuid())
    .bind(payment.deposit_id.as_uuid())
    .bind(payment.amount)
    .bind(payment.currency.code())
    .bind(payment.status.as_str())
    .bind(payment.version)
    .bind(payment.created_at)
    .bind(payment.updated_at)
    .execute(conn)
    .await
    .map_err(DbError::from)?;
    guarded(result, "Payment", &payment.reference)
}

async fn write_withdrawal(conn: &mut PgConnection, change: Change<Withdrawal>) -> Result<()> {
    let w = change.entity();
    let result = match &change {
        Change::Insert(_) => sqlx::query(
            r#"
            INSERT INTO withdrawals
                (id, user_id, amount, currency, status, transaction_id, bank_name, account_number,
                 account_name, failure_reason, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        ),
        Change::Update(_) => sqlx::query(
            r#"
            UPDATE withdrawals
            SET user_id = $2, amount = $3, currency = $4, status = $5, transaction_id = $6,
                bank_name = $7, account_number = $8, account_name = $9, failure_reason = $10,
                version = version + 1, created_at = $12, updated_at = $13
            WHERE id = $1 AND version = $11
            "#,
        ),
        Change::Delete(_) => {
            let result = sqlx::query("DELETE FROM withdrawals WHERE id = $1 AND version = $2")
                .bind(w.id.as_uuid())
                .bind(w.version)
                .execute(conn)
                .await
                .map_err(DbError::from)?;
            return guarded(result, "Withdrawal", w.id);
        }
    }
    .bind(w.id.as_uuid())
    .bind(w.user_id.as_uuid())
    .bind(w.amount)
    .bind(w.currency.code())
    .bind(w.status.as_str())
    .bind(w.transaction_id.map(|id| *id.as_uuid()))
    .bind(&w.bank_name)
    .bind(&w.account_number)
    .bind(&w.account_name)
    .bind(&w.failure_reason)
    .bind(w.version)
    .bind(w.created_at)
    .bind(w.updated_at)
    .execute(conn)
    .await
    .map_err(DbError::from)?;
    guarded(result, "Withdrawal", w.id)
}

async fn write_grant(conn: &mut PgConnection, change: Change<Grant>) -> Result<()> {
    let grant = change.entity();
    let result = match &change {
        Change::Insert(_) => sqlx::query(
            r#"
            INSERT INTO grants
                (id, user_id, amount, currency, purpose, status, rejection_reason, decided_at,
                 version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        ),
        Change::Update(_) => sqlx::query(
            r#"
            UPDATE grants
            SET user_id = $2, amount = $3, currency = $4, purpose = $5, status = $6,
                rejection_reason = $7, decided_at = $8, version = version + 1, created_at = $10,
                updated_at = $11
            WHERE id = $1 AND version = $9
            "#,
        ),
        Change::Delete(_) => {
            let result = sqlx::query("DELETE FROM grants WHERE id = $1 AND version = $2")
                .bind(grant.id.as_uuid())
                .bind(grant.version)
                .execute(conn)
                .await
                .map_err(DbError::from)?;
            return guarded(result, "Grant", grant.id);
        }
    }
    .bind(grant.id.as_uuid())
    .bind(grant.user_id.as_uuid())
    .bind(grant.amount)
    .bind(grant.currency.code())
    .bind(&grant.purpose)
    .bind(grant.status.as_str())
    .bind(&grant.rejection_reason)
    .bind(grant.decided_at)
    .bind(grant.version)
    .bind(grant.created_at)
    .bind(grant.updated_at)
    .execute(conn)
    .await
    .map_err(DbError::from)?;
    guarded(result, "Grant", grant.id)
}

async fn insert_audit(conn: &mut PgConnection, record: &AuditRecord) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_records (id, actor_id, action, resource_type, resource_id, details, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(record.id.as_uuid())
    .bind(record.actor_id.as_uuid())
    .bind(&record.action)
    .bind(&record.resource_type)
    .bind(&record.resource_id)
    .bind(&record.details)
    .bind(record.created_at)
    .execute(conn)
    .await
    .map_err(DbError::from)?;
    Ok(())
}

// ============================================================================
// Reads
// ============================================================================

fn decode_one<R, T>(row: Option<R>) -> Result<Option<T>>
where
    T: TryFrom<R, Error = DbError>,
{
    Ok(row.map(T::try_from).transpose()?)
}

fn decode_many<R, T>(rows: Vec<R>) -> Result<Vec<T>>
where
    T: TryFrom<R, Error = DbError>,
{
    Ok(decode_all(rows)?)
}

#[async_trait]
impl LedgerStore for PgStore {
    async fn wallet(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        debug!(user_id = %user_id, "Loading wallet");
        let row = sqlx::query_as::<_, DbWallet>("SELECT * FROM wallets WHERE user_id = $1")
            .bind(user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_one(row)
    }

    async fn transaction(&self, id: &TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, DbTransaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_one(row)
    }

    async fn transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let row = sqlx::query_as::<_, DbTransaction>("SELECT * FROM transactions WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_one(row)
    }

    async fn transactions_for_user(&self, user_id: &UserId, page: Page) -> Result<Vec<Transaction>> {
        debug!(user_id = %user_id, limit = page.limit, offset = page.offset, "Loading transaction history");
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, DbTransaction>(
            r#"
            SELECT * FROM transactions
            WHERE user_id = $1
            ORDER BY created_at DESC, reference DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        decode_many(rows)
    }

    async fn all_transactions(&self, page: Page) -> Result<Vec<Transaction>> {
        let (limit, offset) = limit_offset(page);
        let rows = sqlx::query_as::<_, DbTransaction>(
            "SELECT * FROM transactions ORDER BY created_at DESC, reference DESC LIMIT $1 OFFSET $2",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        decode_many(rows)
    }

    async fn loan(&self, id: &LoanId) -> Result<Option<LoanApplication>> {
        let row = sqlx::query_as::<_, DbLoan>("SELECT * FROM loans WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_one(row)
    }

    async fn loans_for_user(&self, user_id: &UserId) -> Result<Vec<LoanApplication>> {
        let rows = sqlx::query_as::<_, DbLoan>("SELECT * FROM loans WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_many(rows)
    }

    async fn all_loans(&self) -> Result<Vec<LoanApplication>> {
        let rows = sqlx::query_as::<_, DbLoan>("SELECT * FROM loans ORDER BY created_at")
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_many(rows)
    }

    async fn deposit(&self, id: &DepositId) -> Result<Option<Deposit>> {
        let row = sqlx::query_as::<_, DbDeposit>("SELECT * FROM deposits WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_one(row)
    }

    async fn deposits_for_user(&self, user_id: &UserId) -> Result<Vec<Deposit>> {
        let rows = sqlx::query_as::<_, DbDeposit>("SELECT * FROM deposits WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_many(rows)
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, DbPayment>("SELECT * FROM payments WHERE reference = $1")
            .bind(reference)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_one(row)
    }

    async fn withdrawal(&self, id: &WithdrawalId) -> Result<Option<Withdrawal>> {
        let row = sqlx::query_as::<_, DbWithdrawal>("SELECT * FROM withdrawals WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_one(row)
    }

    async fn withdrawals_for_user(&self, user_id: &UserId) -> Result<Vec<Withdrawal>> {
        let rows = sqlx::query_as::<_, DbWithdrawal>(
            "SELECT * FROM withdrawals WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        decode_many(rows)
    }

    async fn grant(&self, id: &GrantId) -> Result<Option<Grant>> {
        let row = sqlx::query_as::<_, DbGrant>("SELECT * FROM grants WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_one(row)
    }

    async fn grants_for_user(&self, user_id: &UserId) -> Result<Vec<Grant>> {
        let rows = sqlx::query_as::<_, DbGrant>("SELECT * FROM grants WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)?;
        decode_many(rows)
    }

    async fn audit_records(&self, resource_type: &str, resource_id: &str) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query_as::<_, DbAuditRecord>(
            r#"
            SELECT * FROM audit_records
            WHERE resource_type = $1 AND resource_id = $2
            ORDER BY created_at
            "#,
        )
        .bind(resource_type)
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::from)?;
        Ok(rows.into_iter().map(AuditRecord::from).collect())
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::from)?;

        for change in unit.wallets.into_values() {
            write_wallet(&mut tx, change).await?;
        }
        for transaction in &unit.transactions {
            insert_transaction(&mut tx, transaction).await?;
        }
        for settlement in &unit.settlements {
            settle(&mut tx, settlement).await?;
        }
        for change in unit.loans {
            write_loan(&mut tx, change).await?;
        }
        for change in unit.deposits {
            write_deposit(&mut tx, change).await?;
        }
        for change in unit.payments {
            write_payment(&mut tx, change).await?;
        }
        for change in unit.withdrawals {
            write_withdrawal(&mut tx, change).await?;
        }
        for change in unit.grants {
            write_grant(&mut tx, change).await?;
        }
        for record in &unit.audits {
            insert_audit(&mut tx, record).await?;
        }

        tx.commit().await.map_err(DbError::from)?;
        debug!("Unit of work committed");
        Ok(())
    }
}
