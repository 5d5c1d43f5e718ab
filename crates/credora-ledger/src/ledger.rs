//! The Wallet Ledger
//!
//! Two layers:
//! - `stage_*` methods write a posting into a caller-owned [`UnitOfWork`].
//!   The caller must already hold the wallet lock and commits the unit
//!   itself, so a posting can be composed with status flips of loans,
//!   deposits and payments.
//! - `credit`, `debit`, `transfer` and `open_wallet` lock, stage and commit
//!   in one call.

use std::sync::Arc;

use chrono::Utc;
use credora_types::{
    validate_amount, CredoraError, Currency, Direction, Metadata, Result, Transaction,
    TransactionId, TransactionStatus, TransactionType, TransferId, TransferLink, UserId, Wallet,
};
use rust_decimal::Decimal;
use tracing::{debug, info};
use ulid::Ulid;

use crate::locks::WalletLocks;
use crate::store::{Change, LedgerStore, Settlement, UnitOfWork};

/// Generate an external-facing reference: `<PREFIX>-<ULID>`
pub fn new_reference(prefix: &str) -> String {
    format!("{}-{}", prefix, Ulid::new())
}

fn reference_prefix(kind: TransactionType) -> &'static str {
    match kind {
        TransactionType::Deposit => "DEP",
        TransactionType::Withdrawal => "WDR",
        TransactionType::Transfer => "TRF",
        TransactionType::Fee => "FEE",
        TransactionType::PaymentGatewayDeposit => "PGD",
        TransactionType::PaymentGatewayWithdrawal => "PGW",
        TransactionType::Refund => "RFD",
        TransactionType::Adjustment => "ADJ",
        TransactionType::CardPayment => "CRD",
        TransactionType::Investment
        | TransactionType::InvestmentMaturity
        | TransactionType::InvestmentLiquidation => "INV",
        TransactionType::Unknown => "TXN",
    }
}

/// A single balance movement request
#[derive(Debug, Clone)]
pub struct Posting {
    pub user_id: UserId,
    pub kind: TransactionType,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
    pub reference: String,
    pub metadata: Metadata,
    pub transfer: Option<TransferLink>,
}

impl Posting {
    /// A posting with a freshly generated reference
    pub fn new(
        user_id: UserId,
        kind: TransactionType,
        amount: Decimal,
        currency: Currency,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            kind,
            amount,
            currency,
            description: description.into(),
            reference: new_reference(reference_prefix(kind)),
            metadata: Metadata::new(),
            transfer: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }
}

/// Move `amount` from one wallet to another
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub amount: Decimal,
    pub currency: Currency,
    pub description: String,
}

/// The Credora wallet ledger
#[derive(Clone)]
pub struct WalletLedger {
    store: Arc<dyn LedgerStore>,
    locks: WalletLocks,
}

impl WalletLedger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            locks: WalletLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn locks(&self) -> &WalletLocks {
        &self.locks
    }

    /// Bring the user's wallet into the unit, loading it if not yet staged.
    ///
    /// A missing wallet is opened in `create_in` when given; otherwise the
    /// wallet is treated as empty and the call fails with `InsufficientFunds`
    /// for `requested`.
    async fn stage_wallet<'u>(
        &self,
        unit: &'u mut UnitOfWork,
        user_id: UserId,
        create_in: Option<&Currency>,
        requested: Decimal,
    ) -> Result<&'u mut Wallet> {
        if !unit.wallets.contains_key(&user_id) {
            let change = match self.store.wallet(&user_id).await? {
                Some(wallet) => Change::Update(wallet),
                None => match create_in {
                    Some(currency) => Change::Insert(Wallet::open(user_id, currency.clone())),
                    None => {
                        return Err(CredoraError::insufficient_funds(
                            user_id,
                            requested,
                            Decimal::ZERO,
                        ))
                    }
                },
            };
            unit.wallets.insert(user_id, change);
        }
        unit.wallets
            .get_mut(&user_id)
            .map(Change::entity_mut)
            .ok_or_else(|| CredoraError::not_found("Wallet", user_id))
    }

    /// Apply a movement to the staged wallet, returning the balance snapshot
    async fn apply(
        &self,
        unit: &mut UnitOfWork,
        user_id: UserId,
        currency: &Currency,
        direction: Direction,
        amount: Decimal,
    ) -> Result<(Decimal, Decimal)> {
        let create_in = match direction {
            Direction::Credit => Some(currency),
            Direction::Debit => None,
        };
        let wallet = self.stage_wallet(unit, user_id, create_in, amount).await?;
        wallet.currency.ensure_matches(currency)?;

        let before = wallet.balance;
        if direction == Direction::Debit && !wallet.can_cover(amount) {
            return Err(CredoraError::insufficient_funds(user_id, amount, before));
        }
        let after = before + direction.sign(amount);
        wallet.balance = after;
        wallet.updated_at = Utc::now();
        unit.posted.push(direction);
        Ok((before, after))
    }

    async fn stage_posting(
        &self,
        unit: &mut UnitOfWork,
        posting: Posting,
        direction: Direction,
    ) -> Result<Transaction> {
        let amount = validate_amount("amount", posting.amount)?;
        if let Some(fixed) = posting.kind.fixed_direction() {
            if fixed != direction {
                return Err(CredoraError::validation(
                    "type",
                    format!("{} cannot be posted as a {}", posting.kind, direction.as_str()),
                ));
            }
        }

        let (before, after) = self
            .apply(unit, posting.user_id, &posting.currency, direction, amount)
            .await?;

        let now = Utc::now();
        let tx = Transaction {
            id: TransactionId::new(),
            user_id: posting.user_id,
            kind: posting.kind,
            status: TransactionStatus::Completed,
            amount,
            currency: posting.currency,
            balance_before: Some(before),
            balance_after: Some(after),
            description: posting.description,
            reference: posting.reference,
            metadata: posting.metadata,
            transfer: posting.transfer,
            created_at: now,
            updated_at: now,
        };
        unit.transactions.push(tx.clone());
        Ok(tx)
    }

    /// Stage a credit; a missing wallet is opened in the posting currency
    pub async fn stage_credit(&self, unit: &mut UnitOfWork, posting: Posting) -> Result<Transaction> {
        self.stage_posting(unit, posting, Direction::Credit).await
    }

    /// Stage a debit; fails with `InsufficientFunds` when the wallet cannot cover it
    pub async fn stage_debit(&self, unit: &mut UnitOfWork, posting: Posting) -> Result<Transaction> {
        self.stage_posting(unit, posting, Direction::Debit).await
    }

    /// Settle a provisional transaction: apply it to the wallet and flip it
    /// to `COMPLETED` with its balance snapshot.
    pub async fn stage_settlement(&self, unit: &mut UnitOfWork, tx: &Transaction) -> Result<Transaction> {
        ensure_provisional(tx)?;
        let direction = tx.kind.fixed_direction().ok_or_else(|| {
            CredoraError::validation("type", format!("{} cannot be settled from a provisional record", tx.kind))
        })?;

        let (before, after) = self
            .apply(unit, tx.user_id, &tx.currency, direction, tx.amount)
            .await?;
        let settlement = Settlement {
            transaction_id: tx.id,
            expected: TransactionStatus::Pending,
            status: TransactionStatus::Completed,
            balance_before: Some(before),
            balance_after: Some(after),
            updated_at: Utc::now(),
        };

        let mut settled = tx.clone();
        settled.status = settlement.status;
        settled.balance_before = settlement.balance_before;
        settled.balance_after = settlement.balance_after;
        settled.updated_at = settlement.updated_at;
        unit.settlements.push(settlement);
        Ok(settled)
    }

    /// Abandon a provisional transaction without wallet effect
    pub fn stage_failure(&self, unit: &mut UnitOfWork, tx: &Transaction) -> Result<Transaction> {
        ensure_provisional(tx)?;
        let settlement = Settlement {
            transaction_id: tx.id,
            expected: TransactionStatus::Pending,
            status: TransactionStatus::Failed,
            balance_before: None,
            balance_after: None,
            updated_at: Utc::now(),
        };

        let mut failed = tx.clone();
        failed.status = settlement.status;
        failed.updated_at = settlement.updated_at;
        unit.settlements.push(settlement);
        Ok(failed)
    }

    /// Commit a unit through the store and count its postings
    pub async fn commit(&self, mut unit: UnitOfWork) -> Result<()> {
        let posted = std::mem::take(&mut unit.posted);
        self.store.commit(unit).await?;
        for direction in posted {
            metrics::counter!("credora_ledger_postings_total", "direction" => direction.as_str())
                .increment(1);
        }
        Ok(())
    }

    /// Open a zero-balance wallet, or return the existing one
    pub async fn open_wallet(&self, user_id: UserId, currency: Currency) -> Result<Wallet> {
        let _guard = self.locks.lock(user_id).await;
        if let Some(existing) = self.store.wallet(&user_id).await? {
            if existing.currency != currency {
                return Err(CredoraError::conflict(format!(
                    "wallet {} already exists in {}",
                    user_id, existing.currency
                )));
            }
            return Ok(existing);
        }

        let wallet = Wallet::open(user_id, currency);
        let mut unit = UnitOfWork::new();
        unit.wallets.insert(user_id, Change::Insert(wallet.clone()));
        self.commit(unit).await?;
        info!(user_id = %user_id, currency = %wallet.currency, "Wallet opened");
        Ok(wallet)
    }

    pub async fn wallet(&self, user_id: &UserId) -> Result<Option<Wallet>> {
        debug!(user_id = %user_id, "Reading wallet");
        self.store.wallet(user_id).await
    }

    /// Current balance; zero when the user has no wallet yet
    pub async fn balance(&self, user_id: &UserId) -> Result<Decimal> {
        Ok(self
            .store
            .wallet(user_id)
            .await?
            .map(|w| w.balance)
            .unwrap_or(Decimal::ZERO))
    }

    /// Credit a wallet as one atomic unit
    pub async fn credit(&self, posting: Posting) -> Result<Transaction> {
        let _guard = self.locks.lock(posting.user_id).await;
        let mut unit = UnitOfWork::new();
        let tx = self.stage_credit(&mut unit, posting).await?;
        self.commit(unit).await?;
        info!(
            user_id = %tx.user_id,
            amount = %tx.amount,
            reference = %tx.reference,
            "Wallet credited"
        );
        Ok(tx)
    }

    /// Debit a wallet as one atomic unit
    pub async fn debit(&self, posting: Posting) -> Result<Transaction> {
        let _guard = self.locks.lock(posting.user_id).await;
        let mut unit = UnitOfWork::new();
        let tx = self.stage_debit(&mut unit, posting).await?;
        self.commit(unit).await?;
        info!(
            user_id = %tx.user_id,
            amount = %tx.amount,
            reference = %tx.reference,
            "Wallet debited"
        );
        Ok(tx)
    }

    /// Stage both legs of a transfer. The caller holds both wallet locks.
    pub async fn stage_transfer(
        &self,
        unit: &mut UnitOfWork,
        request: TransferRequest,
    ) -> Result<(Transaction, Transaction)> {
        if request.sender_id == request.receiver_id {
            return Err(CredoraError::validation(
                "receiver_id",
                "cannot transfer to the same wallet",
            ));
        }
        let link = TransferLink {
            transfer_id: TransferId::new(),
            sender_id: request.sender_id,
            receiver_id: request.receiver_id,
        };

        let mut outgoing = Posting::new(
            request.sender_id,
            TransactionType::Transfer,
            request.amount,
            request.currency.clone(),
            request.description.clone(),
        );
        outgoing.transfer = Some(link);
        let mut incoming = Posting::new(
            request.receiver_id,
            TransactionType::Transfer,
            request.amount,
            request.currency,
            request.description,
        );
        incoming.transfer = Some(link);

        let sent = self.stage_debit(unit, outgoing).await?;
        let received = self.stage_credit(unit, incoming).await?;
        Ok((sent, received))
    }

    /// Move funds between two wallets as one atomic unit
    pub async fn transfer(&self, request: TransferRequest) -> Result<(Transaction, Transaction)> {
        let _guard = self
            .locks
            .lock_many(&[request.sender_id, request.receiver_id])
            .await;
        let mut unit = UnitOfWork::new();
        let (sent, received) = self.stage_transfer(&mut unit, request).await?;
        self.commit(unit).await?;
        info!(
            sender_id = %sent.user_id,
            receiver_id = %received.user_id,
            amount = %sent.amount,
            "Transfer completed"
        );
        Ok((sent, received))
    }
}

fn ensure_provisional(tx: &Transaction) -> Result<()> {
    if tx.status == TransactionStatus::Pending {
        Ok(())
    } else {
        Err(CredoraError::invalid_state(format!(
            "transaction {} is already {}",
            tx.reference, tx.status
        )))
    }
}
