//! Wallet administration, transfers and read models

use chrono::{DateTime, Utc};
use credora_ledger::{AdminStatistics, HistoryEntry, Page, Posting, TransferRequest, UnitOfWork, UserStatistics};
use credora_types::{
    metadata_keys, Actor, CredoraError, Currency, Result, Transaction, TransactionType, UserId,
    Wallet,
};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument};

use crate::engine::{audit, ensure_can_view, required_text, visible, Engine};
use crate::notify::Notification;

impl Engine {
    /// Currency of an existing wallet, else the requested or default one
    async fn posting_currency(&self, user_id: &UserId, currency: Option<Currency>) -> Result<Currency> {
        match (self.ledger.wallet(user_id).await?, currency) {
            (Some(wallet), Some(currency)) => {
                wallet.currency.ensure_matches(&currency)?;
                Ok(currency)
            }
            (Some(wallet), None) => Ok(wallet.currency),
            (None, currency) => Ok(self.currency_or_default(currency)),
        }
    }

    async fn adjust(
        &self,
        actor: &Actor,
        user_id: UserId,
        amount: Decimal,
        currency: Option<Currency>,
        description: &str,
        credit: bool,
    ) -> Result<Transaction> {
        actor.require_admin()?;
        let note = required_text("description", description)?;
        let _guard = self.ledger.locks().lock(user_id).await;
        let currency = self.posting_currency(&user_id, currency).await?;

        let label = if credit { "Admin credit" } else { "Admin debit" };
        let posting = Posting::new(
            user_id,
            TransactionType::Adjustment,
            amount,
            currency,
            format!("{}: {}", label, note),
        )
        .with_metadata(metadata_keys::ADMIN_ID, actor.user_id);

        let mut unit = UnitOfWork::new();
        let tx = if credit {
            self.ledger.stage_credit(&mut unit, posting).await?
        } else {
            self.ledger.stage_debit(&mut unit, posting).await?
        };
        unit.audit(audit(
            actor,
            if credit { "wallet.credit" } else { "wallet.debit" },
            "wallet",
            user_id,
            json!({ "amount": tx.amount, "reference": tx.reference, "note": note }),
        ));
        self.commit(unit).await?;

        info!(user_id = %user_id, amount = %tx.amount, reference = %tx.reference, "{}", label);
        self.notify(Notification::push(
            user_id,
            "Wallet updated",
            format!("{} of {} {}.", label, tx.amount, tx.currency),
        ));
        Ok(tx)
    }

    /// Admin `ADJUSTMENT` credit
    #[instrument(skip(self))]
    pub async fn admin_credit(
        &self,
        actor: &Actor,
        user_id: UserId,
        amount: Decimal,
        currency: Option<Currency>,
        description: &str,
    ) -> Result<Transaction> {
        self.adjust(actor, user_id, amount, currency, description, true).await
    }

    /// Admin `ADJUSTMENT` debit; fails with `InsufficientFunds` like any debit
    #[instrument(skip(self))]
    pub async fn admin_debit(
        &self,
        actor: &Actor,
        user_id: UserId,
        amount: Decimal,
        currency: Option<Currency>,
        description: &str,
    ) -> Result<Transaction> {
        self.adjust(actor, user_id, amount, currency, description, false).await
    }

    /// Send funds from the caller's wallet to another user
    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        actor: &Actor,
        receiver_id: UserId,
        amount: Decimal,
        description: &str,
    ) -> Result<(Transaction, Transaction)> {
        let sender_id = actor.user_id;
        let description = match description.trim() {
            "" => "Transfer".to_string(),
            text => text.to_string(),
        };
        let _guard = self.ledger.locks().lock_many(&[sender_id, receiver_id]).await;
        let currency = self
            .ledger
            .wallet(&sender_id)
            .await?
            .map(|w| w.currency)
            .ok_or_else(|| CredoraError::insufficient_funds(sender_id, amount, Decimal::ZERO))?;

        let mut unit = UnitOfWork::new();
        let (sent, received) = self
            .ledger
            .stage_transfer(
                &mut unit,
                TransferRequest {
                    sender_id,
                    receiver_id,
                    amount,
                    currency,
                    description,
                },
            )
            .await?;
        self.commit(unit).await?;

        info!(
            sender_id = %sender_id,
            receiver_id = %receiver_id,
            amount = %sent.amount,
            reference = %sent.reference,
            "Transfer completed"
        );
        self.notify(Notification::push(
            receiver_id,
            "Money received",
            format!("You received {} {}.", received.amount, received.currency),
        ));
        Ok((sent, received))
    }

    pub async fn wallet(&self, actor: &Actor, user_id: UserId) -> Result<Wallet> {
        let wallet = self.ledger.wallet(&user_id).await?;
        visible(actor, wallet, |w| w.user_id, "Wallet", user_id)
    }

    pub async fn history(&self, actor: &Actor, user_id: UserId, page: Page) -> Result<Vec<HistoryEntry>> {
        ensure_can_view(actor, &user_id)?;
        self.ledger.history(&user_id, page).await
    }

    pub async fn global_history(&self, actor: &Actor, page: Page) -> Result<Vec<HistoryEntry>> {
        actor.require_admin()?;
        self.ledger.global_history(page).await
    }

    pub async fn user_statistics(&self, actor: &Actor, user_id: UserId, now: DateTime<Utc>) -> Result<UserStatistics> {
        ensure_can_view(actor, &user_id)?;
        self.ledger.user_statistics(user_id, now).await
    }

    pub async fn admin_statistics(&self, actor: &Actor, now: DateTime<Utc>) -> Result<AdminStatistics> {
        actor.require_admin()?;
        self.ledger.admin_statistics(now).await
    }
}
