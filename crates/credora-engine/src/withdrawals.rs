//! Withdrawal requests
//!
//! Mirror image of manual deposits: the request records a provisional
//! `WITHDRAWAL` transaction, and the admin decision settles it (debiting the
//! wallet) or fails it.

use chrono::Utc;
use credora_ledger::{new_reference, UnitOfWork};
use credora_types::{
    metadata_keys, validate_amount, Actor, CredoraError, Currency, Metadata, Result, Transaction,
    TransactionType, UserId, Versioned, Withdrawal, WithdrawalId, WithdrawalStatus,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::engine::{audit, ensure_can_view, required_text, visible, Engine};
use crate::notify::Notification;

/// Payout destination and amount
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub amount: Decimal,
    pub currency: Option<Currency>,
    pub bank_name: String,
    pub account_number: String,
    pub account_name: String,
}

impl Engine {
    async fn load_withdrawal(&self, actor: &Actor, withdrawal_id: &WithdrawalId) -> Result<Withdrawal> {
        let withdrawal = self.store().withdrawal(withdrawal_id).await?;
        visible(actor, withdrawal, |w| w.user_id, "Withdrawal", withdrawal_id)
    }

    async fn linked_transaction(&self, withdrawal: &Withdrawal) -> Result<Transaction> {
        let id = withdrawal.transaction_id.ok_or_else(|| {
            CredoraError::invalid_state(format!("withdrawal {} has no transaction", withdrawal.id))
        })?;
        self.store()
            .transaction(&id)
            .await?
            .ok_or_else(|| CredoraError::not_found("Transaction", id))
    }

    /// Record a withdrawal request; fails early when the wallet cannot cover it
    #[instrument(skip(self))]
    pub async fn request_withdrawal(&self, actor: &Actor, request: WithdrawalRequest) -> Result<(Withdrawal, Transaction)> {
        let amount = validate_amount("amount", request.amount)?;
        let bank_name = required_text("bank_name", &request.bank_name)?;
        let account_number = required_text("account_number", &request.account_number)?;
        let account_name = required_text("account_name", &request.account_name)?;

        let wallet = self.ledger.wallet(&actor.user_id).await?;
        let available = wallet.as_ref().map(|w| w.balance).unwrap_or(Decimal::ZERO);
        if available < amount {
            return Err(CredoraError::insufficient_funds(actor.user_id, amount, available));
        }
        let currency = match (request.currency, wallet) {
            (Some(currency), Some(wallet)) => {
                wallet.currency.ensure_matches(&currency)?;
                currency
            }
            (Some(currency), None) => currency,
            (None, Some(wallet)) => wallet.currency,
            (None, None) => self.config.default_currency.clone(),
        };

        let now = Utc::now();
        let mut withdrawal = Withdrawal {
            id: WithdrawalId::new(),
            user_id: actor.user_id,
            amount,
            currency: currency.clone(),
            status: WithdrawalStatus::Pending,
            transaction_id: None,
            bank_name,
            account_number,
            account_name,
            failure_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        let tx = Transaction::provisional(
            actor.user_id,
            TransactionType::Withdrawal,
            amount,
            currency,
            "Withdrawal",
            new_reference("WDR"),
            Metadata::from([(metadata_keys::WITHDRAWAL_ID.to_string(), withdrawal.id.to_string())]),
        );
        withdrawal.transaction_id = Some(tx.id);

        let mut unit = UnitOfWork::new();
        unit.insert_withdrawal(withdrawal.clone());
        unit.insert_transaction(tx.clone());
        self.commit(unit).await?;

        info!(withdrawal_id = %withdrawal.id, user_id = %withdrawal.user_id, amount = %amount, "Withdrawal requested");
        Ok((withdrawal, tx))
    }

    /// Debit the wallet and complete the withdrawal
    #[instrument(skip(self))]
    pub async fn approve_withdrawal(&self, actor: &Actor, withdrawal_id: WithdrawalId) -> Result<(Withdrawal, Transaction)> {
        actor.require_admin()?;
        let owner = self.load_withdrawal(actor, &withdrawal_id).await?.user_id;
        let _guard = self.ledger.locks().lock(owner).await;

        let mut withdrawal = self.load_withdrawal(actor, &withdrawal_id).await?;
        withdrawal.ensure_pending()?;
        let provisional = self.linked_transaction(&withdrawal).await?;

        let mut unit = UnitOfWork::new();
        let tx = self.ledger.stage_settlement(&mut unit, &provisional).await?;
        withdrawal.status = WithdrawalStatus::Completed;
        withdrawal.updated_at = Utc::now();
        unit.update_withdrawal(withdrawal.clone());
        unit.audit(audit(
            actor,
            "withdrawal.approve",
            "withdrawal",
            withdrawal.id,
            json!({ "amount": withdrawal.amount, "reference": tx.reference }),
        ));
        self.commit(unit).await?;
        withdrawal.bump_version();

        info!(
            withdrawal_id = %withdrawal.id,
            user_id = %withdrawal.user_id,
            amount = %withdrawal.amount,
            reference = %tx.reference,
            "Withdrawal approved"
        );
        self.notify(Notification::push(
            withdrawal.user_id,
            "Withdrawal processed",
            format!("{} {} is on its way to {}.", withdrawal.amount, withdrawal.currency, withdrawal.bank_name),
        ));
        Ok((withdrawal, tx))
    }

    /// Fail the withdrawal and its provisional transaction
    #[instrument(skip(self))]
    pub async fn reject_withdrawal(&self, actor: &Actor, withdrawal_id: WithdrawalId, reason: &str) -> Result<Withdrawal> {
        actor.require_admin()?;
        let reason = required_text("reason", reason)?;
        let mut withdrawal = self.load_withdrawal(actor, &withdrawal_id).await?;
        withdrawal.ensure_pending()?;
        let provisional = self.linked_transaction(&withdrawal).await?;

        let mut unit = UnitOfWork::new();
        self.ledger.stage_failure(&mut unit, &provisional)?;
        withdrawal.status = WithdrawalStatus::Failed;
        withdrawal.failure_reason = Some(reason.clone());
        withdrawal.updated_at = Utc::now();
        unit.update_withdrawal(withdrawal.clone());
        unit.audit(audit(
            actor,
            "withdrawal.reject",
            "withdrawal",
            withdrawal.id,
            json!({ "reason": reason }),
        ));
        self.commit(unit).await?;
        withdrawal.bump_version();

        info!(withdrawal_id = %withdrawal.id, "Withdrawal rejected");
        self.notify(Notification::push(
            withdrawal.user_id,
            "Withdrawal declined",
            format!("Your withdrawal was declined: {}", reason),
        ));
        Ok(withdrawal)
    }

    pub async fn withdrawal(&self, actor: &Actor, withdrawal_id: WithdrawalId) -> Result<Withdrawal> {
        self.load_withdrawal(actor, &withdrawal_id).await
    }

    pub async fn withdrawals_for_user(&self, actor: &Actor, user_id: UserId) -> Result<Vec<Withdrawal>> {
        ensure_can_view(actor, &user_id)?;
        self.store().withdrawals_for_user(&user_id).await
    }
}
