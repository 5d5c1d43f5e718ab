//! Manual deposit reconciliation
//!
//! A manual deposit is recorded `PENDING` together with a provisional
//! `PENDING` transaction. The admin decision either settles that
//! transaction against the wallet or fails it. Gateway deposits are
//! refused here; their payment is the only thing that decides them.

use chrono::Utc;
use credora_ledger::{new_reference, Posting, UnitOfWork};
use credora_types::{
    metadata_keys, validate_amount, Actor, CredoraError, Currency, Deposit, DepositId,
    DepositMethod, DepositStatus, Metadata, Result, Transaction, TransactionStatus,
    TransactionType, UserId, Versioned,
};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument};

use crate::engine::{audit, ensure_can_view, owned, required_text, visible, Engine};
use crate::notify::Notification;

impl Engine {
    async fn load_deposit(&self, actor: &Actor, deposit_id: &DepositId) -> Result<Deposit> {
        let deposit = self.store().deposit(deposit_id).await?;
        visible(actor, deposit, |d| d.user_id, "Deposit", deposit_id)
    }

    /// Record a manual deposit awaiting proof and admin review
    #[instrument(skip(self))]
    pub async fn create_manual_deposit(
        &self,
        actor: &Actor,
        amount: Decimal,
        currency: Option<Currency>,
    ) -> Result<(Deposit, Transaction)> {
        let amount = validate_amount("amount", amount)?;
        let currency = self.currency_or_default(currency);

        let mut deposit = Deposit::new(actor.user_id, amount, currency.clone(), DepositMethod::Manual);
        let tx = Transaction::provisional(
            actor.user_id,
            TransactionType::Deposit,
            amount,
            currency,
            "Manual deposit",
            new_reference("DEP"),
            Metadata::from([(metadata_keys::DEPOSIT_ID.to_string(), deposit.id.to_string())]),
        );
        deposit.transaction_id = Some(tx.id);

        let mut unit = UnitOfWork::new();
        unit.insert_deposit(deposit.clone());
        unit.insert_transaction(tx.clone());
        self.commit(unit).await?;

        info!(deposit_id = %deposit.id, user_id = %deposit.user_id, amount = %amount, reference = %tx.reference, "Manual deposit created");
        Ok((deposit, tx))
    }

    /// Attach the uploaded proof; `PENDING -> PROCESSING`
    #[instrument(skip(self))]
    pub async fn upload_deposit_proof(&self, actor: &Actor, deposit_id: DepositId, proof_url: &str) -> Result<Deposit> {
        let proof_url = required_text("proof_url", proof_url)?;
        let deposit = self.store().deposit(&deposit_id).await?;
        let mut deposit = owned(actor, deposit, |d| d.user_id, "Deposit", deposit_id)?;
        deposit.ensure_manual()?;
        deposit.ensure_decidable()?;

        deposit.proof_url = Some(proof_url);
        deposit.status = DepositStatus::Processing;
        deposit.updated_at = Utc::now();
        let mut unit = UnitOfWork::new();
        unit.update_deposit(deposit.clone());
        self.commit(unit).await?;
        deposit.bump_version();

        info!(deposit_id = %deposit.id, "Deposit proof uploaded");
        Ok(deposit)
    }

    /// Credit the wallet and complete the deposit.
    ///
    /// Settles the linked provisional transaction, or records a fresh one
    /// when the deposit has none.
    #[instrument(skip(self))]
    pub async fn approve_deposit(&self, actor: &Actor, deposit_id: DepositId) -> Result<(Deposit, Transaction)> {
        actor.require_admin()?;
        let owner = self.load_deposit(actor, &deposit_id).await?.user_id;
        let _guard = self.ledger.locks().lock(owner).await;

        let mut deposit = self.load_deposit(actor, &deposit_id).await?;
        deposit.ensure_manual()?;
        deposit.ensure_decidable()?;

        let mut unit = UnitOfWork::new();
        let linked = match deposit.transaction_id {
            Some(id) => self.store().transaction(&id).await?,
            None => None,
        };
        let tx = match linked {
            Some(tx) if tx.status == TransactionStatus::Pending => {
                self.ledger.stage_settlement(&mut unit, &tx).await?
            }
            Some(tx) => {
                return Err(CredoraError::invalid_state(format!(
                    "deposit transaction {} is already {}",
                    tx.reference, tx.status
                )))
            }
            None => {
                let posting = Posting::new(
                    deposit.user_id,
                    TransactionType::Deposit,
                    deposit.amount,
                    deposit.currency.clone(),
                    "Manual deposit",
                )
                .with_metadata(metadata_keys::DEPOSIT_ID, deposit.id);
                self.ledger.stage_credit(&mut unit, posting).await?
            }
        };

        deposit.status = DepositStatus::Completed;
        deposit.transaction_id = Some(tx.id);
        deposit.updated_at = Utc::now();
        unit.update_deposit(deposit.clone());
        unit.audit(audit(
            actor,
            "deposit.approve",
            "deposit",
            deposit.id,
            json!({ "amount": deposit.amount, "reference": tx.reference }),
        ));
        self.commit(unit).await?;
        deposit.bump_version();

        info!(
            deposit_id = %deposit.id,
            user_id = %deposit.user_id,
            amount = %deposit.amount,
            reference = %tx.reference,
            "Deposit approved"
        );
        self.notify(Notification::push(
            deposit.user_id,
            "Deposit confirmed",
            format!("{} {} has been added to your wallet.", deposit.amount, deposit.currency),
        ));
        Ok((deposit, tx))
    }

    /// Fail the deposit and its provisional transaction; no wallet effect
    #[instrument(skip(self))]
    pub async fn reject_deposit(&self, actor: &Actor, deposit_id: DepositId, reason: Option<String>) -> Result<Deposit> {
        actor.require_admin()?;
        let owner = self.load_deposit(actor, &deposit_id).await?.user_id;
        let _guard = self.ledger.locks().lock(owner).await;

        let mut deposit = self.load_deposit(actor, &deposit_id).await?;
        deposit.ensure_manual()?;
        deposit.ensure_decidable()?;

        let mut unit = UnitOfWork::new();
        if let Some(id) = deposit.transaction_id {
            if let Some(tx) = self.store().transaction(&id).await? {
                if tx.status == TransactionStatus::Pending {
                    self.ledger.stage_failure(&mut unit, &tx)?;
                }
            }
        }
        deposit.status = DepositStatus::Failed;
        deposit.failure_reason = reason.clone();
        deposit.updated_at = Utc::now();
        unit.update_deposit(deposit.clone());
        unit.audit(audit(
            actor,
            "deposit.reject",
            "deposit",
            deposit.id,
            json!({ "reason": reason }),
        ));
        self.commit(unit).await?;
        deposit.bump_version();

        info!(deposit_id = %deposit.id, "Deposit rejected");
        self.notify(Notification::push(
            deposit.user_id,
            "Deposit declined",
            "Your deposit could not be confirmed.",
        ));
        Ok(deposit)
    }

    pub async fn deposit(&self, actor: &Actor, deposit_id: DepositId) -> Result<Deposit> {
        self.load_deposit(actor, &deposit_id).await
    }

    pub async fn deposits_for_user(&self, actor: &Actor, user_id: UserId) -> Result<Vec<Deposit>> {
        ensure_can_view(actor, &user_id)?;
        self.store().deposits_for_user(&user_id).await
    }
}
