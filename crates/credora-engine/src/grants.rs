//! Grants: approve-and-disburse in one step

use chrono::Utc;
use credora_ledger::{Posting, UnitOfWork};
use credora_types::{
    metadata_keys, validate_amount, Actor, Currency, Grant, GrantId, GrantStatus, Result,
    Transaction, TransactionType, UserId, Versioned,
};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument};

use crate::engine::{audit, ensure_can_view, required_text, visible, Engine};
use crate::notify::Notification;

impl Engine {
    async fn load_grant(&self, actor: &Actor, grant_id: &GrantId) -> Result<Grant> {
        let grant = self.store().grant(grant_id).await?;
        visible(actor, grant, |g| g.user_id, "Grant", grant_id)
    }

    #[instrument(skip(self))]
    pub async fn apply_for_grant(
        &self,
        actor: &Actor,
        amount: Decimal,
        currency: Option<Currency>,
        purpose: &str,
    ) -> Result<Grant> {
        let amount = validate_amount("amount", amount)?;
        let purpose = required_text("purpose", purpose)?;
        let grant = Grant::new(actor.user_id, amount, self.currency_or_default(currency), purpose);

        let mut unit = UnitOfWork::new();
        unit.insert_grant(grant.clone());
        self.commit(unit).await?;

        info!(grant_id = %grant.id, user_id = %grant.user_id, amount = %amount, "Grant application submitted");
        Ok(grant)
    }

    /// `PENDING -> APPROVED`, crediting the grant in the same unit
    #[instrument(skip(self))]
    pub async fn approve_grant(&self, actor: &Actor, grant_id: GrantId) -> Result<(Grant, Transaction)> {
        actor.require_admin()?;
        let owner = self.load_grant(actor, &grant_id).await?.user_id;
        let _guard = self.ledger.locks().lock(owner).await;

        let mut grant = self.load_grant(actor, &grant_id).await?;
        grant.ensure_pending()?;

        let mut unit = UnitOfWork::new();
        let posting = Posting::new(
            grant.user_id,
            TransactionType::Deposit,
            grant.amount,
            grant.currency.clone(),
            "Grant disbursement",
        )
        .with_metadata(metadata_keys::GRANT_ID, grant.id);
        let tx = self.ledger.stage_credit(&mut unit, posting).await?;

        let now = Utc::now();
        grant.status = GrantStatus::Approved;
        grant.decided_at = Some(now);
        grant.updated_at = now;
        unit.update_grant(grant.clone());
        unit.audit(audit(
            actor,
            "grant.approve",
            "grant",
            grant.id,
            json!({ "amount": grant.amount, "reference": tx.reference }),
        ));
        self.commit(unit).await?;
        grant.bump_version();

        info!(grant_id = %grant.id, user_id = %grant.user_id, amount = %grant.amount, reference = %tx.reference, "Grant approved");
        self.notify(Notification::push(
            grant.user_id,
            "Grant approved",
            format!("{} {} has been credited to your wallet.", grant.amount, grant.currency),
        ));
        Ok((grant, tx))
    }

    #[instrument(skip(self))]
    pub async fn reject_grant(&self, actor: &Actor, grant_id: GrantId, reason: &str) -> Result<Grant> {
        actor.require_admin()?;
        let reason = required_text("reason", reason)?;
        let mut grant = self.load_grant(actor, &grant_id).await?;
        grant.ensure_pending()?;

        let now = Utc::now();
        grant.status = GrantStatus::Rejected;
        grant.rejection_reason = Some(reason.clone());
        grant.decided_at = Some(now);
        grant.updated_at = now;

        let mut unit = UnitOfWork::new();
        unit.update_grant(grant.clone());
        unit.audit(audit(actor, "grant.reject", "grant", grant.id, json!({ "reason": reason })));
        self.commit(unit).await?;
        grant.bump_version();

        info!(grant_id = %grant.id, "Grant rejected");
        self.notify(Notification::push(
            grant.user_id,
            "Grant application declined",
            format!("Your grant application was declined: {}", reason),
        ));
        Ok(grant)
    }

    pub async fn grant(&self, actor: &Actor, grant_id: GrantId) -> Result<Grant> {
        self.load_grant(actor, &grant_id).await
    }

    pub async fn grants_for_user(&self, actor: &Actor, user_id: UserId) -> Result<Vec<Grant>> {
        ensure_can_view(actor, &user_id)?;
        self.store().grants_for_user(&user_id).await
    }
}
