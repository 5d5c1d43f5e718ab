//! Loan Lifecycle State Machine
//!
//! Application, offer negotiation, fee gating, approval, rejection,
//! disbursement and deletion. Repayment lives in `repayment.rs`.

use chrono::{Duration, Utc};
use credora_ledger::{Posting, UnitOfWork};
use credora_types::{
    metadata_keys, validate_amount, Actor, AuditRecord, CredoraError, Currency, LoanApplication,
    LoanId, LoanOffer, LoanStatus, Metadata, OfferResponse, ProcessingFee, Result, Transaction,
    TransactionType, UserId, Versioned,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::amortization::{self, ScheduleEntry};
use crate::engine::{audit, ensure_can_view, owned, required_text, visible, Engine};
use crate::notify::Notification;

/// A customer's loan request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRequest {
    pub amount: Decimal,
    pub currency: Option<Currency>,
    pub duration_months: u32,
    pub purpose: String,
}

/// Admin request for a processing fee before approval
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeRequest {
    pub amount: Decimal,
    /// Payment destination shown to the applicant
    #[serde(default)]
    pub destination: Metadata,
    pub description: String,
}

impl Engine {
    async fn load_loan(&self, actor: &Actor, loan_id: &LoanId) -> Result<LoanApplication> {
        let loan = self.store().loan(loan_id).await?;
        visible(actor, loan, |l| l.user_id, "Loan", loan_id)
    }

    async fn load_own_loan(&self, actor: &Actor, loan_id: &LoanId) -> Result<LoanApplication> {
        let loan = self.store().loan(loan_id).await?;
        owned(actor, loan, |l| l.user_id, "Loan", loan_id)
    }

    /// Commit a single loan update and return the stored version
    async fn save_loan(&self, mut loan: LoanApplication, record: Option<AuditRecord>) -> Result<LoanApplication> {
        let mut unit = UnitOfWork::new();
        unit.update_loan(loan.clone());
        if let Some(record) = record {
            unit.audit(record);
        }
        self.commit(unit).await?;
        loan.bump_version();
        Ok(loan)
    }

    #[instrument(skip(self))]
    pub async fn apply_for_loan(&self, actor: &Actor, request: LoanRequest) -> Result<LoanApplication> {
        let amount = validate_amount("amount", request.amount)?;
        if amount < self.config.min_loan_amount || amount > self.config.max_loan_amount {
            return Err(CredoraError::validation(
                "amount",
                format!(
                    "must be between {} and {}",
                    self.config.min_loan_amount, self.config.max_loan_amount
                ),
            ));
        }
        if request.duration_months < self.config.min_duration_months
            || request.duration_months > self.config.max_duration_months
        {
            return Err(CredoraError::validation(
                "duration_months",
                format!(
                    "must be between {} and {} months",
                    self.config.min_duration_months, self.config.max_duration_months
                ),
            ));
        }
        let purpose = required_text("purpose", &request.purpose)?;
        let currency = self.currency_or_default(request.currency);

        let loan = LoanApplication::new(actor.user_id, amount, currency, request.duration_months, purpose);
        let mut unit = UnitOfWork::new();
        unit.insert_loan(loan.clone());
        self.commit(unit).await?;

        info!(loan_id = %loan.id, user_id = %loan.user_id, amount = %loan.amount, "Loan application submitted");
        self.notify(Notification::push(
            loan.user_id,
            "Loan application received",
            format!("Your application for {} {} is under review.", loan.amount, loan.currency),
        ));
        Ok(loan)
    }

    /// Attach an admin counter-offer to a pending application.
    ///
    /// Allowed when there is no offer yet or the previous one was declined.
    #[instrument(skip(self, note))]
    pub async fn propose_offer(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        proposed_amount: Decimal,
        note: Option<String>,
    ) -> Result<LoanApplication> {
        actor.require_admin()?;
        let proposed_amount = validate_amount("proposed_amount", proposed_amount)?;
        let mut loan = self.load_loan(actor, &loan_id).await?;
        loan.ensure_status(LoanStatus::Pending)?;
        if let Some(existing) = &loan.offer {
            if !existing.is_declined() {
                return Err(CredoraError::invalid_state(format!(
                    "loan {} already has an outstanding offer",
                    loan.id
                )));
            }
        }

        let note = note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        loan.offer = Some(LoanOffer::new(proposed_amount, note.clone()));
        loan.updated_at = Utc::now();
        let record = audit(
            actor,
            "loan.offer.propose",
            "loan",
            loan.id,
            json!({ "proposed_amount": proposed_amount, "note": note }),
        );
        let loan = self.save_loan(loan, Some(record)).await?;

        info!(loan_id = %loan.id, proposed_amount = %proposed_amount, "Loan offer proposed");
        self.notify(Notification::push(
            loan.user_id,
            "New loan offer",
            format!("We can offer {} {} for your application.", proposed_amount, loan.currency),
        ));
        Ok(loan)
    }

    /// Applicant accepts or declines the outstanding offer
    #[instrument(skip(self))]
    pub async fn respond_to_offer(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        response: OfferResponse,
    ) -> Result<LoanApplication> {
        let mut loan = self.load_own_loan(actor, &loan_id).await?;
        loan.ensure_status(LoanStatus::Pending)?;
        let offer = match loan.offer.as_mut() {
            Some(offer) if offer.is_awaiting_response() => offer,
            _ => {
                return Err(CredoraError::invalid_state(format!(
                    "loan {} has no offer awaiting a response",
                    loan_id
                )))
            }
        };
        offer.response = Some(response);
        offer.responded_at = Some(Utc::now());
        loan.updated_at = Utc::now();

        let loan = self.save_loan(loan, None).await?;
        info!(loan_id = %loan.id, response = ?response, "Loan offer answered");
        Ok(loan)
    }

    /// `PENDING -> FEE_PENDING`
    #[instrument(skip(self, request))]
    pub async fn request_processing_fee(
        &self,
        actor: &Actor,
        loan_id: LoanId,
        request: FeeRequest,
    ) -> Result<LoanApplication> {
        actor.require_admin()?;
        let fee = validate_amount("fee_amount", request.amount)?;
        let description = required_text("description", &request.description)?;
        let mut loan = self.load_loan(actor, &loan_id).await?;
        loan.transition(LoanStatus::FeePending)?;
        loan.processing_fee = Some(ProcessingFee::new(fee, request.destination, description));

        let record = audit(actor, "loan.fee.request", "loan", loan.id, json!({ "fee": fee }));
        let loan = self.save_loan(loan, Some(record)).await?;

        info!(loan_id = %loan.id, fee = %fee, "Processing fee requested");
        self.notify(Notification::email(
            loan.user_id,
            "Processing fee required",
            format!("Please pay a processing fee of {} {} to continue.", fee, loan.currency),
        ));
        Ok(loan)
    }

    /// `FEE_PENDING -> FEE_PAID` with the uploaded proof URL
    #[instrument(skip(self))]
    pub async fn submit_fee_proof(&self, actor: &Actor, loan_id: LoanId, proof_url: &str) -> Result<LoanApplication> {
        let proof_url = required_text("proof_url", proof_url)?;
        let mut loan = self.load_own_loan(actor, &loan_id).await?;
        if loan.processing_fee.is_none() {
            return Err(CredoraError::invalid_state(format!(
                "loan {} has no processing fee",
                loan_id
            )));
        }
        loan.transition(LoanStatus::FeePaid)?;
        if let Some(fee) = loan.processing_fee.as_mut() {
            fee.proof_url = Some(proof_url);
            fee.proof_submitted_at = Some(Utc::now());
        }

        let loan = self.save_loan(loan, None).await?;
        info!(loan_id = %loan.id, "Processing fee proof submitted");
        Ok(loan)
    }

    /// Move to `APPROVED` and fix rate, installment and first due date
    fn approve_in_place(&self, loan: &mut LoanApplication) -> Result<()> {
        loan.transition(LoanStatus::Approved)?;
        let rate = self.config.annual_interest_rate;
        let payment = amortization::monthly_payment(loan.amount, rate, loan.duration_months)?;
        let now = Utc::now();
        loan.interest_rate = Some(rate);
        loan.monthly_payment = Some(amortization::round_payment(payment));
        loan.next_payment_due = Some(now + Duration::days(self.config.repayment_interval_days));
        loan.approved_at = Some(now);
        Ok(())
    }

    async fn finish_approval(&self, actor: &Actor, loan: LoanApplication, action: &str) -> Result<LoanApplication> {
        let record = audit(
            actor,
            action,
            "loan",
            loan.id,
            json!({
                "amount": loan.amount,
                "interest_rate": loan.interest_rate,
                "monthly_payment": loan.monthly_payment,
            }),
        );
        let loan = self.save_loan(loan, Some(record)).await?;

        info!(
            loan_id = %loan.id,
            user_id = %loan.user_id,
            amount = %loan.amount,
            monthly_payment = ?loan.monthly_payment,
            "Loan approved"
        );
        self.notify(Notification::push(
            loan.user_id,
            "Loan approved",
            format!("Your loan of {} {} has been approved.", loan.amount, loan.currency),
        ));
        Ok(loan)
    }

    /// `FEE_PAID -> APPROVED`
    #[instrument(skip(self))]
    pub async fn verify_fee_payment(&self, actor: &Actor, loan_id: LoanId) -> Result<LoanApplication> {
        actor.require_admin()?;
        let mut loan = self.load_loan(actor, &loan_id).await?;
        loan.ensure_status(LoanStatus::FeePaid)?;
        self.approve_in_place(&mut loan)?;
        self.finish_approval(actor, loan, "loan.fee.verify").await
    }

    /// Direct approval, `PENDING -> APPROVED`.
    ///
    /// An accepted offer's amount replaces the requested amount before the
    /// installment is computed.
    #[instrument(skip(self))]
    pub async fn approve_loan(&self, actor: &Actor, loan_id: LoanId) -> Result<LoanApplication> {
        actor.require_admin()?;
        let mut loan = self.load_loan(actor, &loan_id).await?;
        loan.ensure_status(LoanStatus::Pending)?;
        self.approve_in_place(&mut loan)?;
        self.finish_approval(actor, loan, "loan.approve").await
    }

    /// `PENDING -> REJECTED`; no ledger effect
    #[instrument(skip(self))]
    pub async fn reject_loan(&self, actor: &Actor, loan_id: LoanId, reason: &str) -> Result<LoanApplication> {
        actor.require_admin()?;
        let reason = required_text("reason", reason)?;
        let mut loan = self.load_loan(actor, &loan_id).await?;
        loan.transition(LoanStatus::Rejected)?;
        loan.rejection_reason = Some(reason.clone());

        let record = audit(actor, "loan.reject", "loan", loan.id, json!({ "reason": reason }));
        let loan = self.save_loan(loan, Some(record)).await?;

        info!(loan_id = %loan.id, "Loan rejected");
        self.notify(Notification::push(
            loan.user_id,
            "Loan application declined",
            format!("Your loan application was declined: {}", reason),
        ));
        Ok(loan)
    }

    /// `APPROVED -> ACTIVE`: credit the principal, flip the status and write
    /// the audit record in one unit.
    #[instrument(skip(self))]
    pub async fn disburse_loan(&self, actor: &Actor, loan_id: LoanId) -> Result<(LoanApplication, Transaction)> {
        actor.require_admin()?;
        let owner = self.load_loan(actor, &loan_id).await?.user_id;
        let _guard = self.ledger.locks().lock(owner).await;

        let mut loan = self.load_loan(actor, &loan_id).await?;
        loan.transition(LoanStatus::Active)?;
        loan.disbursed_at = Some(Utc::now());

        let mut unit = UnitOfWork::new();
        let posting = Posting::new(
            loan.user_id,
            TransactionType::Deposit,
            loan.amount,
            loan.currency.clone(),
            "Loan disbursement",
        )
        .with_metadata(metadata_keys::LOAN_ID, loan.id);
        let tx = self.ledger.stage_credit(&mut unit, posting).await?;
        unit.update_loan(loan.clone());
        unit.audit(audit(
            actor,
            "loan.disburse",
            "loan",
            loan.id,
            json!({ "amount": loan.amount, "reference": tx.reference }),
        ));
        self.commit(unit).await?;
        loan.bump_version();

        info!(
            loan_id = %loan.id,
            user_id = %loan.user_id,
            amount = %loan.amount,
            reference = %tx.reference,
            "Loan disbursed"
        );
        self.notify(Notification::push(
            loan.user_id,
            "Loan disbursed",
            format!("{} {} has been credited to your wallet.", loan.amount, loan.currency),
        ));
        Ok((loan, tx))
    }

    /// Owner removes an application that is not `ACTIVE`
    #[instrument(skip(self))]
    pub async fn delete_loan(&self, actor: &Actor, loan_id: LoanId) -> Result<()> {
        let loan = self.load_own_loan(actor, &loan_id).await?;
        if !loan.is_deletable() {
            return Err(CredoraError::invalid_state(format!(
                "loan {} is ACTIVE and cannot be deleted",
                loan_id
            )));
        }
        let mut unit = UnitOfWork::new();
        unit.delete_loan(loan);
        self.commit(unit).await?;
        info!(loan_id = %loan_id, "Loan application deleted");
        Ok(())
    }

    pub async fn loan(&self, actor: &Actor, loan_id: LoanId) -> Result<LoanApplication> {
        self.load_loan(actor, &loan_id).await
    }

    pub async fn loans_for_user(&self, actor: &Actor, user_id: UserId) -> Result<Vec<LoanApplication>> {
        ensure_can_view(actor, &user_id)?;
        self.store().loans_for_user(&user_id).await
    }

    pub async fn all_loans(&self, actor: &Actor) -> Result<Vec<LoanApplication>> {
        actor.require_admin()?;
        self.store().all_loans().await
    }

    /// Amortization table of an approved (or later) loan
    pub async fn repayment_schedule(&self, actor: &Actor, loan_id: LoanId) -> Result<Vec<ScheduleEntry>> {
        let loan = self.load_loan(actor, &loan_id).await?;
        let (rate, approved_at) = match (loan.interest_rate, loan.approved_at) {
            (Some(rate), Some(approved_at)) => (rate, approved_at),
            _ => {
                return Err(CredoraError::invalid_state(format!(
                    "loan {} is {} and has no schedule yet",
                    loan.id, loan.status
                )))
            }
        };
        let interval = self.config.repayment_interval_days;
        amortization::schedule(
            loan.amount,
            rate,
            loan.duration_months,
            approved_at + Duration::days(interval),
            interval,
        )
    }
}
