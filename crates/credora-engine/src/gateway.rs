//! Gateway deposits and webhook-driven confirmation
//!
//! The `Payment` record is the idempotency anchor: only a `PENDING` payment
//! can be confirmed or failed, and the credit it produces uses the payment
//! reference as its transaction reference. A redelivered webhook therefore
//! gets `Conflict` and never credits twice.

use chrono::Utc;
use credora_ledger::{new_reference, Posting, UnitOfWork};
use credora_types::{
    metadata_keys, validate_amount, Actor, CredoraError, Currency, Deposit, DepositMethod,
    DepositStatus, Payment, PaymentId, PaymentStatus, Result, Transaction, TransactionType,
    Versioned,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::engine::Engine;
use crate::notify::Notification;

pub const CHARGE_SUCCESS: &str = "charge.success";
pub const CHARGE_FAILED: &str = "charge.failed";

/// Webhook payload: `{ "event": "...", "data": { "reference": "...", ... } }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub data: WebhookData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookData {
    pub reference: String,
    /// Gateway-specific fields we do not interpret
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A freshly initiated gateway deposit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayCheckout {
    pub deposit: Deposit,
    pub payment: Payment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentConfirmation {
    pub payment: Payment,
    pub deposit: Option<Deposit>,
    pub transaction: Transaction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Confirmed(PaymentConfirmation),
    Failed(Payment),
    Ignored { event: String },
}

impl WebhookOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Confirmed(_) => "confirmed",
            Self::Failed(_) => "failed",
            Self::Ignored { .. } => "ignored",
        }
    }
}

impl Engine {
    async fn pending_payment(&self, reference: &str) -> Result<Payment> {
        let payment = self
            .store()
            .payment_by_reference(reference)
            .await?
            .ok_or_else(|| CredoraError::not_found("Payment", reference))?;
        payment.ensure_pending()?;
        Ok(payment)
    }

    /// Open a gateway deposit and the payment the gateway will confirm
    #[instrument(skip(self))]
    pub async fn initiate_gateway_deposit(
        &self,
        actor: &Actor,
        amount: Decimal,
        currency: Option<Currency>,
    ) -> Result<GatewayCheckout> {
        let amount = validate_amount("amount", amount)?;
        let currency = self.currency_or_default(currency);

        let mut deposit = Deposit::new(actor.user_id, amount, currency.clone(), DepositMethod::Gateway);
        let now = Utc::now();
        let payment = Payment {
            id: PaymentId::new(),
            reference: new_reference("PAY"),
            user_id: actor.user_id,
            deposit_id: deposit.id,
            amount,
            currency,
            status: PaymentStatus::Pending,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        deposit.payment_reference = Some(payment.reference.clone());

        let mut unit = UnitOfWork::new();
        unit.insert_deposit(deposit.clone());
        unit.insert_payment(payment.clone());
        self.commit(unit).await?;

        info!(
            deposit_id = %deposit.id,
            user_id = %deposit.user_id,
            amount = %amount,
            reference = %payment.reference,
            "Gateway deposit initiated"
        );
        Ok(GatewayCheckout { deposit, payment })
    }

    /// Confirm a gateway payment exactly once.
    ///
    /// The payment flip, the wallet credit and the deposit completion commit
    /// together. A payment that is no longer `PENDING` is a `Conflict`; a
    /// deposit that is already decided is `InvalidState`.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, reference: &str) -> Result<PaymentConfirmation> {
        let owner = self.pending_payment(reference).await?.user_id;
        let _guard = self.ledger.locks().lock(owner).await;

        let mut payment = self.pending_payment(reference).await?;
        let mut deposit = self.store().deposit(&payment.deposit_id).await?;
        if let Some(deposit) = &deposit {
            deposit.ensure_decidable()?;
        }

        let mut unit = UnitOfWork::new();
        let posting = Posting::new(
            payment.user_id,
            TransactionType::PaymentGatewayDeposit,
            payment.amount,
            payment.currency.clone(),
            "Gateway deposit",
        )
        .with_reference(payment.reference.clone())
        .with_metadata(metadata_keys::PAYMENT_REFERENCE, &payment.reference)
        .with_metadata(metadata_keys::DEPOSIT_ID, payment.deposit_id);
        let tx = self.ledger.stage_credit(&mut unit, posting).await?;

        payment.status = PaymentStatus::Success;
        payment.updated_at = Utc::now();
        unit.update_payment(payment.clone());
        if let Some(deposit) = deposit.as_mut() {
            deposit.status = DepositStatus::Completed;
            deposit.transaction_id = Some(tx.id);
            deposit.updated_at = Utc::now();
            unit.update_deposit(deposit.clone());
        }
        self.commit(unit).await?;
        payment.bump_version();
        if let Some(deposit) = deposit.as_mut() {
            deposit.bump_version();
        }

        info!(
            user_id = %payment.user_id,
            amount = %payment.amount,
            reference = %payment.reference,
            "Gateway payment confirmed"
        );
        self.notify(Notification::push(
            payment.user_id,
            "Deposit successful",
            format!("{} {} has been added to your wallet.", payment.amount, payment.currency),
        ));
        Ok(PaymentConfirmation {
            payment,
            deposit,
            transaction: tx,
        })
    }

    /// Mark a gateway payment and its deposit as failed
    #[instrument(skip(self))]
    pub async fn fail_payment(&self, reference: &str) -> Result<Payment> {
        let owner = self.pending_payment(reference).await?.user_id;
        let _guard = self.ledger.locks().lock(owner).await;

        let mut payment = self.pending_payment(reference).await?;
        let mut deposit = self.store().deposit(&payment.deposit_id).await?;

        let mut unit = UnitOfWork::new();
        payment.status = PaymentStatus::Failed;
        payment.updated_at = Utc::now();
        unit.update_payment(payment.clone());
        if let Some(deposit) = deposit.as_mut().filter(|d| d.status.is_decidable()) {
            deposit.status = DepositStatus::Failed;
            deposit.failure_reason = Some("payment failed at gateway".to_string());
            deposit.updated_at = Utc::now();
            unit.update_deposit(deposit.clone());
        }
        self.commit(unit).await?;
        payment.bump_version();

        info!(reference = %payment.reference, user_id = %payment.user_id, "Gateway payment failed");
        self.notify(Notification::push(
            payment.user_id,
            "Deposit failed",
            "Your payment could not be completed.",
        ));
        Ok(payment)
    }

    /// Dispatch a verified webhook event
    pub async fn handle_webhook_event(&self, event: WebhookEvent) -> Result<WebhookOutcome> {
        let result = match event.event.as_str() {
            CHARGE_SUCCESS => self
                .confirm_payment(&event.data.reference)
                .await
                .map(WebhookOutcome::Confirmed),
            CHARGE_FAILED => self
                .fail_payment(&event.data.reference)
                .await
                .map(WebhookOutcome::Failed),
            other => Ok(WebhookOutcome::Ignored {
                event: other.to_string(),
            }),
        };

        let outcome = match &result {
            Ok(outcome) => outcome.label(),
            Err(CredoraError::Conflict { .. }) => "duplicate",
            Err(_) => "error",
        };
        metrics::counter!("credora_webhook_events_total", "outcome" => outcome).increment(1);
        if let Err(e) = &result {
            warn!(event = %event.event, reference = %event.data.reference, error = %e, "Webhook event not applied");
        }
        result
    }
}
