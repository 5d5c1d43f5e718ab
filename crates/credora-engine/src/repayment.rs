//! Repayment Allocator

use chrono::{Duration, Utc};
use credora_ledger::{Posting, UnitOfWork};
use credora_types::{
    metadata_keys, validate_amount, Actor, CredoraError, LoanApplication, LoanId, LoanStatus,
    Result, Transaction, TransactionType, Versioned,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::engine::{owned, Engine};
use crate::notify::Notification;

/// Metadata `purpose` value on repayment debits
pub const LOAN_REPAYMENT: &str = "loan_repayment";

/// Outcome of a repayment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repayment {
    pub loan: LoanApplication,
    pub transaction: Transaction,
    /// Amount actually debited; capped at the outstanding principal
    pub applied: Decimal,
}

impl Engine {
    /// Apply a repayment against an `ACTIVE` loan.
    ///
    /// The wallet debit and the loan update commit together. Payments below
    /// the installment are refused unless less than one installment remains.
    #[instrument(skip(self))]
    pub async fn repay_loan(&self, actor: &Actor, loan_id: LoanId, amount: Decimal) -> Result<Repayment> {
        let amount = validate_amount("amount", amount)?;
        let loan = self.store().loan(&loan_id).await?;
        let owner = owned(actor, loan, |l| l.user_id, "Loan", loan_id)?.user_id;
        let _guard = self.ledger.locks().lock(owner).await;

        // Re-read under the wallet lock so concurrent repayments see each other.
        let loan = self.store().loan(&loan_id).await?;
        let mut loan = owned(actor, loan, |l| l.user_id, "Loan", loan_id)?;
        if loan.status != LoanStatus::Active {
            return Err(CredoraError::invalid_state(format!(
                "loan {} is {}, only ACTIVE loans accept repayments",
                loan.id, loan.status
            )));
        }
        let remaining = loan.remaining();
        if remaining <= Decimal::ZERO {
            return Err(CredoraError::invalid_state(format!(
                "loan {} is already fully repaid",
                loan.id
            )));
        }
        let minimum = loan.monthly_payment.unwrap_or(Decimal::ZERO);
        if amount < minimum && remaining >= minimum {
            return Err(CredoraError::invalid_state(format!(
                "minimum repayment is {}",
                minimum
            )));
        }
        let applied = amount.min(remaining);

        let mut unit = UnitOfWork::new();
        let posting = Posting::new(
            loan.user_id,
            TransactionType::Withdrawal,
            applied,
            loan.currency.clone(),
            "Loan repayment",
        )
        .with_metadata(metadata_keys::LOAN_ID, loan.id)
        .with_metadata(metadata_keys::PURPOSE, LOAN_REPAYMENT);
        let tx = self.ledger.stage_debit(&mut unit, posting).await?;

        loan.total_repaid += applied;
        if loan.total_repaid >= loan.amount {
            loan.transition(LoanStatus::Completed)?;
            loan.next_payment_due = None;
        } else {
            let interval = Duration::days(self.config.repayment_interval_days);
            let base = loan.next_payment_due.unwrap_or_else(Utc::now);
            loan.next_payment_due = Some(base + interval);
            loan.updated_at = Utc::now();
        }
        unit.update_loan(loan.clone());
        self.commit(unit).await?;
        loan.bump_version();

        info!(
            loan_id = %loan.id,
            user_id = %loan.user_id,
            amount = %applied,
            reference = %tx.reference,
            status = %loan.status,
            "Loan repayment applied"
        );
        let message = if loan.status == LoanStatus::Completed {
            "Your loan is fully repaid.".to_string()
        } else {
            format!("Repayment of {} {} received.", applied, loan.currency)
        };
        self.notify(Notification::push(loan.user_id, "Loan repayment", message));

        Ok(Repayment {
            loan,
            transaction: tx,
            applied,
        })
    }
}
