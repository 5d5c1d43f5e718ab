//! Loan applications and the negotiated offer sub-state
//!
//! ```text
//! PENDING ─┬─> FEE_PENDING ──> FEE_PAID ──> APPROVED ──> ACTIVE ──> COMPLETED
//!          ├─────────────────────────────> APPROVED
//!          └─> REJECTED
//! ```
//!
//! Transitions only move forward along this graph. The offer sub-state lives
//! on the application only while it is `PENDING`; leaving `PENDING` folds an
//! accepted offer into `amount` and drops the offer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CredoraError, Currency, LoanId, Metadata, Result, UserId};

/// Lifecycle state of a loan application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoanStatus {
    Pending,
    FeePending,
    FeePaid,
    Approved,
    Rejected,
    Active,
    Completed,
}

impl LoanStatus {
    /// Whether `next` is a single legal step from `self`
    pub fn can_transition_to(&self, next: LoanStatus) -> bool {
        use LoanStatus::*;
        matches!(
            (self, next),
            (Pending, FeePending)
                | (Pending, Approved)
                | (Pending, Rejected)
                | (FeePending, FeePaid)
                | (FeePaid, Approved)
                | (Approved, Active)
                | (Active, Completed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Completed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::FeePending => "FEE_PENDING",
            Self::FeePaid => "FEE_PAID",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoanStatus {
    type Err = CredoraError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "FEE_PENDING" => Ok(Self::FeePending),
            "FEE_PAID" => Ok(Self::FeePaid),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            other => Err(CredoraError::validation(
                "status",
                format!("unknown loan status '{}'", other),
            )),
        }
    }
}

/// User's answer to an admin offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OfferResponse {
    Accept,
    Decline,
}

/// Admin counter-offer on a pending application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanOffer {
    pub proposed_amount: Decimal,
    pub note: Option<String>,
    /// `None` while awaiting the user's answer
    pub response: Option<OfferResponse>,
    pub proposed_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl LoanOffer {
    pub fn new(proposed_amount: Decimal, note: Option<String>) -> Self {
        Self {
            proposed_amount,
            note,
            response: None,
            proposed_at: Utc::now(),
            responded_at: None,
        }
    }

    pub fn is_awaiting_response(&self) -> bool {
        self.response.is_none()
    }

    pub fn is_accepted(&self) -> bool {
        self.response == Some(OfferResponse::Accept)
    }

    pub fn is_declined(&self) -> bool {
        self.response == Some(OfferResponse::Decline)
    }
}

/// Processing fee requested before approval, with the user's proof of payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingFee {
    pub amount: Decimal,
    /// Where the user should send the fee (bank name, account number, ...)
    #[serde(default)]
    pub destination: Metadata,
    pub description: String,
    pub proof_url: Option<String>,
    pub proof_submitted_at: Option<DateTime<Utc>>,
    pub requested_at: DateTime<Utc>,
}

impl ProcessingFee {
    pub fn new(amount: Decimal, destination: Metadata, description: impl Into<String>) -> Self {
        Self {
            amount,
            destination,
            description: description.into(),
            proof_url: None,
            proof_submitted_at: None,
            requested_at: Utc::now(),
        }
    }
}

/// A loan application and, once active, the running loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: LoanId,
    pub user_id: UserId,
    /// Principal; may be revised by an accepted offer
    pub amount: Decimal,
    pub currency: Currency,
    pub duration_months: u32,
    pub purpose: String,
    pub status: LoanStatus,
    /// Annual rate in percent, fixed at approval
    pub interest_rate: Option<Decimal>,
    pub monthly_payment: Option<Decimal>,
    pub total_repaid: Decimal,
    pub next_payment_due: Option<DateTime<Utc>>,
    pub processing_fee: Option<ProcessingFee>,
    pub offer: Option<LoanOffer>,
    pub rejection_reason: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub disbursed_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanApplication {
    pub fn new(
        user_id: UserId,
        amount: Decimal,
        currency: Currency,
        duration_months: u32,
        purpose: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: LoanId::new(),
            user_id,
            amount,
            currency,
            duration_months,
            purpose: purpose.into(),
            status: LoanStatus::Pending,
            interest_rate: None,
            monthly_payment: None,
            total_repaid: Decimal::ZERO,
            next_payment_due: None,
            processing_fee: None,
            offer: None,
            rejection_reason: None,
            approved_at: None,
            disbursed_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Outstanding principal
    pub fn remaining(&self) -> Decimal {
        self.amount - self.total_repaid
    }

    /// Only an `ACTIVE` loan is protected from deletion by its owner
    pub fn is_deletable(&self) -> bool {
        self.status != LoanStatus::Active
    }

    /// Fails with `InvalidState` unless the loan is currently in `expected`
    pub fn ensure_status(&self, expected: LoanStatus) -> Result<()> {
        if self.status == expected {
            Ok(())
        } else {
            Err(CredoraError::invalid_state(format!(
                "loan {} is {}, expected {}",
                self.id, self.status, expected
            )))
        }
    }

    /// Move to `next` along the lifecycle graph.
    ///
    /// Leaving `PENDING` applies an accepted offer to `amount` and clears the
    /// offer sub-state.
    pub fn transition(&mut self, next: LoanStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(CredoraError::invalid_state(format!(
                "loan {} cannot move from {} to {}",
                self.id, self.status, next
            )));
        }
        if self.status == LoanStatus::Pending {
            if let Some(offer) = self.offer.take() {
                if offer.is_accepted() {
                    self.amount = offer.proposed_amount;
                }
            }
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn application() -> LoanApplication {
        LoanApplication::new(UserId::new(), dec!(12000), Currency::ngn(), 12, "Working capital")
    }

    #[test]
    fn test_transition_graph() {
        use LoanStatus::*;
        assert!(Pending.can_transition_to(FeePending));
        assert!(Pending.can_transition_to(Approved));
        assert!(FeePaid.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Active));

        assert!(!FeePending.can_transition_to(Active));
        assert!(!FeePending.can_transition_to(Approved));
        assert!(!Active.can_transition_to(Pending));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Completed.can_transition_to(Active));
    }

    #[test]
    fn test_leaving_pending_applies_accepted_offer() {
        let mut loan = application();
        let mut offer = LoanOffer::new(dec!(10000), Some("Reduced".to_string()));
        offer.response = Some(OfferResponse::Accept);
        loan.offer = Some(offer);

        loan.transition(LoanStatus::Approved).unwrap();
        assert_eq!(loan.amount, dec!(10000));
        assert!(loan.offer.is_none());
    }

    #[test]
    fn test_declined_offer_keeps_requested_amount() {
        let mut loan = application();
        let mut offer = LoanOffer::new(dec!(8000), None);
        offer.response = Some(OfferResponse::Decline);
        loan.offer = Some(offer);

        loan.transition(LoanStatus::FeePending).unwrap();
        assert_eq!(loan.amount, dec!(12000));
        assert!(loan.offer.is_none());
    }

    #[test]
    fn test_illegal_transition_is_invalid_state() {
        let mut loan = application();
        let err = loan.transition(LoanStatus::Active).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
        assert_eq!(loan.status, LoanStatus::Pending);
    }

    #[test]
    fn test_status_strings() {
        assert_eq!("FEE_PAID".parse::<LoanStatus>().unwrap(), LoanStatus::FeePaid);
        assert_eq!(LoanStatus::FeePending.to_string(), "FEE_PENDING");
        assert!("OPEN".parse::<LoanStatus>().is_err());
    }
}
