//! Grants: one-shot disbursements without a repayment schedule

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CredoraError, Currency, GrantId, Result, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GrantStatus {
    Pending,
    Approved,
    Rejected,
}

impl GrantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for GrantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantStatus {
    type Err = CredoraError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "APPROVED" => Ok(Self::Approved),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(CredoraError::validation(
                "status",
                format!("unknown grant status '{}'", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub id: GrantId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: Currency,
    pub purpose: String,
    pub status: GrantStatus,
    pub rejection_reason: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Grant {
    pub fn new(user_id: UserId, amount: Decimal, currency: Currency, purpose: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: GrantId::new(),
            user_id,
            amount,
            currency,
            purpose: purpose.into(),
            status: GrantStatus::Pending,
            rejection_reason: None,
            decided_at: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn ensure_pending(&self) -> Result<()> {
        if self.status == GrantStatus::Pending {
            Ok(())
        } else {
            Err(CredoraError::invalid_state(format!(
                "grant {} is {}, expected PENDING",
                self.id, self.status
            )))
        }
    }
}
