//! Audit records written alongside admin decisions and disbursements

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AuditId, UserId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: AuditId,
    pub actor_id: UserId,
    /// Dotted action name, e.g. `loan.disburse`
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        actor_id: UserId,
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl ToString,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: AuditId::new(),
            actor_id,
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.to_string(),
            details,
            created_at: Utc::now(),
        }
    }
}
