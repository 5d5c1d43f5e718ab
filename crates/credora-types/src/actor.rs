//! Caller identity context
//!
//! Every orchestration call receives the authenticated caller explicitly.
//! Role resolution itself happens upstream (session/JWT layer); the engine
//! only checks capabilities against the role it is handed.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{CredoraError, Result, UserId};

/// Roles recognised by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Account holder acting on their own resources
    Customer,
    /// Back-office operator allowed to decide applications and move funds
    Admin,
}

impl Default for Role {
    fn default() -> Self {
        Self::Customer
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Authenticated caller of an engine operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn customer(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Customer,
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self {
            user_id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Fails with `Unauthorized` unless the caller holds the admin role
    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(CredoraError::unauthorized(format!(
                "{} requires the admin role",
                self.user_id
            )))
        }
    }

    /// Whether the caller may read a resource owned by `owner`
    pub fn can_view(&self, owner: &UserId) -> bool {
        self.is_admin() || &self.user_id == owner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_admin() {
        let user = UserId::new();
        assert!(Actor::admin(user).require_admin().is_ok());

        let err = Actor::customer(user).require_admin().unwrap_err();
        assert_eq!(err.error_code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_can_view() {
        let owner = UserId::new();
        let other = UserId::new();
        assert!(Actor::customer(owner).can_view(&owner));
        assert!(!Actor::customer(other).can_view(&owner));
        assert!(Actor::admin(other).can_view(&owner));
    }
}
