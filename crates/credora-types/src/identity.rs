//! Identity types for Credora
//!
//! All identity types are strongly typed wrappers around UUIDs to prevent
//! accidental mixing of different ID types.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Macro to generate ID types with common implementations
macro_rules! define_id_type {
    ($name:ident, $prefix:literal, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random ID
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create from an existing UUID
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from a string (with or without prefix)
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                let s = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ok(Self(Uuid::parse_str(s)?))
            }

            /// Get the inner UUID
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Convert to prefixed string
            pub fn to_prefixed_string(&self) -> String {
                format!("{}_{}", $prefix, self.0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}_{}", $prefix, self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }
    };
}

// Parties
define_id_type!(UserId, "usr", "Unique identifier for a platform user (and their wallet)");

// Ledger records
define_id_type!(TransactionId, "txn", "Unique identifier for an immutable transaction record");
define_id_type!(TransferId, "trf", "Unique identifier for a user-to-user transfer relation");
define_id_type!(AuditId, "audit", "Unique identifier for an audit record");

// Lending
define_id_type!(LoanId, "loan", "Unique identifier for a loan application");
define_id_type!(GrantId, "grant", "Unique identifier for a grant application");

// Funding
define_id_type!(DepositId, "dep", "Unique identifier for a deposit");
define_id_type!(WithdrawalId, "wdr", "Unique identifier for a withdrawal request");
define_id_type!(PaymentId, "pay", "Unique identifier for an external gateway payment");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_round_trip() {
        let id = LoanId::new();
        let prefixed = id.to_prefixed_string();
        assert!(prefixed.starts_with("loan_"));
        assert_eq!(LoanId::parse(&prefixed).unwrap(), id);
        assert_eq!(LoanId::parse(&id.0.to_string()).unwrap(), id);
    }

    #[test]
    fn test_serializes_as_bare_uuid() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.0));
    }

    #[test]
    fn test_ids_are_ordered() {
        let a = UserId::from_uuid(Uuid::from_u128(1));
        let b = UserId::from_uuid(Uuid::from_u128(2));
        assert!(a < b);
    }
}
