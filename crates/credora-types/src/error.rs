//! Error types for Credora
//!
//! Every failure surfaces unchanged to the request boundary. Persistence
//! failures inside an atomic unit abort the whole unit.

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for Credora operations
pub type Result<T> = std::result::Result<T, CredoraError>;

/// Credora error types
#[derive(Debug, Clone, Error)]
pub enum CredoraError {
    /// Entity missing, or not visible to the caller
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// Operation attempted from a disallowed lifecycle state
    #[error("Invalid state: {reason}")]
    InvalidState { reason: String },

    /// Debit exceeds the wallet balance
    #[error("Insufficient funds in wallet {user_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        user_id: String,
        requested: Decimal,
        available: Decimal,
    },

    /// Malformed amount, currency, duration or other input
    #[error("Invalid input: {field} - {reason}")]
    Validation { field: String, reason: String },

    /// Duplicate, already-processed or concurrently modified record
    #[error("Conflict: {reason}")]
    Conflict { reason: String },

    /// Caller lacks the capability for the action
    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    /// Persistence failure; the unit of work was rolled back
    #[error("Storage error: {message}")]
    Storage { message: String },
}

impl CredoraError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn insufficient_funds(user_id: impl ToString, requested: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            user_id: user_id.to_string(),
            requested,
            available,
        }
    }

    /// Create a validation error
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        Self::Conflict {
            reason: reason.into(),
        }
    }

    /// Create an unauthorized error
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Check if this is a retriable error
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Storage { .. } | Self::Conflict { .. })
    }

    /// Get an error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::InvalidState { .. } => "INVALID_STATE",
            Self::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Conflict { .. } => "CONFLICT",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::Storage { .. } => "STORAGE_ERROR",
        }
    }
}
