//! Database error types

use credora_types::CredoraError;
use thiserror::Error;

/// Database operation errors
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),

    /// A stored value does not map back onto the domain type
    #[error("Decode error: {column} - {reason}")]
    Decode { column: &'static str, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl DbError {
    pub fn decode(column: &'static str, reason: impl ToString) -> Self {
        Self::Decode {
            column,
            reason: reason.to_string(),
        }
    }

    /// Unique-key violation reported by PostgreSQL
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Query(sqlx::Error::Database(e)) => e.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(e: serde_json::Error) -> Self {
        DbError::Serialization(e.to_string())
    }
}

impl From<DbError> for CredoraError {
    fn from(e: DbError) -> Self {
        if e.is_unique_violation() {
            CredoraError::conflict(e.to_string())
        } else {
            CredoraError::storage(e.to_string())
        }
    }
}

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_unique_errors_become_storage() {
        let err: CredoraError = DbError::Connection("refused".to_string()).into();
        assert_eq!(err.error_code(), "STORAGE_ERROR");
        assert!(err.is_retriable());

        let err: CredoraError = DbError::Query(sqlx::Error::RowNotFound).into();
        assert!(matches!(err, CredoraError::Storage { .. }));
    }

    #[test]
    fn test_decode_message_names_column() {
        let err = DbError::decode("currency", "'US' is not a currency");
        assert_eq!(err.to_string(), "Decode error: currency - 'US' is not a currency");
    }
}
