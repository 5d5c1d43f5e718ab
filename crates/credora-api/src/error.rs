//! API error handling
//!
//! Domain errors keep their stable codes; the HTTP layer adds its own for
//! signature and payload failures. Body shape: `{ "code": ..., "msg": ... }`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use credora_types::CredoraError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// API result type
pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error(transparent)]
    Domain(#[from] CredoraError),
}

impl ApiError {
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::Domain(e) => e.error_code(),
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidSignature => StatusCode::UNAUTHORIZED,
            Self::InvalidPayload(_) => StatusCode::BAD_REQUEST,
            Self::Domain(e) => match e {
                CredoraError::NotFound { .. } => StatusCode::NOT_FOUND,
                CredoraError::InvalidState { .. } | CredoraError::Conflict { .. } => {
                    StatusCode::CONFLICT
                }
                CredoraError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                CredoraError::Validation { .. } => StatusCode::BAD_REQUEST,
                CredoraError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
                CredoraError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub msg: String,
}

impl From<&ApiError> for ErrorResponse {
    fn from(err: &ApiError) -> Self {
        let msg = match err {
            // Storage details stay in the logs
            ApiError::Domain(CredoraError::Storage { .. }) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        Self {
            code: err.error_code().to_string(),
            msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Domain(CredoraError::Storage { message }) = &self {
            tracing::error!(error = %message, "Storage error");
        }
        let status = self.status_code();
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidPayload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_status_codes() {
        let cases = [
            (CredoraError::not_found("Payment", "PAY-1"), StatusCode::NOT_FOUND),
            (CredoraError::invalid_state("loan is not approved"), StatusCode::CONFLICT),
            (CredoraError::conflict("already processed"), StatusCode::CONFLICT),
            (
                CredoraError::insufficient_funds("usr_1", dec!(10), dec!(5)),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (CredoraError::validation("amount", "must be positive"), StatusCode::BAD_REQUEST),
            (CredoraError::unauthorized("admin only"), StatusCode::UNAUTHORIZED),
            (CredoraError::storage("disk full"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status_code(), status);
        }
        assert_eq!(ApiError::InvalidSignature.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_storage_message_is_not_exposed() {
        let body = ErrorResponse::from(&ApiError::from(CredoraError::storage("password=hunter2")));
        assert_eq!(body.code, "STORAGE_ERROR");
        assert_eq!(body.msg, "Internal server error");
    }

    #[test]
    fn test_domain_code_passes_through() {
        let body = ErrorResponse::from(&ApiError::from(CredoraError::conflict("duplicate")));
        assert_eq!(body.code, "CONFLICT");
        assert_eq!(body.msg, "Conflict: duplicate");
    }
}
