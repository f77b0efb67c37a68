use keygate_auth::{AuthorizationError, TokenError};
use serde_json::{json, Value};

use crate::validation::FieldViolations;

pub const RECORD_NOT_FOUND: &str = "record doesn't exist";
pub const OWNER_NOT_FOUND: &str = "owner doesn't exist";
pub const KEY_TAKEN: &str = "key has already been taken";
pub const EMAIL_TAKEN: &str = "email has already been taken";
pub const USER_NOT_PENDING: &str = "User doesn't exist or has already been activated";

/// Errors raised by a record store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("{0}")]
    Validation(FieldViolations),

    #[error("{0}")]
    NotFound(String),

    /// Unique key already taken.
    #[error("{0}")]
    Conflict(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    pub(crate) fn lock_poisoned() -> Self {
        StoreError::Unavailable("lock poisoned".to_string())
    }
}

/// Every failure a management handler can surface, with its status class.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("authorization denied: {0}")]
    Denied(#[from] AuthorizationError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("{0}")]
    Validation(FieldViolations),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    /// Request understood but not applicable to the current record state.
    #[error("{0}")]
    Unprocessable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Denied(e) => e.status_code(),
            ApiError::Token(e) => e.status_code(),
            ApiError::NotFound(_) => 404,
            ApiError::Validation(_) | ApiError::Conflict(_) | ApiError::Unprocessable(_) => 422,
            ApiError::Internal(_) => 500,
        }
    }

    /// Client-visible message. Denials expose only the stable reason code.
    pub fn message(&self) -> String {
        match self {
            ApiError::Denied(e) => e.reason_code().to_string(),
            ApiError::Token(TokenError::ExpiredToken) => "expired_token".to_string(),
            ApiError::Token(TokenError::InvalidToken) => "invalid_token".to_string(),
            ApiError::Token(TokenError::Signing { .. }) | ApiError::Internal(_) => {
                "internal error".to_string()
            }
            ApiError::Validation(v) => v.to_string(),
            ApiError::NotFound(m) | ApiError::Conflict(m) | ApiError::Unprocessable(m) => {
                m.clone()
            }
        }
    }

    /// `{"error": "..."}`
    pub fn body(&self) -> Value {
        json!({ "error": self.message() })
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(v) => ApiError::Validation(v),
            StoreError::NotFound(m) => ApiError::NotFound(m),
            StoreError::Conflict(m) => ApiError::Conflict(m),
            StoreError::Unavailable(m) => ApiError::Internal(m),
        }
    }
}

impl From<FieldViolations> for ApiError {
    fn from(v: FieldViolations) -> Self {
        ApiError::Validation(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            ApiError::Denied(AuthorizationError::UnpermittedSigner).status_code(),
            401
        );
        assert_eq!(ApiError::Token(TokenError::ExpiredToken).status_code(), 401);
        assert_eq!(ApiError::NotFound(RECORD_NOT_FOUND.into()).status_code(), 404);
        assert_eq!(ApiError::Conflict(KEY_TAKEN.into()).status_code(), 422);
        assert_eq!(ApiError::Validation(FieldViolations::new()).status_code(), 422);
        assert_eq!(ApiError::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn test_body_shape() {
        let body = ApiError::NotFound(RECORD_NOT_FOUND.into()).body();
        assert_eq!(body, json!({ "error": "record doesn't exist" }));

        let body = ApiError::Denied(AuthorizationError::InvalidSignature).body();
        assert_eq!(body, json!({ "error": "invalid_signature" }));
    }

    #[test]
    fn test_store_error_mapping() {
        let api: ApiError = StoreError::Conflict(KEY_TAKEN.into()).into();
        assert_eq!(api, ApiError::Conflict(KEY_TAKEN.into()));
        let api: ApiError = StoreError::lock_poisoned().into();
        assert_eq!(api.status_code(), 500);
        assert_eq!(api.message(), "internal error");
    }
}
