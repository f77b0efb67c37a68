//! Registration and account confirmation.
//!
//! `register` creates a pending user; the confirmation token is
//! self-contained, so `confirm` needs only the token and the service public
//! key, no server-side session.

use std::sync::Arc;

use keygate_auth::{AuthConfig, ConfigResult, ConfirmationClaims, ConfirmationCodec};
use rand::RngCore;
use serde_json::{json, Map, Value};

use crate::error::{ApiError, StoreError, USER_NOT_PENDING};
use crate::model::User;
use crate::password::hash_password;
use crate::response::ApiResponse;
use crate::store::UserDirectory;
use crate::validation::Params;

pub struct IdentityService<S> {
    codec: Arc<ConfirmationCodec>,
    store: Arc<S>,
    ttl_secs: u64,
}

impl<S: UserDirectory> IdentityService<S> {
    pub fn new(codec: Arc<ConfirmationCodec>, store: Arc<S>, ttl_secs: u64) -> Self {
        Self {
            codec,
            store,
            ttl_secs,
        }
    }

    /// Build from the `confirmation` section; `None` when it is absent.
    pub fn from_config(config: &AuthConfig, store: Arc<S>) -> ConfigResult<Option<Self>> {
        let (Some(section), Some(codec)) = (&config.confirmation, config.confirmation_codec()?)
        else {
            return Ok(None);
        };
        Ok(Some(Self::new(Arc::new(codec), store, section.ttl_secs)))
    }

    /// Create a pending user with a hashed password and a fresh uid.
    ///
    /// A taken email is `Conflict` (`email has already been taken`).
    pub fn register(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let digest = hash_password(password)?;
        let user = User::pending(generate_uid(), email).with_password_digest(digest);
        self.store.insert_user(user.clone())?;
        tracing::info!(uid = %user.uid, "user registered");
        Ok(user)
    }

    /// Issue a token for the pending user registered under `email`.
    pub fn generate_confirmation(&self, email: &str) -> Result<String, ApiError> {
        let user = self
            .store
            .find_user_by_email(email)?
            .filter(|u| !u.is_active())
            .ok_or_else(|| ApiError::Unprocessable(USER_NOT_PENDING.to_string()))?;

        let claims = ConfirmationClaims::issue(&user.email, &user.uid, self.ttl_secs);
        let token = self.codec.encode(&claims)?;
        tracing::info!(uid = %user.uid, "confirmation token issued");
        Ok(token)
    }

    /// Activate the user named by a valid token. Succeeds at most once.
    pub fn confirm(&self, token: &str) -> Result<User, ApiError> {
        let claims = self.codec.verify(token)?;
        let user = self
            .store
            .activate_pending(&claims.uid, &claims.email)
            .map_err(|e| match e {
                StoreError::Conflict(m) => ApiError::Unprocessable(m),
                other => other.into(),
            })?;
        tracing::info!(uid = %user.uid, "user confirmed");
        Ok(user)
    }

    /// `{ "email": ..., "password": ... }` → 201 with the pending user.
    pub fn handle_register(&self, data: &Map<String, Value>) -> ApiResponse {
        let mut params = Params::new(data);
        let email = params.required_matching("email", is_email);
        let password = params.required_str("password");
        let result = params.finish().map_err(ApiError::from).and_then(|()| {
            self.register(
                email.as_deref().unwrap_or_default(),
                password.as_deref().unwrap_or_default(),
            )
        });
        match result {
            Ok(user) => ApiResponse::json(201, user.to_json(false)),
            Err(e) => e.into(),
        }
    }

    /// `{ "email": ... }` → 201 `{ "token": ... }`
    pub fn handle_generate_confirmation(&self, data: &Map<String, Value>) -> ApiResponse {
        let mut params = Params::new(data);
        let email = params.required_str("email");
        let result = params
            .finish()
            .map_err(ApiError::from)
            .and_then(|()| self.generate_confirmation(email.as_deref().unwrap_or_default()));
        match result {
            Ok(token) => ApiResponse::json(201, json!({ "token": token })),
            Err(e) => e.into(),
        }
    }

    /// `{ "token": ... }` → 201 with the activated user.
    pub fn handle_confirm(&self, data: &Map<String, Value>) -> ApiResponse {
        let mut params = Params::new(data);
        let token = params.required_str("token");
        let result = params
            .finish()
            .map_err(ApiError::from)
            .and_then(|()| self.confirm(token.as_deref().unwrap_or_default()));
        match result {
            Ok(user) => ApiResponse::json(201, user.to_json(false)),
            Err(e) => {
                tracing::debug!(status = e.status_code(), "confirmation rejected");
                e.into()
            }
        }
    }
}

/// `ID` followed by ten upper-case hex digits.
fn generate_uid() -> String {
    let mut bytes = [0u8; 5];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("ID{}", hex::encode_upper(bytes))
}

/// One `@` with a non-empty local part and a dotted domain, no whitespace.
fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !s.chars().any(char::is_whitespace)
}
