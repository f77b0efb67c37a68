//! Confirmation tokens for unauthenticated account flows.
//!
//! Tokens are compact JWTs (`header.payload.signature`, base64url, EdDSA over
//! Ed25519). Everything needed to validate one travels inside it; the only
//! outside input is the service public key.

use std::path::Path;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult, TokenError};

/// Claims carried by a confirmation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationClaims {
    pub email: String,
    pub uid: String,
    /// Issued-at, unix seconds.
    pub iat: i64,
    /// Expiry, unix seconds. Tokens without one never expire.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl ConfirmationClaims {
    /// Claims issued now, expiring after `ttl_secs` (no expiry if zero).
    pub fn issue(email: impl Into<String>, uid: impl Into<String>, ttl_secs: u64) -> Self {
        let iat = Utc::now().timestamp();
        let exp = (ttl_secs > 0).then(|| iat.saturating_add(i64::try_from(ttl_secs).unwrap_or(i64::MAX)));
        Self {
            email: email.into(),
            uid: uid.into(),
            iat,
            exp,
        }
    }
}

/// Distributable verification key.
#[derive(Clone)]
pub struct ConfirmationPublicKey(DecodingKey);

impl ConfirmationPublicKey {
    /// Load from an SPKI PEM Ed25519 public key.
    pub fn from_pem(pem: &[u8]) -> ConfigResult<Self> {
        DecodingKey::from_ed_pem(pem)
            .map(Self)
            .map_err(|e| ConfigError::InvalidKey {
                owner: "confirmation".to_string(),
                reason: format!("invalid public key PEM: {e}"),
            })
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        Self::from_pem(&read_key_file(path)?)
    }
}

impl std::fmt::Debug for ConfirmationPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConfirmationPublicKey(..)")
    }
}

/// Verify a token against `public_key`.
///
/// Signature and algorithm are checked before expiry, so a tampered expired
/// token reports `InvalidToken`.
pub fn decode_and_verify(
    token: &str,
    public_key: &ConfirmationPublicKey,
    leeway_secs: u64,
) -> Result<ConfirmationClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::EdDSA);
    // exp is optional; when present it is enforced.
    validation.required_spec_claims.clear();
    validation.validate_exp = true;
    validation.leeway = leeway_secs;

    match jsonwebtoken::decode::<ConfirmationClaims>(token, &public_key.0, &validation) {
        Ok(data) => Ok(data.claims),
        Err(e) => match e.kind() {
            ErrorKind::ExpiredSignature => {
                tracing::debug!(reason = "expired_token", "confirmation token rejected");
                Err(TokenError::ExpiredToken)
            }
            kind => {
                tracing::debug!(reason = "invalid_token", error = ?kind, "confirmation token rejected");
                Err(TokenError::InvalidToken)
            }
        },
    }
}

/// Signs and verifies confirmation tokens with the service keypair.
pub struct ConfirmationCodec {
    encoding_key: EncodingKey,
    public_key: ConfirmationPublicKey,
    leeway_secs: u64,
}

impl ConfirmationCodec {
    /// Build from a PKCS#8 PEM private key and the matching SPKI PEM public key.
    pub fn from_pem(private_pem: &[u8], public_pem: &[u8]) -> ConfigResult<Self> {
        let encoding_key =
            EncodingKey::from_ed_pem(private_pem).map_err(|e| ConfigError::InvalidKey {
                owner: "confirmation".to_string(),
                reason: format!("invalid private key PEM: {e}"),
            })?;
        Ok(Self {
            encoding_key,
            public_key: ConfirmationPublicKey::from_pem(public_pem)?,
            leeway_secs: 0,
        })
    }

    pub fn from_files(private_key_path: &Path, public_key_path: &Path) -> ConfigResult<Self> {
        Self::from_pem(
            &read_key_file(private_key_path)?,
            &read_key_file(public_key_path)?,
        )
    }

    /// Clock skew tolerated when checking expiry.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    pub fn public_key(&self) -> &ConfirmationPublicKey {
        &self.public_key
    }

    pub fn encode(&self, claims: &ConfirmationClaims) -> Result<String, TokenError> {
        jsonwebtoken::encode(&Header::new(Algorithm::EdDSA), claims, &self.encoding_key).map_err(
            |e| TokenError::Signing {
                message: e.to_string(),
            },
        )
    }

    /// Verify against an explicit public key.
    pub fn decode_and_verify(
        &self,
        token: &str,
        public_key: &ConfirmationPublicKey,
    ) -> Result<ConfirmationClaims, TokenError> {
        decode_and_verify(token, public_key, self.leeway_secs)
    }

    /// Verify against the service's own public key.
    pub fn verify(&self, token: &str) -> Result<ConfirmationClaims, TokenError> {
        decode_and_verify(token, &self.public_key, self.leeway_secs)
    }
}

impl std::fmt::Debug for ConfirmationCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfirmationCodec")
            .field("leeway_secs", &self.leeway_secs)
            .finish_non_exhaustive()
    }
}

fn read_key_file(path: &Path) -> ConfigResult<Vec<u8>> {
    std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })
}
