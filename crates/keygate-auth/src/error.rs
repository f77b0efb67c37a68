//! Error types for authorization, confirmation tokens and configuration.

use std::path::PathBuf;

/// Reasons a privileged request is denied.
///
/// Every variant surfaces to the client as a 401. Denials are final for a
/// given input and are never retried by this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum AuthorizationError {
    /// The requested scope (or route) has no configured policy.
    #[error("unknown scope")]
    UnknownScope,

    /// At least one signature came from a signer outside the permitted set.
    #[error("signer is not permitted for this scope")]
    UnpermittedSigner,

    /// A signature failed cryptographic verification.
    #[error("signature verification failed")]
    InvalidSignature,

    /// A mandatory signer did not contribute a valid signature.
    #[error("mandatory signer is missing")]
    MissingMandatorySigner,

    /// The envelope could not be parsed or carries no signatures.
    #[error("malformed envelope")]
    MalformedEnvelope,
}

impl AuthorizationError {
    /// Stable identifier used in logs and response bodies.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::UnknownScope => "unknown_scope",
            Self::UnpermittedSigner => "unpermitted_signer",
            Self::InvalidSignature => "invalid_signature",
            Self::MissingMandatorySigner => "missing_mandatory_signer",
            Self::MalformedEnvelope => "malformed_envelope",
        }
    }

    /// HTTP status class for the denial.
    pub fn status_code(&self) -> u16 {
        401
    }
}

/// Confirmation token failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// Parse failure, wrong algorithm or signature mismatch.
    #[error("invalid token")]
    InvalidToken,

    /// Signature is valid but the token is past its expiry.
    #[error("token has expired")]
    ExpiredToken,

    /// The service key could not produce a signature.
    #[error("failed to sign token: {message}")]
    Signing { message: String },
}

impl TokenError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidToken | Self::ExpiredToken => 401,
            Self::Signing { .. } => 500,
        }
    }
}

/// Startup configuration errors. These are the only fatal errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration: {message}")]
    Parse { message: String },

    #[error("invalid key for {owner}: {reason}")]
    InvalidKey { owner: String, reason: String },

    #[error("scope {scope}: mandatory signers {signers:?} are not permitted signers")]
    MandatoryNotPermitted { scope: String, signers: Vec<String> },

    #[error("scope {scope} has no permitted signers")]
    EmptyScope { scope: String },

    #[error("scope {scope} is defined more than once")]
    DuplicateScope { scope: String },

    #[error("scope {scope} references signer {signer} with no keyring entry")]
    UnknownSigner { scope: String, signer: String },

    #[error("configuration error: {message}")]
    Invalid { message: String },
}

/// Result type for configuration loading.
pub type ConfigResult<T> = Result<T, ConfigError>;
