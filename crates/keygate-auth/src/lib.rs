//! Authorization and token-verification engine for the Keygate management API.
//!
//! This crate provides:
//!
//! - A static signer keyring and scope policy registry, validated at startup
//! - Multisig envelope verification with deterministic denial reasons
//! - An authorization gateway backed by a static route table
//! - Self-contained, Ed25519-signed confirmation tokens (JWT wire shape)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use keygate_auth::{AuthConfig, AuthorizationGateway, RouteSpec, SignedEnvelope};
//!
//! # fn example(routes: &'static [RouteSpec], body: &str) -> anyhow::Result<()> {
//! let config = AuthConfig::from_env()?;
//! let gateway = AuthorizationGateway::new(Arc::new(config.build_context()?), routes);
//!
//! let envelope = SignedEnvelope::from_json(body)?;
//! let decision = gateway.authorize(&envelope, "write_labels");
//! if !decision.is_allowed() {
//!     println!("denied: {}", decision.reason_code());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod confirmation;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod keyring;
pub mod policy;
pub mod verify;

pub use config::{AuthConfig, AuthContext, ConfirmationConfig, KeySource, ScopeSpec, CONFIG_ENV};
pub use confirmation::{
    decode_and_verify, ConfirmationClaims, ConfirmationCodec, ConfirmationPublicKey,
};
pub use envelope::{
    build_pae, DecodedEnvelope, EnvelopeBuilder, EnvelopeSignature, SignedEnvelope,
    PAYLOAD_TYPE_MANAGEMENT_V1,
};
pub use error::{AuthorizationError, ConfigError, ConfigResult, TokenError};
pub use gateway::{decision_status, AuthorizationGateway, Method, RouteSpec};
pub use keyring::{compute_key_id, decode_public_key_pem, SignerId, SignerKeyring};
pub use policy::{ScopePolicy, ScopePolicyRegistry};
pub use verify::{AuthorizationDecision, MultisigVerifier, VerifiedEnvelope};
