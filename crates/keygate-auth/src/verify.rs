//! Multisig envelope verification.
//!
//! # Verification Steps
//!
//! 1. Resolve the scope policy (`UnknownScope`)
//! 2. Decode the envelope (`MalformedEnvelope`)
//! 3. Every signer must be permitted by the scope (`UnpermittedSigner`)
//! 4. Every signature must verify against the signer's key (`InvalidSignature`)
//! 5. Every mandatory signer must be among the verified signers
//!    (`MissingMandatorySigner`)
//!
//! Checks run in this order, so the first failing step decides the reason.
//! The result depends only on the envelope, the registry and the keyring.

use std::collections::BTreeSet;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::Signature;

use crate::envelope::{build_pae, DecodedEnvelope, SignedEnvelope, PAYLOAD_TYPE_MANAGEMENT_V1};
use crate::error::AuthorizationError;
use crate::keyring::{SignerId, SignerKeyring};
use crate::policy::ScopePolicyRegistry;

/// Outcome of one authorization check. Computed fresh per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationDecision {
    Allowed,
    Denied(AuthorizationError),
}

impl AuthorizationDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Denial reason, `None` when allowed.
    pub fn reason(&self) -> Option<AuthorizationError> {
        match self {
            Self::Allowed => None,
            Self::Denied(reason) => Some(*reason),
        }
    }

    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied(reason) => reason.reason_code(),
        }
    }

    pub fn into_result(self) -> Result<(), AuthorizationError> {
        match self {
            Self::Allowed => Ok(()),
            Self::Denied(reason) => Err(reason),
        }
    }
}

impl<T> From<Result<T, AuthorizationError>> for AuthorizationDecision {
    fn from(result: Result<T, AuthorizationError>) -> Self {
        match result {
            Ok(_) => Self::Allowed,
            Err(reason) => Self::Denied(reason),
        }
    }
}

/// An envelope that passed verification for a scope.
#[derive(Debug, Clone)]
pub struct VerifiedEnvelope {
    scope: String,
    signers: BTreeSet<SignerId>,
    envelope: DecodedEnvelope,
}

impl VerifiedEnvelope {
    pub fn scope(&self) -> &str {
        &self.scope
    }

    /// Distinct signers whose signatures verified.
    pub fn signers(&self) -> &BTreeSet<SignerId> {
        &self.signers
    }

    pub fn envelope(&self) -> &DecodedEnvelope {
        &self.envelope
    }
}

/// Verifies envelopes against a policy registry and keyring snapshot.
#[derive(Debug, Clone, Copy)]
pub struct MultisigVerifier<'a> {
    registry: &'a ScopePolicyRegistry,
    keyring: &'a SignerKeyring,
}

impl<'a> MultisigVerifier<'a> {
    pub fn new(registry: &'a ScopePolicyRegistry, keyring: &'a SignerKeyring) -> Self {
        Self { registry, keyring }
    }

    /// Decide whether `envelope` authorizes `scope`.
    pub fn verify(&self, envelope: &SignedEnvelope, scope: &str) -> AuthorizationDecision {
        self.verify_envelope(envelope, scope).into()
    }

    /// Like [`verify`](Self::verify), but hands back the decoded envelope on
    /// success so callers can read the payload they were authorized for.
    pub fn verify_envelope(
        &self,
        envelope: &SignedEnvelope,
        scope: &str,
    ) -> Result<VerifiedEnvelope, AuthorizationError> {
        let policy = self.registry.get(scope).ok_or_else(|| {
            tracing::debug!(scope = %scope, reason = "unknown_scope", "authorization denied");
            AuthorizationError::UnknownScope
        })?;

        let decoded = envelope.decode()?;

        if let Some(sig) = decoded
            .signatures()
            .iter()
            .find(|sig| !policy.permits(sig.signer.as_str()))
        {
            tracing::debug!(
                scope = %scope,
                signer = %sig.signer,
                reason = "unpermitted_signer",
                "authorization denied"
            );
            return Err(AuthorizationError::UnpermittedSigner);
        }

        let pae = build_pae(PAYLOAD_TYPE_MANAGEMENT_V1, decoded.payload());
        let mut verified = BTreeSet::new();
        for sig in decoded.signatures() {
            if let Err(e) = self.verify_single_signature(&pae, &sig.signer, &sig.signature) {
                tracing::debug!(
                    scope = %scope,
                    signer = %sig.signer,
                    reason = e.reason_code(),
                    "authorization denied"
                );
                return Err(e);
            }
            verified.insert(sig.signer.clone());
        }

        if let Some(missing) = policy
            .mandatory_signers()
            .iter()
            .find(|signer| !verified.contains(*signer))
        {
            tracing::debug!(
                scope = %scope,
                signer = %missing,
                reason = "missing_mandatory_signer",
                "authorization denied"
            );
            return Err(AuthorizationError::MissingMandatorySigner);
        }

        // decode() guarantees at least one signature, so this only guards
        // against a future change to that contract.
        if verified.is_empty() {
            return Err(AuthorizationError::MalformedEnvelope);
        }

        tracing::debug!(scope = %scope, signers = verified.len(), "authorization allowed");
        Ok(VerifiedEnvelope {
            scope: scope.to_string(),
            signers: verified,
            envelope: decoded,
        })
    }

    fn verify_single_signature(
        &self,
        pae: &[u8],
        signer: &SignerId,
        signature_b64: &str,
    ) -> Result<(), AuthorizationError> {
        let key = self
            .keyring
            .get(signer.as_str())
            .ok_or(AuthorizationError::InvalidSignature)?;

        let signature_bytes = BASE64
            .decode(signature_b64)
            .map_err(|_| AuthorizationError::InvalidSignature)?;
        let signature = Signature::from_slice(&signature_bytes)
            .map_err(|_| AuthorizationError::InvalidSignature)?;

        key.verify_strict(pae, &signature)
            .map_err(|_| AuthorizationError::InvalidSignature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{EnvelopeBuilder, EnvelopeSignature};
    use crate::policy::ScopePolicy;
    use ed25519_dalek::SigningKey;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct Fixture {
        registry: ScopePolicyRegistry,
        keyring: SignerKeyring,
        keys: BTreeMap<&'static str, SigningKey>,
    }

    impl Fixture {
        /// `write_labels`: permitted {alex, jeff}, mandatory {alex}.
        /// `james` has a key but is permitted nowhere.
        fn new() -> Self {
            let mut keys = BTreeMap::new();
            let mut keyring = SignerKeyring::new();
            for name in ["alex", "jeff", "james"] {
                let key = SigningKey::generate(&mut rand::thread_rng());
                keyring.insert(name.into(), key.verifying_key()).unwrap();
                keys.insert(name, key);
            }

            let mut registry = ScopePolicyRegistry::new();
            registry
                .insert(
                    ScopePolicy::new(
                        "write_labels",
                        ["alex".into(), "jeff".into()],
                        ["alex".into()],
                    )
                    .unwrap(),
                )
                .unwrap();
            registry
                .insert(
                    ScopePolicy::new(
                        "two_of_two",
                        ["alex".into(), "jeff".into()],
                        ["alex".into(), "jeff".into()],
                    )
                    .unwrap(),
                )
                .unwrap();

            Self {
                registry,
                keyring,
                keys,
            }
        }

        fn verifier(&self) -> MultisigVerifier<'_> {
            MultisigVerifier::new(&self.registry, &self.keyring)
        }

        fn envelope(&self, signers: &[&'static str]) -> SignedEnvelope {
            let mut builder =
                EnvelopeBuilder::new(&json!({"data": {"key": "email"}})).unwrap();
            for signer in signers {
                builder = builder.sign(*signer, &self.keys[signer]);
            }
            builder.build()
        }
    }

    #[test]
    fn test_mandatory_signer_alone_allowed() {
        let fx = Fixture::new();
        let decision = fx.verifier().verify(&fx.envelope(&["alex"]), "write_labels");
        assert_eq!(decision, AuthorizationDecision::Allowed);
    }

    #[test]
    fn test_unpermitted_signer_denied() {
        let fx = Fixture::new();
        let decision = fx
            .verifier()
            .verify(&fx.envelope(&["james", "jeff"]), "write_labels");
        assert_eq!(
            decision,
            AuthorizationDecision::Denied(AuthorizationError::UnpermittedSigner)
        );
    }

    #[test]
    fn test_unpermitted_signer_denies_even_with_all_mandatory() {
        let fx = Fixture::new();
        let decision = fx
            .verifier()
            .verify(&fx.envelope(&["alex", "jeff", "james"]), "write_labels");
        assert_eq!(
            decision.reason(),
            Some(AuthorizationError::UnpermittedSigner)
        );
    }

    #[test]
    fn test_non_mandatory_signer_alone_denied() {
        let fx = Fixture::new();
        let decision = fx.verifier().verify(&fx.envelope(&["jeff"]), "write_labels");
        assert_eq!(
            decision.reason(),
            Some(AuthorizationError::MissingMandatorySigner)
        );
    }

    #[test]
    fn test_removing_mandatory_signer_flips_decision() {
        let fx = Fixture::new();
        let full = fx.envelope(&["alex", "jeff"]);
        assert!(fx.verifier().verify(&full, "two_of_two").is_allowed());

        for i in 0..full.signatures.len() {
            let mut reduced = full.clone();
            reduced.signatures.remove(i);
            assert_eq!(
                fx.verifier().verify(&reduced, "two_of_two").reason(),
                Some(AuthorizationError::MissingMandatorySigner)
            );
        }
    }

    #[test]
    fn test_unknown_scope() {
        let fx = Fixture::new();
        let decision = fx.verifier().verify(&fx.envelope(&["alex"]), "delete_everything");
        assert_eq!(decision.reason(), Some(AuthorizationError::UnknownScope));
    }

    #[test]
    fn test_unknown_scope_reported_before_malformed() {
        let fx = Fixture::new();
        let empty = EnvelopeBuilder::new(&json!({})).unwrap().build();
        assert_eq!(
            fx.verifier().verify(&empty, "nope").reason(),
            Some(AuthorizationError::UnknownScope)
        );
        assert_eq!(
            fx.verifier().verify(&empty, "write_labels").reason(),
            Some(AuthorizationError::MalformedEnvelope)
        );
    }

    #[test]
    fn test_signature_by_wrong_key_invalid() {
        let fx = Fixture::new();
        // jeff's key claiming to be alex
        let envelope = EnvelopeBuilder::new(&json!({"data": {}}))
            .unwrap()
            .sign("alex", &fx.keys["jeff"])
            .build();
        assert_eq!(
            fx.verifier().verify(&envelope, "write_labels").reason(),
            Some(AuthorizationError::InvalidSignature)
        );
    }

    #[test]
    fn test_tampered_payload_invalid() {
        let fx = Fixture::new();
        let mut envelope = fx.envelope(&["alex"]);
        envelope.payload = BASE64.encode(br#"{"data":{"key":"phone"}}"#);
        assert_eq!(
            fx.verifier().verify(&envelope, "write_labels").reason(),
            Some(AuthorizationError::InvalidSignature)
        );
    }

    #[test]
    fn test_garbage_signature_bytes_invalid() {
        let fx = Fixture::new();
        let mut envelope = fx.envelope(&["alex"]);
        envelope.signatures[0].signature = "not base64!!".to_string();
        assert_eq!(
            fx.verifier().verify(&envelope, "write_labels").reason(),
            Some(AuthorizationError::InvalidSignature)
        );

        envelope.signatures[0].signature = BASE64.encode([7u8; 12]);
        assert_eq!(
            fx.verifier().verify(&envelope, "write_labels").reason(),
            Some(AuthorizationError::InvalidSignature)
        );
    }

    #[test]
    fn test_unpermitted_takes_priority_over_invalid() {
        let fx = Fixture::new();
        let mut envelope = fx.envelope(&["alex", "james"]);
        envelope.signatures[0].signature = BASE64.encode([0u8; 64]);
        assert_eq!(
            fx.verifier().verify(&envelope, "write_labels").reason(),
            Some(AuthorizationError::UnpermittedSigner)
        );
    }

    #[test]
    fn test_invalid_takes_priority_over_missing_mandatory() {
        let fx = Fixture::new();
        let mut envelope = fx.envelope(&["jeff"]);
        envelope.signatures[0].signature = BASE64.encode([0u8; 64]);
        assert_eq!(
            fx.verifier().verify(&envelope, "write_labels").reason(),
            Some(AuthorizationError::InvalidSignature)
        );
    }

    #[test]
    fn test_duplicate_signatures_count_once() {
        let fx = Fixture::new();
        let envelope = fx.envelope(&["jeff", "jeff"]);
        assert_eq!(
            fx.verifier().verify(&envelope, "two_of_two").reason(),
            Some(AuthorizationError::MissingMandatorySigner)
        );

        let verified = fx
            .verifier()
            .verify_envelope(&fx.envelope(&["alex", "alex", "jeff"]), "two_of_two")
            .unwrap();
        assert_eq!(verified.signers().len(), 2);
    }

    #[test]
    fn test_duplicate_signer_with_one_bad_signature_invalid() {
        let fx = Fixture::new();
        let mut envelope = fx.envelope(&["alex"]);
        envelope.signatures.push(EnvelopeSignature {
            signer: "alex".into(),
            signature: BASE64.encode([1u8; 64]),
        });
        assert_eq!(
            fx.verifier().verify(&envelope, "write_labels").reason(),
            Some(AuthorizationError::InvalidSignature)
        );
    }

    #[test]
    fn test_verified_envelope_exposes_payload() {
        let fx = Fixture::new();
        let verified = fx
            .verifier()
            .verify_envelope(&fx.envelope(&["alex"]), "write_labels")
            .unwrap();
        assert_eq!(verified.scope(), "write_labels");
        assert_eq!(verified.envelope().data()["key"], json!("email"));
    }

    #[test]
    fn test_verify_is_deterministic() {
        let fx = Fixture::new();
        let cases: [&[&'static str]; 4] = [&["alex"], &["jeff"], &["james"], &["alex", "jeff"]];
        for signers in cases {
            let envelope = fx.envelope(signers);
            let first = fx.verifier().verify(&envelope, "write_labels");
            for _ in 0..5 {
                assert_eq!(fx.verifier().verify(&envelope, "write_labels"), first);
            }
        }
    }
}
