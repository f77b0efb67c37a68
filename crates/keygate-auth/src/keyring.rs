//! Signer keyring: static mapping from signer identity to verification key.
//!
//! The keyring is built once at startup from configuration and is read-only
//! afterwards. Keys are Ed25519, supplied as SPKI PEM.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{ConfigError, ConfigResult};

/// Opaque identifier of a human or service signer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignerId(String);

impl SignerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SignerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SignerId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SignerId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for SignerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Signer identity -> public verification key.
#[derive(Debug, Clone, Default)]
pub struct SignerKeyring {
    keys: BTreeMap<SignerId, VerifyingKey>,
}

impl SignerKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a signer. A signer may only be registered once.
    pub fn insert(&mut self, signer: SignerId, key: VerifyingKey) -> ConfigResult<()> {
        if self.keys.contains_key(&signer) {
            return Err(ConfigError::InvalidKey {
                owner: signer.to_string(),
                reason: "signer is registered more than once".to_string(),
            });
        }
        tracing::debug!(signer = %signer, key_id = %compute_key_id(&key), "registered signer key");
        self.keys.insert(signer, key);
        Ok(())
    }

    /// Add a signer from an SPKI PEM public key.
    pub fn insert_pem(&mut self, signer: SignerId, pem: &str) -> ConfigResult<()> {
        let key = decode_public_key_pem(signer.as_str(), pem)?;
        self.insert(signer, key)
    }

    pub fn get(&self, signer: &str) -> Option<&VerifyingKey> {
        self.keys.get(signer)
    }

    pub fn contains(&self, signer: &str) -> bool {
        self.keys.contains_key(signer)
    }

    pub fn signers(&self) -> impl Iterator<Item = &SignerId> {
        self.keys.keys()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Decode an SPKI PEM public key. `owner` only labels the error.
pub fn decode_public_key_pem(owner: &str, pem: &str) -> ConfigResult<VerifyingKey> {
    use pkcs8::DecodePublicKey;

    VerifyingKey::from_public_key_pem(pem.trim()).map_err(|e| ConfigError::InvalidKey {
        owner: owner.to_string(),
        reason: format!("invalid SPKI PEM public key: {e}"),
    })
}

/// Fingerprint of a key: `sha256:<hex>` over its SPKI DER encoding.
///
/// Falls back to hashing the raw key bytes if DER encoding fails.
pub fn compute_key_id(key: &VerifyingKey) -> String {
    use pkcs8::EncodePublicKey;

    let digest = match key.to_public_key_der() {
        Ok(doc) => Sha256::digest(doc.as_bytes()),
        Err(_) => Sha256::digest(key.as_bytes()),
    };
    format!("sha256:{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;
    use pkcs8::{EncodePublicKey, LineEnding};

    fn generate_pem() -> (SigningKey, String) {
        let signing_key = SigningKey::generate(&mut rand::thread_rng());
        let pem = signing_key
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .unwrap();
        (signing_key, pem)
    }

    #[test]
    fn test_insert_and_lookup() {
        let (signing_key, pem) = generate_pem();
        let mut keyring = SignerKeyring::new();
        keyring.insert_pem(SignerId::from("alex"), &pem).unwrap();

        assert!(keyring.contains("alex"));
        assert!(!keyring.contains("jeff"));
        assert_eq!(keyring.get("alex"), Some(&signing_key.verifying_key()));
        assert_eq!(keyring.len(), 1);
    }

    #[test]
    fn test_duplicate_signer_rejected() {
        let (_, pem) = generate_pem();
        let mut keyring = SignerKeyring::new();
        keyring.insert_pem("alex".into(), &pem).unwrap();

        let err = keyring.insert_pem("alex".into(), &pem).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidKey { .. }));
    }

    #[test]
    fn test_garbage_pem_rejected() {
        let err = decode_public_key_pem("alex", "not a key").unwrap_err();
        match err {
            ConfigError::InvalidKey { owner, .. } => assert_eq!(owner, "alex"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_key_id_format() {
        let (signing_key, _) = generate_pem();
        let key_id = compute_key_id(&signing_key.verifying_key());

        assert!(key_id.starts_with("sha256:"));
        assert_eq!(key_id.len(), 7 + 64);
        assert!(key_id[7..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}
