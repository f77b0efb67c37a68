//! Signed envelope wire format.
//!
//! ```json
//! { "payload": "<base64 canonical JSON>",
//!   "signatures": [ { "signer": "alex", "sig": "<base64 ed25519>" } ] }
//! ```
//!
//! Each signature covers the DSSE pre-authentication encoding of the decoded
//! payload bytes under [`PAYLOAD_TYPE_MANAGEMENT_V1`].

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AuthorizationError;
use crate::keyring::SignerId;

/// Payload type bound into every envelope signature.
pub const PAYLOAD_TYPE_MANAGEMENT_V1: &str = "application/vnd.keygate.management+json;v=1";

/// Envelope as received from a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Base64-encoded payload bytes.
    pub payload: String,

    /// Signer-attributed signatures, in submission order.
    #[serde(default)]
    pub signatures: Vec<EnvelopeSignature>,
}

/// One signer-attributed signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeSignature {
    pub signer: SignerId,

    /// Base64-encoded Ed25519 signature.
    #[serde(rename = "sig")]
    pub signature: String,
}

/// Envelope with its payload decoded and parsed.
#[derive(Debug, Clone)]
pub struct DecodedEnvelope {
    payload: Vec<u8>,
    body: Map<String, Value>,
    signatures: Vec<EnvelopeSignature>,
}

impl DecodedEnvelope {
    /// Raw payload bytes the signatures cover.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Parsed payload object.
    pub fn body(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Request parameters: the payload's `data` object, empty if absent.
    pub fn data(&self) -> Map<String, Value> {
        match self.body.get("data") {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    pub fn signatures(&self) -> &[EnvelopeSignature] {
        &self.signatures
    }
}

impl SignedEnvelope {
    /// Parse an envelope from its JSON wire form.
    pub fn from_json(json: &str) -> Result<Self, AuthorizationError> {
        serde_json::from_str(json).map_err(|e| {
            tracing::debug!(error = %e, "envelope is not valid JSON");
            AuthorizationError::MalformedEnvelope
        })
    }

    pub fn to_json(&self) -> String {
        // Serializing plain strings cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Check well-formedness: at least one signature, base64 payload that
    /// parses to a JSON object.
    pub fn decode(&self) -> Result<DecodedEnvelope, AuthorizationError> {
        if self.signatures.is_empty() {
            tracing::debug!("envelope carries no signatures");
            return Err(AuthorizationError::MalformedEnvelope);
        }

        let payload = BASE64.decode(&self.payload).map_err(|e| {
            tracing::debug!(error = %e, "envelope payload is not base64");
            AuthorizationError::MalformedEnvelope
        })?;

        let body = match serde_json::from_slice::<Value>(&payload) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                tracing::debug!("envelope payload is not a JSON object");
                return Err(AuthorizationError::MalformedEnvelope);
            }
            Err(e) => {
                tracing::debug!(error = %e, "envelope payload is not JSON");
                return Err(AuthorizationError::MalformedEnvelope);
            }
        };

        Ok(DecodedEnvelope {
            payload,
            body,
            signatures: self.signatures.clone(),
        })
    }
}

/// Build DSSE Pre-Authentication Encoding (PAE).
///
/// ```text
/// PAE(type, payload) = "DSSEv1" SP LEN(type) SP type SP LEN(payload) SP payload
/// ```
pub fn build_pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let type_len = payload_type.len().to_string();
    let payload_len = payload.len().to_string();

    let mut pae = Vec::with_capacity(16 + payload_type.len() + payload.len());
    pae.extend_from_slice(b"DSSEv1 ");
    pae.extend_from_slice(type_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_type.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload_len.as_bytes());
    pae.push(b' ');
    pae.extend_from_slice(payload);
    pae
}

/// Client-side helper that canonicalizes a payload and collects signatures.
#[derive(Debug, Clone)]
pub struct EnvelopeBuilder {
    payload: Vec<u8>,
    signatures: Vec<EnvelopeSignature>,
}

impl EnvelopeBuilder {
    /// Canonicalize `payload` (RFC 8785 JCS) as the bytes to sign.
    pub fn new(payload: &Value) -> anyhow::Result<Self> {
        let payload = serde_jcs::to_vec(payload)
            .map_err(|e| anyhow::anyhow!("failed to canonicalize payload: {e}"))?;
        Ok(Self::from_bytes(payload))
    }

    /// Sign pre-encoded payload bytes as-is.
    pub fn from_bytes(payload: Vec<u8>) -> Self {
        Self {
            payload,
            signatures: Vec::new(),
        }
    }

    pub fn sign(mut self, signer: impl Into<SignerId>, key: &SigningKey) -> Self {
        let pae = build_pae(PAYLOAD_TYPE_MANAGEMENT_V1, &self.payload);
        let signature = key.sign(&pae);
        self.signatures.push(EnvelopeSignature {
            signer: signer.into(),
            signature: BASE64.encode(signature.to_bytes()),
        });
        self
    }

    pub fn build(self) -> SignedEnvelope {
        SignedEnvelope {
            payload: BASE64.encode(&self.payload),
            signatures: self.signatures,
        }
    }
}
