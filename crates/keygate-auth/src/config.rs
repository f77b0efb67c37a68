//! Startup configuration.
//!
//! One YAML file describes the scope policies, the signer keyring and the
//! confirmation keypair. Loading validates every invariant once; the result
//! is an immutable [`AuthContext`] shared by reference for the life of the
//! process.
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `KEYGATE_CONFIG` | Path to the YAML configuration file |
//! | `KEYGATE_CONFIRMATION_TTL_SECS` | Override confirmation token lifetime |
//! | `KEYGATE_CONFIRMATION_LEEWAY_SECS` | Override expiry clock-skew leeway |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::confirmation::{ConfirmationCodec, ConfirmationPublicKey};
use crate::error::{ConfigError, ConfigResult};
use crate::keyring::{SignerId, SignerKeyring};
use crate::policy::{ScopePolicy, ScopePolicyRegistry};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "KEYGATE_CONFIG";

/// Validated, read-only authorization state.
#[derive(Debug, Clone)]
pub struct AuthContext {
    keyring: SignerKeyring,
    registry: ScopePolicyRegistry,
}

impl AuthContext {
    /// Pair a keyring with a registry; every permitted signer needs a key.
    pub fn new(keyring: SignerKeyring, registry: ScopePolicyRegistry) -> ConfigResult<Self> {
        registry.check_keyring(&keyring)?;
        Ok(Self { keyring, registry })
    }

    pub fn keyring(&self) -> &SignerKeyring {
        &self.keyring
    }

    pub fn registry(&self) -> &ScopePolicyRegistry {
        &self.registry
    }
}

/// Signer policy for one scope, as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScopeSpec {
    pub permitted_signers: Vec<SignerId>,

    #[serde(default)]
    pub mandatory_signers: Vec<SignerId>,
}

/// Where a signer's public key comes from. Exactly one field must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeySource {
    /// Inline SPKI PEM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// Path to an SPKI PEM file, relative to the config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_path: Option<PathBuf>,
}

/// Confirmation token settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfirmationConfig {
    /// PKCS#8 PEM private key. Optional for verify-only deployments.
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,

    /// SPKI PEM public key.
    pub public_key_path: PathBuf,

    /// Token lifetime in seconds; zero issues tokens without expiry.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    /// Clock skew tolerated on expiry.
    #[serde(default)]
    pub leeway_secs: u64,
}

fn default_ttl() -> u64 {
    24 * 60 * 60
}

impl ConfirmationConfig {
    /// Apply `KEYGATE_CONFIRMATION_*` overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ttl) = env_u64("KEYGATE_CONFIRMATION_TTL_SECS") {
            self.ttl_secs = ttl;
        }
        if let Some(leeway) = env_u64("KEYGATE_CONFIRMATION_LEEWAY_SECS") {
            self.leeway_secs = leeway;
        }
        self
    }

    /// Build the signing codec. Requires `private_key_path`.
    pub fn codec(&self, base_dir: &Path) -> ConfigResult<ConfirmationCodec> {
        let private_key_path = self
            .private_key_path
            .as_ref()
            .ok_or_else(|| ConfigError::Invalid {
                message: "confirmation.private_key_path is required to issue tokens".to_string(),
            })?;
        let codec = ConfirmationCodec::from_files(
            &resolve(base_dir, private_key_path),
            &resolve(base_dir, &self.public_key_path),
        )?;
        Ok(codec.with_leeway(self.leeway_secs))
    }

    pub fn public_key(&self, base_dir: &Path) -> ConfigResult<ConfirmationPublicKey> {
        ConfirmationPublicKey::from_file(&resolve(base_dir, &self.public_key_path))
    }
}

fn env_u64(name: &str) -> Option<u64> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %value, "ignoring non-numeric override");
            None
        }
    }
}

/// Configuration file contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub scopes: BTreeMap<String, ScopeSpec>,

    #[serde(default)]
    pub keyring: BTreeMap<SignerId, KeySource>,

    #[serde(default)]
    pub confirmation: Option<ConfirmationConfig>,

    /// Directory relative key paths resolve against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl AuthConfig {
    /// Load from `KEYGATE_CONFIG`.
    pub fn from_env() -> ConfigResult<Self> {
        let path = std::env::var(CONFIG_ENV).map_err(|_| ConfigError::Invalid {
            message: format!("{CONFIG_ENV} is not set"),
        })?;
        Self::from_file(Path::new(&path))
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self::from_yaml(&content, base_dir)
    }

    pub fn from_yaml(yaml: &str, base_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let mut config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        config.base_dir = base_dir.into();
        config.confirmation = config.confirmation.map(ConfirmationConfig::with_env_overrides);
        Ok(config)
    }

    /// Validate and build the read-only authorization context.
    pub fn build_context(&self) -> ConfigResult<AuthContext> {
        let mut keyring = SignerKeyring::new();
        for (signer, source) in &self.keyring {
            let pem = match (&source.public_key, &source.public_key_path) {
                (Some(pem), None) => pem.clone(),
                (None, Some(path)) => {
                    let path = resolve(&self.base_dir, path);
                    std::fs::read_to_string(&path)
                        .map_err(|source| ConfigError::Read { path, source })?
                }
                _ => {
                    return Err(ConfigError::InvalidKey {
                        owner: signer.to_string(),
                        reason: "exactly one of public_key or public_key_path is required"
                            .to_string(),
                    })
                }
            };
            keyring.insert_pem(signer.clone(), &pem)?;
        }

        let mut registry = ScopePolicyRegistry::new();
        for (name, spec) in &self.scopes {
            registry.insert(ScopePolicy::new(
                name.clone(),
                spec.permitted_signers.iter().cloned(),
                spec.mandatory_signers.iter().cloned(),
            )?)?;
        }

        let context = AuthContext::new(keyring, registry)?;
        tracing::info!(
            scopes = context.registry().len(),
            signers = context.keyring().len(),
            "loaded authorization policy"
        );
        Ok(context)
    }

    /// Confirmation codec, if a confirmation section is present.
    pub fn confirmation_codec(&self) -> ConfigResult<Option<ConfirmationCodec>> {
        self.confirmation
            .as_ref()
            .map(|c| c.codec(&self.base_dir))
            .transpose()
    }
}

fn resolve(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}
