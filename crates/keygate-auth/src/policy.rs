//! Scope policy registry.
//!
//! Maps a capability scope name to the signers allowed to authorize it and
//! the subset whose signature is always required. Policies are validated
//! when they are registered, so a registry that exists is always consistent.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{ConfigError, ConfigResult};
use crate::keyring::{SignerId, SignerKeyring};

/// Signer policy for one scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopePolicy {
    name: String,
    permitted_signers: BTreeSet<SignerId>,
    mandatory_signers: BTreeSet<SignerId>,
}

impl ScopePolicy {
    /// Build a policy, enforcing `mandatory ⊆ permitted` and a non-empty
    /// permitted set.
    pub fn new(
        name: impl Into<String>,
        permitted: impl IntoIterator<Item = SignerId>,
        mandatory: impl IntoIterator<Item = SignerId>,
    ) -> ConfigResult<Self> {
        let name = name.into();
        let permitted_signers: BTreeSet<SignerId> = permitted.into_iter().collect();
        let mandatory_signers: BTreeSet<SignerId> = mandatory.into_iter().collect();

        if permitted_signers.is_empty() {
            return Err(ConfigError::EmptyScope { scope: name });
        }

        let stray: Vec<String> = mandatory_signers
            .difference(&permitted_signers)
            .map(ToString::to_string)
            .collect();
        if !stray.is_empty() {
            return Err(ConfigError::MandatoryNotPermitted {
                scope: name,
                signers: stray,
            });
        }

        Ok(Self {
            name,
            permitted_signers,
            mandatory_signers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn permitted_signers(&self) -> &BTreeSet<SignerId> {
        &self.permitted_signers
    }

    pub fn mandatory_signers(&self) -> &BTreeSet<SignerId> {
        &self.mandatory_signers
    }

    pub fn permits(&self, signer: &str) -> bool {
        self.permitted_signers.contains(signer)
    }
}

/// Scope name -> policy.
#[derive(Debug, Clone, Default)]
pub struct ScopePolicyRegistry {
    scopes: BTreeMap<String, ScopePolicy>,
}

impl ScopePolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, policy: ScopePolicy) -> ConfigResult<()> {
        if self.scopes.contains_key(policy.name()) {
            return Err(ConfigError::DuplicateScope {
                scope: policy.name().to_string(),
            });
        }
        self.scopes.insert(policy.name().to_string(), policy);
        Ok(())
    }

    pub fn get(&self, scope: &str) -> Option<&ScopePolicy> {
        self.scopes.get(scope)
    }

    pub fn scopes(&self) -> impl Iterator<Item = &ScopePolicy> {
        self.scopes.values()
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Every permitted signer must have a key, otherwise its signatures
    /// could never verify.
    pub fn check_keyring(&self, keyring: &SignerKeyring) -> ConfigResult<()> {
        for policy in self.scopes.values() {
            if let Some(signer) = policy
                .permitted_signers
                .iter()
                .find(|s| !keyring.contains(s.as_str()))
            {
                return Err(ConfigError::UnknownSigner {
                    scope: policy.name.clone(),
                    signer: signer.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<SignerId> {
        names.iter().map(|n| SignerId::from(*n)).collect()
    }

    #[test]
    fn test_valid_policy() {
        let policy = ScopePolicy::new("write_labels", ids(&["alex", "jeff"]), ids(&["alex"])).unwrap();
        assert!(policy.permits("alex"));
        assert!(policy.permits("jeff"));
        assert!(!policy.permits("james"));
        assert_eq!(policy.mandatory_signers().len(), 1);
    }

    #[test]
    fn test_mandatory_outside_permitted_is_fatal() {
        let err = ScopePolicy::new("write_labels", ids(&["jeff"]), ids(&["alex", "jeff"])).unwrap_err();
        match err {
            ConfigError::MandatoryNotPermitted { scope, signers } => {
                assert_eq!(scope, "write_labels");
                assert_eq!(signers, vec!["alex".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_permitted_is_fatal() {
        let err = ScopePolicy::new("read_labels", ids(&[]), ids(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyScope { .. }));
    }

    #[test]
    fn test_duplicate_scope_rejected() {
        let mut registry = ScopePolicyRegistry::new();
        let policy = ScopePolicy::new("read_users", ids(&["alex"]), ids(&[])).unwrap();
        registry.insert(policy.clone()).unwrap();
        assert!(matches!(
            registry.insert(policy),
            Err(ConfigError::DuplicateScope { .. })
        ));
    }

    #[test]
    fn test_permitted_signer_without_key() {
        let mut registry = ScopePolicyRegistry::new();
        registry
            .insert(ScopePolicy::new("read_users", ids(&["alex"]), ids(&[])).unwrap())
            .unwrap();

        let err = registry.check_keyring(&SignerKeyring::new()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownSigner { .. }));
    }

    #[test]
    fn test_duplicate_signers_collapse() {
        let policy =
            ScopePolicy::new("write_labels", ids(&["alex", "alex", "jeff"]), ids(&["alex", "alex"]))
                .unwrap();
        assert_eq!(policy.permitted_signers().len(), 2);
        assert_eq!(policy.mandatory_signers().len(), 1);
    }
}
