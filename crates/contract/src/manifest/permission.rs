//! Contract permissions: who a contract may call, and what.

use serde::{Deserialize, Serialize};

use helios_core::UInt160;
use helios_crypto::ECPoint;

/// The target of one permission entry.
///
/// Untagged JSON: variant order matters, so the hash and group forms are
/// tried before the wildcard string swallows them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionContract {
    /// A specific contract hash.
    Hash(UInt160),
    /// Any contract carrying this group key.
    Group(ECPoint),
    /// Any contract ("*").
    Wildcard(String),
}

impl PermissionContract {
    /// The wildcard entry.
    pub fn wildcard() -> Self {
        PermissionContract::Wildcard("*".into())
    }

    /// True when this entry covers `hash` / `groups`.
    pub fn covers(&self, hash: &UInt160, groups: &[ECPoint]) -> bool {
        match self {
            PermissionContract::Wildcard(tag) => tag == "*",
            PermissionContract::Hash(allowed) => allowed == hash,
            PermissionContract::Group(key) => groups.contains(key),
        }
    }
}

/// Methods covered by one permission entry: all, or a named list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PermissionMethods {
    /// Any method ("*").
    Wildcard(String),
    /// Only the listed methods.
    List(Vec<String>),
}

impl PermissionMethods {
    /// The wildcard entry.
    pub fn wildcard() -> Self {
        PermissionMethods::Wildcard("*".into())
    }

    /// True when `method` is covered.
    pub fn covers(&self, method: &str) -> bool {
        match self {
            PermissionMethods::Wildcard(tag) => tag == "*",
            PermissionMethods::List(methods) => methods.iter().any(|m| m == method),
        }
    }
}

/// One entry of the `permissions` manifest block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractPermission {
    /// Which contracts the entry covers.
    pub contract: PermissionContract,
    /// Which methods the entry covers.
    pub methods: PermissionMethods,
}

impl ContractPermission {
    /// The allow-everything permission.
    pub fn default_permission() -> Self {
        Self {
            contract: PermissionContract::wildcard(),
            methods: PermissionMethods::wildcard(),
        }
    }

    /// True when calling `method` on the target is allowed.
    pub fn is_allowed(&self, hash: &UInt160, groups: &[ECPoint], method: &str) -> bool {
        self.contract.covers(hash, groups) && self.methods.covers(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_allows_everything() {
        let permission = ContractPermission::default_permission();
        assert!(permission.is_allowed(&UInt160::zero(), &[], "anything"));
    }

    #[test]
    fn test_hash_scoped_permission() {
        let target = UInt160::from_script(b"target");
        let permission = ContractPermission {
            contract: PermissionContract::Hash(target),
            methods: PermissionMethods::List(vec!["transfer".into()]),
        };
        assert!(permission.is_allowed(&target, &[], "transfer"));
        assert!(!permission.is_allowed(&target, &[], "mint"));
        assert!(!permission.is_allowed(&UInt160::zero(), &[], "transfer"));
    }
}
