//! Contract manifests: ABI, groups, permissions and trust declarations.

pub mod abi;
pub mod permission;

pub use abi::{ContractAbi, ContractEvent, ContractMethod, ContractParameter, ParameterType};
pub use permission::{ContractPermission, PermissionContract, PermissionMethods};

use serde::{Deserialize, Serialize};

use helios_config::MAX_MANIFEST_SIZE;
use helios_core::UInt160;
use helios_crypto::ECPoint;

use crate::{Error, Result};

/// A public-key endorsement of a contract.
///
/// The signature covers the contract hash and proves the group's key holder
/// vouches for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractGroup {
    /// The group's public key.
    pub pubkey: ECPoint,
    /// Signature over the contract hash, base64 in JSON.
    pub signature: Vec<u8>,
}

/// Trusted contracts: all, none, or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Trusts {
    /// "*": trusts every contract.
    Wildcard(String),
    /// Only the listed hashes.
    List(Vec<UInt160>),
}

impl Default for Trusts {
    fn default() -> Self {
        Trusts::List(Vec::new())
    }
}

/// The manifest attached to every deployed contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractManifest {
    /// Contract name.
    pub name: String,
    /// Group endorsements.
    #[serde(default)]
    pub groups: Vec<ContractGroup>,
    /// Reserved feature object.
    #[serde(default)]
    pub features: serde_json::Map<String, serde_json::Value>,
    /// NEP standards the contract claims to implement.
    #[serde(default, rename = "supportedstandards")]
    pub supported_standards: Vec<String>,
    /// The ABI.
    pub abi: ContractAbi,
    /// Outbound call permissions.
    #[serde(default)]
    pub permissions: Vec<ContractPermission>,
    /// Contracts this contract trusts to call it.
    #[serde(default)]
    pub trusts: Trusts,
    /// Opaque attributes.
    #[serde(default)]
    pub extra: Option<serde_json::Value>,
}

impl ContractManifest {
    /// A minimal manifest with wildcard permissions, used by tests and
    /// deployment helpers.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            groups: Vec::new(),
            features: serde_json::Map::new(),
            supported_standards: Vec::new(),
            abi: ContractAbi::default(),
            permissions: vec![ContractPermission::default_permission()],
            trusts: Trusts::default(),
            extra: None,
        }
    }

    /// Parses canonical UTF-8 JSON, enforcing the size ceiling.
    pub fn from_json(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_MANIFEST_SIZE {
            return Err(Error::InvalidManifest(format!(
                "manifest of {} bytes exceeds the {} byte ceiling",
                data.len(),
                MAX_MANIFEST_SIZE
            )));
        }
        let manifest: ContractManifest = serde_json::from_slice(data)
            .map_err(|e| Error::InvalidManifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Renders canonical JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let bytes =
            serde_json::to_vec(self).map_err(|e| Error::InvalidManifest(e.to_string()))?;
        if bytes.len() > MAX_MANIFEST_SIZE {
            return Err(Error::InvalidManifest(format!(
                "manifest of {} bytes exceeds the {} byte ceiling",
                bytes.len(),
                MAX_MANIFEST_SIZE
            )));
        }
        Ok(bytes)
    }

    /// Structural validation.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::InvalidManifest("empty contract name".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for method in &self.abi.methods {
            if !seen.insert((method.name.clone(), method.parameters.len())) {
                return Err(Error::InvalidManifest(format!(
                    "duplicate method {}/{}",
                    method.name,
                    method.parameters.len()
                )));
            }
        }
        Ok(())
    }

    /// The group keys declared by this manifest.
    pub fn group_keys(&self) -> Vec<ECPoint> {
        self.groups.iter().map(|g| g.pubkey).collect()
    }

    /// True when this manifest permits calling `method` on the contract
    /// described by (`hash`, `target_groups`).
    pub fn can_call(&self, hash: &UInt160, target_groups: &[ECPoint], method: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p.is_allowed(hash, target_groups, method))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::abi::{ContractMethod, ParameterType};

    fn sample() -> ContractManifest {
        let mut manifest = ContractManifest::new("sample");
        manifest.abi.methods.push(ContractMethod {
            name: "main".into(),
            parameters: vec![],
            return_type: ParameterType::Integer,
            offset: 0,
            safe: true,
        });
        manifest
    }

    #[test]
    fn test_json_round_trip() {
        let manifest = sample();
        let json = manifest.to_json().unwrap();
        let back = ContractManifest::from_json(&json).unwrap();
        assert_eq!(manifest, back);
    }

    #[test]
    fn test_json_uses_canonical_keys() {
        let json = String::from_utf8(sample().to_json().unwrap()).unwrap();
        for key in [
            "name",
            "groups",
            "abi",
            "permissions",
            "trusts",
            "supportedstandards",
            "features",
            "extra",
        ] {
            assert!(json.contains(&format!("\"{key}\"")), "missing key {key}");
        }
    }

    #[test]
    fn test_duplicate_method_rejected() {
        let mut manifest = sample();
        manifest.abi.methods.push(manifest.abi.methods[0].clone());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_oversized_manifest_rejected() {
        let mut manifest = sample();
        manifest.extra = Some(serde_json::Value::String("x".repeat(MAX_MANIFEST_SIZE)));
        assert!(manifest.to_json().is_err());
    }

    #[test]
    fn test_restricted_permissions() {
        let mut manifest = sample();
        let target = UInt160::from_script(b"t");
        manifest.permissions = vec![ContractPermission {
            contract: PermissionContract::Hash(target),
            methods: PermissionMethods::List(vec!["ping".into()]),
        }];
        assert!(manifest.can_call(&target, &[], "ping"));
        assert!(!manifest.can_call(&target, &[], "pong"));
        assert!(!manifest.can_call(&UInt160::zero(), &[], "ping"));
    }
}
