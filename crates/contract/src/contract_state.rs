//! Deployed contract state.

use serde::{Deserialize, Serialize};

use helios_core::{UInt160, UInt256};
use helios_io::{BinaryWriter, MemoryReader, Serializable};

use crate::manifest::ContractManifest;
use crate::nef::NefFile;
use crate::{Error, Result};

/// The persisted record of a deployed contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractState {
    /// Positive for user contracts, negative for natives.
    pub id: i32,
    /// Incremented on every update.
    pub update_counter: u16,
    /// The contract address.
    pub hash: UInt160,
    /// The executable.
    pub nef: NefFile,
    /// The manifest.
    pub manifest: ContractManifest,
}

impl ContractState {
    /// The bytecode.
    pub fn script(&self) -> &[u8] {
        &self.nef.script
    }

    /// True for built-in native contracts.
    pub fn is_native(&self) -> bool {
        self.id < 0
    }
}

impl Serializable for ContractState {
    fn size(&self) -> usize {
        let manifest_len = self.manifest.to_json().map(|j| j.len()).unwrap_or(0);
        4 + 2
            + UInt160::SIZE
            + self.nef.size()
            + helios_io::serializable::var_bytes_size(manifest_len)
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_i32(self.id)?;
        writer.write_u16(self.update_counter)?;
        writer.write_serializable(&self.hash)?;
        writer.write_serializable(&self.nef)?;
        let manifest = self
            .manifest
            .to_json()
            .map_err(|e| helios_io::Error::InvalidData(e.to_string()))?;
        writer.write_var_bytes(&manifest)
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let id = reader.read_i32()?;
        let update_counter = reader.read_u16()?;
        let hash = reader.read_serializable()?;
        let nef = reader.read_serializable()?;
        let manifest_bytes = reader.read_var_bytes(helios_config::MAX_MANIFEST_SIZE)?;
        let manifest = ContractManifest::from_json(&manifest_bytes)
            .map_err(|e| helios_io::Error::InvalidData(e.to_string()))?;
        Ok(Self {
            id,
            update_counter,
            hash,
            nef,
            manifest,
        })
    }
}

/// The deployed address of a user contract:
/// `hash160(sender ‖ nef-checksum ‖ name)`.
pub fn create_contract_hash(sender: &UInt160, nef_checksum: u32, name: &str) -> UInt160 {
    let mut data = Vec::with_capacity(UInt160::SIZE + 4 + name.len());
    data.extend_from_slice(sender.as_bytes());
    data.extend_from_slice(&nef_checksum.to_le_bytes());
    data.extend_from_slice(name.as_bytes());
    UInt160::from_script(&data)
}

/// Validates a deployment payload pair.
pub fn check_deployment(nef: &NefFile, manifest: &ContractManifest) -> Result<()> {
    nef.validate()?;
    manifest.validate()?;
    if manifest.abi.methods.is_empty() {
        return Err(Error::InvalidManifest(
            "contract exports no methods".into(),
        ));
    }
    for method in &manifest.abi.methods {
        if method.offset as usize >= nef.script.len() {
            return Err(Error::InvalidManifest(format!(
                "method {} offset {} beyond script end",
                method.name, method.offset
            )));
        }
    }
    Ok(())
}

/// Links a transaction hash into contract-create results (id assignment is
/// the Management native's job; this is only the address rule).
pub fn contract_hash_for_tx(_tx: &UInt256, sender: &UInt160, nef: &NefFile, name: &str) -> UInt160 {
    create_contract_hash(sender, nef.checksum, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::abi::{ContractMethod, ParameterType};

    fn sample_state() -> ContractState {
        let nef = NefFile::new("test", vec![0x40]).unwrap();
        let mut manifest = ContractManifest::new("sample");
        manifest.abi.methods.push(ContractMethod {
            name: "main".into(),
            parameters: vec![],
            return_type: ParameterType::Void,
            offset: 0,
            safe: false,
        });
        ContractState {
            id: 1,
            update_counter: 0,
            hash: create_contract_hash(&UInt160::zero(), nef.checksum, "sample"),
            nef,
            manifest,
        }
    }

    #[test]
    fn test_round_trip() {
        let state = sample_state();
        let bytes = helios_io::to_bytes(&state).unwrap();
        let back: ContractState = helios_io::from_bytes(&bytes).unwrap();
        assert_eq!(state, back);
    }

    #[test]
    fn test_hash_depends_on_every_input() {
        let sender = UInt160::from_script(b"sender");
        let base = create_contract_hash(&sender, 7, "name");
        assert_ne!(base, create_contract_hash(&UInt160::zero(), 7, "name"));
        assert_ne!(base, create_contract_hash(&sender, 8, "name"));
        assert_ne!(base, create_contract_hash(&sender, 7, "other"));
    }

    #[test]
    fn test_deployment_checks() {
        let state = sample_state();
        assert!(check_deployment(&state.nef, &state.manifest).is_ok());

        let mut bad = state.manifest.clone();
        bad.abi.methods[0].offset = 10;
        assert!(check_deployment(&state.nef, &bad).is_err());
    }
}
