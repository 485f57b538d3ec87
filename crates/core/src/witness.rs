//! Witnesses and witness scopes.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use helios_config::MAX_SCRIPT_SIZE;
use helios_io::serializable::var_bytes_size;
use helios_io::{BinaryWriter, MemoryReader, Serializable};

use crate::{Error, Result, UInt160};

bitflags! {
    /// Controls where along the call chain a signer counts as authorizing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WitnessScope: u8 {
        /// Only the transaction itself is witnessed; `CheckWitness` is false
        /// everywhere.
        const NONE = 0x00;
        /// Valid only when the calling contract is the transaction entry
        /// script.
        const CALLED_BY_ENTRY = 0x01;
        /// Valid only inside contracts listed in `allowed_contracts`.
        const CUSTOM_CONTRACTS = 0x10;
        /// Valid only inside contracts whose manifest groups intersect
        /// `allowed_groups`.
        const CUSTOM_GROUPS = 0x20;
        /// Valid anywhere in the call chain.
        const GLOBAL = 0x80;
    }
}

impl WitnessScope {
    /// Parses a scope byte, rejecting unknown bits and illegal combinations.
    pub fn from_byte(value: u8) -> Result<Self> {
        let scope = Self::from_bits(value)
            .ok_or_else(|| Error::InvalidFormat(format!("unknown witness scope 0x{value:02x}")))?;
        if scope.contains(Self::GLOBAL) && scope != Self::GLOBAL {
            return Err(Error::InvalidFormat(
                "Global scope cannot be combined with others".into(),
            ));
        }
        Ok(scope)
    }
}

impl Serialize for WitnessScope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for WitnessScope {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let value = u8::deserialize(deserializer)?;
        WitnessScope::from_byte(value).map_err(serde::de::Error::custom)
    }
}

/// An (invocation script, verification script) pair proving a signer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Witness {
    /// Pushes the signatures consumed by the verification script.
    pub invocation_script: Vec<u8>,
    /// The script whose hash identifies the signer.
    pub verification_script: Vec<u8>,
}

impl Witness {
    /// Creates a witness from its two scripts.
    pub fn new(invocation_script: Vec<u8>, verification_script: Vec<u8>) -> Self {
        Self {
            invocation_script,
            verification_script,
        }
    }

    /// The account this witness authorizes: hash160 of the verification
    /// script.
    pub fn script_hash(&self) -> UInt160 {
        UInt160::from_script(&self.verification_script)
    }
}

impl Serializable for Witness {
    fn size(&self) -> usize {
        var_bytes_size(self.invocation_script.len())
            + var_bytes_size(self.verification_script.len())
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_var_bytes(&self.invocation_script)?;
        writer.write_var_bytes(&self.verification_script)
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let invocation_script = reader.read_var_bytes(MAX_SCRIPT_SIZE)?;
        let verification_script = reader.read_var_bytes(MAX_SCRIPT_SIZE)?;
        Ok(Self {
            invocation_script,
            verification_script,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_scope_must_be_alone() {
        assert!(WitnessScope::from_byte(0x80).is_ok());
        assert!(WitnessScope::from_byte(0x81).is_err());
    }

    #[test]
    fn test_unknown_scope_bits_rejected() {
        assert!(WitnessScope::from_byte(0x02).is_err());
    }

    #[test]
    fn test_witness_round_trip() {
        let witness = Witness::new(vec![0x0c, 0x40], vec![0x41, 0x56, 0xe7, 0xb3]);
        let bytes = helios_io::to_bytes(&witness).unwrap();
        let back: Witness = helios_io::from_bytes(&bytes).unwrap();
        assert_eq!(witness, back);
        assert_eq!(witness.script_hash(), back.script_hash());
    }
}
