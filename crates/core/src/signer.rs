//! Transaction signers and their scopes.

use serde::{Deserialize, Serialize};

use helios_crypto::ECPoint;
use helios_io::serializable::var_int_size;
use helios_io::{BinaryWriter, MemoryReader, Serializable};

use crate::{UInt160, Witness, WitnessScope};

/// Upper bound on allow-list lengths inside one signer.
pub const MAX_SUBITEMS: usize = 16;

/// An account authorizing a transaction, with the scope of that authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signer {
    /// The authorizing account.
    pub account: UInt160,
    /// Where along the call chain the authorization holds.
    pub scopes: WitnessScope,
    /// Allow-listed contracts, meaningful with `CUSTOM_CONTRACTS`.
    pub allowed_contracts: Vec<UInt160>,
    /// Allow-listed group keys, meaningful with `CUSTOM_GROUPS`.
    pub allowed_groups: Vec<ECPoint>,
}

impl Signer {
    /// A signer with the given scope and empty allow-lists.
    pub fn new(account: UInt160, scopes: WitnessScope) -> Self {
        Self {
            account,
            scopes,
            allowed_contracts: Vec::new(),
            allowed_groups: Vec::new(),
        }
    }

    /// A signer valid only at the transaction entry script.
    pub fn called_by_entry(account: UInt160) -> Self {
        Self::new(account, WitnessScope::CALLED_BY_ENTRY)
    }

    /// A signer valid anywhere.
    pub fn global(account: UInt160) -> Self {
        Self::new(account, WitnessScope::GLOBAL)
    }
}

impl Serializable for Signer {
    fn size(&self) -> usize {
        let mut size = UInt160::SIZE + 1;
        if self.scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            size += var_int_size(self.allowed_contracts.len() as u64)
                + self.allowed_contracts.len() * UInt160::SIZE;
        }
        if self.scopes.contains(WitnessScope::CUSTOM_GROUPS) {
            size += var_int_size(self.allowed_groups.len() as u64)
                + self.allowed_groups.len() * 33;
        }
        size
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_serializable(&self.account)?;
        writer.write_u8(self.scopes.bits())?;
        if self.scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            writer.write_serializable_list(&self.allowed_contracts)?;
        }
        if self.scopes.contains(WitnessScope::CUSTOM_GROUPS) {
            writer.write_var_int(self.allowed_groups.len() as u64)?;
            for group in &self.allowed_groups {
                writer.write_bytes(group.as_bytes())?;
            }
        }
        Ok(())
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let account = reader.read_serializable()?;
        let scopes = WitnessScope::from_byte(reader.read_u8()?)
            .map_err(|e| helios_io::Error::InvalidData(e.to_string()))?;
        let allowed_contracts = if scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            reader.read_serializable_list(MAX_SUBITEMS)?
        } else {
            Vec::new()
        };
        let allowed_groups = if scopes.contains(WitnessScope::CUSTOM_GROUPS) {
            let count = reader.read_var_int(MAX_SUBITEMS as u64)? as usize;
            let mut groups = Vec::with_capacity(count);
            for _ in 0..count {
                let bytes = reader.read_bytes(33)?;
                groups.push(
                    ECPoint::from_bytes(&bytes)
                        .map_err(|e| helios_io::Error::InvalidData(e.to_string()))?,
                );
            }
            groups
        } else {
            Vec::new()
        };
        Ok(Self {
            account,
            scopes,
            allowed_contracts,
            allowed_groups,
        })
    }
}

/// Pairs a signer list with its witness list positionally.
pub fn witness_for<'a>(
    signers: &[Signer],
    witnesses: &'a [Witness],
    account: &UInt160,
) -> Option<&'a Witness> {
    signers
        .iter()
        .position(|s| &s.account == account)
        .and_then(|index| witnesses.get(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signer_round_trip_with_contracts() {
        let signer = Signer {
            account: UInt160::from_script(&[1, 2, 3]),
            scopes: WitnessScope::CALLED_BY_ENTRY | WitnessScope::CUSTOM_CONTRACTS,
            allowed_contracts: vec![UInt160::from_script(&[9])],
            allowed_groups: Vec::new(),
        };
        let bytes = helios_io::to_bytes(&signer).unwrap();
        assert_eq!(bytes.len(), signer.size());
        let back: Signer = helios_io::from_bytes(&bytes).unwrap();
        assert_eq!(signer, back);
    }

    #[test]
    fn test_plain_signer_omits_allow_lists() {
        let signer = Signer::global(UInt160::zero());
        let bytes = helios_io::to_bytes(&signer).unwrap();
        assert_eq!(bytes.len(), UInt160::SIZE + 1);
    }
}
