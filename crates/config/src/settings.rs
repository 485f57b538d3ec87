//! Protocol-level settings shared by every subsystem.

use serde::{Deserialize, Serialize};

use crate::{Error, NetworkType, Result, MAX_VALID_UNTIL_BLOCK_INCREMENT, MILLISECONDS_PER_BLOCK};

/// Consensus-critical parameters of a network.
///
/// These are loaded once at startup and shared behind an `Arc`; nothing in
/// here changes while the node runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolSettings {
    /// Which network this node participates in.
    pub network: NetworkType,

    /// Address version byte used for base58 address rendering.
    pub address_version: u8,

    /// Number of consensus validators.
    pub validators_count: usize,

    /// Number of committee members. Must be >= `validators_count`.
    pub committee_size: usize,

    /// Target interval between blocks in milliseconds.
    pub milliseconds_per_block: u64,

    /// Upper bound on `valid_until_block - current_height` for transactions.
    pub max_valid_until_block_increment: u32,

    /// Compressed public keys of the standby committee, hex-encoded.
    ///
    /// The first `validators_count` entries double as standby validators.
    pub standby_committee: Vec<String>,

    /// Hardfork-free initial GAS distribution to the committee address.
    pub initial_gas_distribution: i64,
}

impl ProtocolSettings {
    /// Settings for a single-node private network, useful in tests.
    pub fn private() -> Self {
        Self {
            network: NetworkType::Private(0x0754_4e41),
            address_version: 0x35,
            validators_count: 1,
            committee_size: 1,
            milliseconds_per_block: MILLISECONDS_PER_BLOCK,
            max_valid_until_block_increment: MAX_VALID_UNTIL_BLOCK_INCREMENT,
            standby_committee: vec![
                // Compressed secp256r1 generator point; private networks
                // replace this with their own key.
                "036b17d1f2e12c4247f8bce6e563a440f277037d812deb33a0f4a13945d898c296"
                    .to_string(),
            ],
            initial_gas_distribution: 52_000_000_00000000,
        }
    }

    /// The wire magic of the configured network.
    pub fn magic(&self) -> u32 {
        self.network.magic()
    }

    /// Number of standby validators.
    pub fn standby_validators(&self) -> &[String] {
        let n = self.validators_count.min(self.standby_committee.len());
        &self.standby_committee[..n]
    }

    /// Validates internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.validators_count == 0 {
            return Err(Error::InvalidSettings(
                "validators_count must be positive".into(),
            ));
        }
        if self.committee_size < self.validators_count {
            return Err(Error::InvalidSettings(
                "committee_size must be >= validators_count".into(),
            ));
        }
        if !self.standby_committee.is_empty()
            && self.standby_committee.len() < self.committee_size
        {
            return Err(Error::InvalidSettings(
                "standby_committee shorter than committee_size".into(),
            ));
        }
        Ok(())
    }
}

impl Default for ProtocolSettings {
    fn default() -> Self {
        Self::private()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_settings_validate() {
        let settings = ProtocolSettings::private();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.validators_count, 1);
    }

    #[test]
    fn test_committee_smaller_than_validators_rejected() {
        let mut settings = ProtocolSettings::private();
        settings.validators_count = 4;
        settings.committee_size = 2;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_network_magic_distinct() {
        assert_ne!(
            NetworkType::MainNet.magic(),
            NetworkType::TestNet.magic()
        );
        assert_eq!(NetworkType::Private(42).magic(), 42);
    }
}
