//! Protocol settings and well-known constants for the Helios node.
//!
//! Everything here is consensus-critical configuration: sizes, intervals and
//! committee parameters that every node on a network must agree on.

use serde::{Deserialize, Serialize};

pub mod settings;

pub use settings::ProtocolSettings;

/// Size of a script hash / account address in bytes.
pub const ADDRESS_SIZE: usize = 20;

/// Size of a 256-bit hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Size of a compressed secp256r1 public key in bytes.
pub const PUBLIC_KEY_SIZE: usize = 33;

/// Target interval between blocks.
pub const MILLISECONDS_PER_BLOCK: u64 = 15_000;

/// Maximum number of transactions in one block.
pub const MAX_TRANSACTIONS_PER_BLOCK: usize = 512;

/// Maximum size of a serialized block in bytes.
pub const MAX_BLOCK_SIZE: usize = 2_097_152;

/// Maximum size of a contract script or a single transaction script.
pub const MAX_SCRIPT_SIZE: usize = 65_536;

/// Maximum size of a serialized transaction.
pub const MAX_TRANSACTION_SIZE: usize = 102_400;

/// Maximum number of signers attached to one transaction.
pub const MAX_TRANSACTION_ATTRIBUTES: usize = 16;

/// Maximum size of a contract manifest in bytes.
pub const MAX_MANIFEST_SIZE: usize = 0xFFFF;

/// How many blocks a transaction may wait for inclusion.
pub const MAX_VALID_UNTIL_BLOCK_INCREMENT: u32 = 5_760;

/// Blocks older than this are not traceable through the Ledger contract.
pub const MAX_TRACEABLE_BLOCKS: u32 = 2_102_400;

/// 1 GAS expressed in its smallest unit (8 decimals).
pub const GAS_FACTOR: i64 = 100_000_000;

/// Network magic values for the well-known networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NetworkType {
    /// The main network.
    MainNet,
    /// The public test network.
    TestNet,
    /// A private network with an explicit magic.
    Private(u32),
}

impl NetworkType {
    /// The wire magic for this network.
    pub fn magic(&self) -> u32 {
        match self {
            NetworkType::MainNet => 0x4854_4c4d,
            NetworkType::TestNet => 0x4854_4c54,
            NetworkType::Private(magic) => *magic,
        }
    }
}

/// Errors raised while loading or validating settings.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

/// The result type for configuration handling.
pub type Result<T> = std::result::Result<T, Error>;
