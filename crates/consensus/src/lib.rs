//! dBFT consensus driver.
//!
//! Wires a Byzantine agreement state machine to the blockchain: candidate
//! block construction from the mempool, payload build/verify, block commit
//! via the import pipeline. A single-task event loop multiplexes timers,
//! inbound payloads and inbound transactions.

pub mod context;
pub mod messages;
pub mod relay_cache;
pub mod service;

pub use context::ConsensusContext;
pub use messages::{ConsensusMessage, ConsensusMessageBody, ConsensusMessageType, ExtensiblePayload};
pub use relay_cache::RelayCache;
pub use service::{
    ConsensusConfig, ConsensusEvent, ConsensusService, NullRelay, PayloadRelay, WitnessMode,
};

/// Errors raised by the consensus driver.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("not a validator")]
    NotValidator,

    #[error("ledger: {0}")]
    Ledger(#[from] helios_ledger::Error),

    #[error("contract: {0}")]
    Contract(#[from] helios_contract::Error),

    #[error("crypto: {0}")]
    Crypto(#[from] helios_crypto::Error),

    #[error("core: {0}")]
    Core(#[from] helios_core::Error),

    #[error("io: {0}")]
    Io(#[from] helios_io::Error),
}

/// The result type for consensus operations.
pub type Result<T> = std::result::Result<T, Error>;
