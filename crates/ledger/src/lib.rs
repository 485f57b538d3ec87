//! Blockchain state machine: genesis, block import and the mempool.

pub mod blockchain;
pub mod events;
pub mod mempool;

pub use blockchain::{ApplicationExecuted, Blockchain};
pub use events::BlockchainEvent;
pub use mempool::Mempool;

/// Errors raised by the ledger.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("block verification failed: {0}")]
    BlockVerification(String),

    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("core: {0}")]
    Core(#[from] helios_core::Error),

    #[error("contract: {0}")]
    Contract(#[from] helios_contract::Error),

    #[error("storage: {0}")]
    Storage(#[from] helios_persistence::Error),

    #[error("io: {0}")]
    Io(#[from] helios_io::Error),

    #[error("crypto: {0}")]
    Crypto(#[from] helios_crypto::Error),
}

/// The result type for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;
