//! Core ledger types for the Helios node.
//!
//! Hash wrappers, witnesses, signers, transactions and blocks, each with the
//! bit-exact wire encoding every node must agree on.

pub mod attribute;
pub mod block;
pub mod merkle;
pub mod signer;
pub mod transaction;
pub mod uint;
pub mod witness;

pub use attribute::{OracleResponseCode, TransactionAttribute};
pub use block::{Block, Header};
pub use merkle::compute_merkle_root;
pub use signer::Signer;
pub use transaction::Transaction;
pub use uint::{UInt160, UInt256};
pub use witness::{Witness, WitnessScope};

/// Errors raised by core type handling.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("verification failed: {0}")]
    VerificationFailed(String),

    #[error("io: {0}")]
    Io(#[from] helios_io::Error),

    #[error("crypto: {0}")]
    Crypto(#[from] helios_crypto::Error),
}

/// The result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;
