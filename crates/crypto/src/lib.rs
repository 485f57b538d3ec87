//! Hashing and secp256r1 signatures for the Helios node.
//!
//! Wraps the vetted `p256`, `sha2` and `ripemd` crates behind the small
//! surface the rest of the node needs. No curve arithmetic lives here.

pub mod ecdsa;
pub mod ecpoint;
pub mod hash;

pub use ecdsa::{KeyPair, Secp256r1};
pub use ecpoint::ECPoint;
pub use hash::{hash160, hash256, sha256};

/// Errors raised by cryptographic operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid private key")]
    InvalidPrivateKey,

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}

/// The result type for cryptographic operations.
pub type Result<T> = std::result::Result<T, Error>;
