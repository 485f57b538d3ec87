//! Off-chain oracle service.
//!
//! Workers pull pending requests from a bounded channel, fetch HTTPS or
//! NeoFS content, apply the request's JSONPath filter, and assemble response
//! transactions. Signatures are collected from every designated oracle node
//! until the threshold is reached; the finished transaction is pooled
//! exactly once, with a ConsensusUnreachable backup for rounds that stall.

pub mod config;
pub mod filter;
pub mod incomplete;
pub mod service;

pub use config::{NeoFsConfig, OracleConfig};
pub use filter::filter_json;
pub use incomplete::IncompleteTx;
pub use service::{
    Broadcaster, NeoFsFetcher, NoNeoFs, NullBroadcaster, OracleLedger, OracleService,
    ResponseData, TxPoolCallback,
};

/// Errors raised by the oracle service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("filter failed: {0}")]
    Filter(String),

    #[error("request {0} expired")]
    Expired(u64),

    #[error("service not running")]
    NotRunning,

    #[error("contract: {0}")]
    Contract(#[from] helios_contract::Error),

    #[error("crypto: {0}")]
    Crypto(#[from] helios_crypto::Error),

    #[error("core: {0}")]
    Core(#[from] helios_core::Error),

    #[error("io: {0}")]
    Io(#[from] helios_io::Error),
}

/// The result type for oracle operations.
pub type Result<T> = std::result::Result<T, Error>;
