//! Application engine, interop services and native contracts.
//!
//! This crate hosts everything the VM needs from the chain: the
//! [`ApplicationEngine`] that meters gas and dispatches syscalls, the interop
//! registry, contract deployment artifacts (NEF + manifest) and the built-in
//! native contracts whose storage is the only way protocol state changes.

pub mod application_engine;
pub mod contract;
pub mod contract_state;
pub mod interop;
pub mod manifest;
pub mod native;
pub mod nef;

pub use application_engine::{
    ApplicationEngine, LogEvent, NotificationEvent, ScriptContainer, TriggerType,
};
pub use contract::{
    committee_address, create_multisig_redeem_script, create_signature_redeem_script,
    multisig_threshold, parse_multisig_script, signature_address, validators_address,
    validators_threshold,
};
pub use contract_state::ContractState;
pub use manifest::ContractManifest;
pub use nef::NefFile;

/// Errors raised while executing scripts or native contract methods.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Vm(#[from] helios_vm::VmError),

    #[error("storage: {0}")]
    Storage(#[from] helios_persistence::Error),

    #[error("io: {0}")]
    Io(#[from] helios_io::Error),

    #[error("crypto: {0}")]
    Crypto(#[from] helios_crypto::Error),

    #[error("core: {0}")]
    Core(#[from] helios_core::Error),

    #[error("contract not found: {0}")]
    ContractNotFound(String),

    #[error("method not found: {0}")]
    MethodNotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid nef: {0}")]
    InvalidNef(String),

    #[error("native contract error: {0}")]
    Native(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Collapses any error into the reason string a FAULT reports.
    pub fn fault_reason(&self) -> String {
        self.to_string()
    }
}

/// The result type for contract execution.
pub type Result<T> = std::result::Result<T, Error>;
