//! The named syscall table.
//!
//! Every syscall has a 4-byte id derived from its name, a price in fee
//! units, a required call-flag mask and a handler. The SYSCALL opcode lands
//! in [`lookup`]; unknown ids, missing flags and insufficient gas all fault.

pub mod contract;
pub mod crypto;
pub mod iterator;
pub mod runtime;
pub mod storage;

use once_cell::sync::Lazy;
use std::collections::HashMap;

use helios_crypto::sha256;
use helios_vm::CallFlags;

use crate::application_engine::ApplicationEngine;
use crate::Result;

/// Computes a syscall id: the first four bytes of sha256(name), little-endian.
pub fn syscall_id(name: &str) -> u32 {
    let digest = sha256(name.as_bytes());
    u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Well-known syscall ids, precomputed from their names.
pub mod ids {
    pub const SYSTEM_CONTRACT_CALL: u32 = 0x525b7d62;
    pub const SYSTEM_CONTRACT_CALL_NATIVE: u32 = 0x677bf71a;
    pub const SYSTEM_CONTRACT_GET_CALL_FLAGS: u32 = 0x813ada95;
    pub const SYSTEM_CRYPTO_CHECK_SIG: u32 = 0x27b3e756;
    pub const SYSTEM_CRYPTO_CHECK_MULTISIG: u32 = 0x3adcd09e;
    pub const SYSTEM_ITERATOR_NEXT: u32 = 0x9ced089c;
    pub const SYSTEM_ITERATOR_VALUE: u32 = 0x1dbf54f3;
    pub const SYSTEM_RUNTIME_PLATFORM: u32 = 0xf6fc79b2;
    pub const SYSTEM_RUNTIME_GET_NETWORK: u32 = 0xe0a0fbc5;
    pub const SYSTEM_RUNTIME_GET_TRIGGER: u32 = 0xa0387de9;
    pub const SYSTEM_RUNTIME_GET_TIME: u32 = 0x0388c3b7;
    pub const SYSTEM_RUNTIME_GET_SCRIPT_CONTAINER: u32 = 0x3008512d;
    pub const SYSTEM_RUNTIME_GET_EXECUTING_SCRIPT_HASH: u32 = 0x74a8fedb;
    pub const SYSTEM_RUNTIME_GET_CALLING_SCRIPT_HASH: u32 = 0x3c6e5339;
    pub const SYSTEM_RUNTIME_GET_ENTRY_SCRIPT_HASH: u32 = 0x38e2b4f9;
    pub const SYSTEM_RUNTIME_CHECK_WITNESS: u32 = 0x8cec27f8;
    pub const SYSTEM_RUNTIME_LOG: u32 = 0x9647e7cf;
    pub const SYSTEM_RUNTIME_NOTIFY: u32 = 0x616f0195;
    pub const SYSTEM_RUNTIME_GAS_LEFT: u32 = 0xced88814;
    pub const SYSTEM_STORAGE_GET_CONTEXT: u32 = 0xce67f69b;
    pub const SYSTEM_STORAGE_GET_READ_ONLY_CONTEXT: u32 = 0xe26bb4f6;
    pub const SYSTEM_STORAGE_AS_READ_ONLY: u32 = 0xe9bf4c76;
    pub const SYSTEM_STORAGE_GET: u32 = 0x31e85d92;
    pub const SYSTEM_STORAGE_PUT: u32 = 0x84183fe6;
    pub const SYSTEM_STORAGE_DELETE: u32 = 0xedc5582f;
    pub const SYSTEM_STORAGE_FIND: u32 = 0x9ab830df;
}

/// The handler signature shared by every syscall.
pub type InteropHandler = fn(&mut ApplicationEngine<'_>) -> Result<()>;

/// One registered syscall.
pub struct InteropDescriptor {
    /// The dotted name.
    pub name: &'static str,
    /// The 4-byte id.
    pub id: u32,
    /// Base price in fee units, scaled by the execution fee factor.
    pub price: i64,
    /// Flags the calling context must hold.
    pub required_flags: CallFlags,
    /// The implementation.
    pub handler: InteropHandler,
}

macro_rules! descriptor {
    ($name:expr, $id:expr, $price:expr, $flags:expr, $handler:expr) => {
        InteropDescriptor {
            name: $name,
            id: $id,
            price: $price,
            required_flags: $flags,
            handler: $handler,
        }
    };
}

static REGISTRY: Lazy<HashMap<u32, InteropDescriptor>> = Lazy::new(|| {
    use ids::*;
    let descriptors = vec![
        descriptor!(
            "System.Contract.Call",
            SYSTEM_CONTRACT_CALL,
            1 << 15,
            CallFlags::READ_STATES | CallFlags::ALLOW_CALL,
            contract::call as InteropHandler
        ),
        descriptor!(
            "System.Contract.CallNative",
            SYSTEM_CONTRACT_CALL_NATIVE,
            0,
            CallFlags::empty(),
            contract::call_native
        ),
        descriptor!(
            "System.Contract.GetCallFlags",
            SYSTEM_CONTRACT_GET_CALL_FLAGS,
            1 << 10,
            CallFlags::empty(),
            contract::get_call_flags
        ),
        descriptor!(
            "System.Crypto.CheckSig",
            SYSTEM_CRYPTO_CHECK_SIG,
            1 << 15,
            CallFlags::empty(),
            crypto::check_sig
        ),
        descriptor!(
            "System.Crypto.CheckMultisig",
            SYSTEM_CRYPTO_CHECK_MULTISIG,
            0,
            CallFlags::empty(),
            crypto::check_multisig
        ),
        descriptor!(
            "System.Iterator.Next",
            SYSTEM_ITERATOR_NEXT,
            1 << 15,
            CallFlags::empty(),
            iterator::next
        ),
        descriptor!(
            "System.Iterator.Value",
            SYSTEM_ITERATOR_VALUE,
            1 << 4,
            CallFlags::empty(),
            iterator::value
        ),
        descriptor!(
            "System.Runtime.Platform",
            SYSTEM_RUNTIME_PLATFORM,
            1 << 3,
            CallFlags::empty(),
            runtime::platform
        ),
        descriptor!(
            "System.Runtime.GetNetwork",
            SYSTEM_RUNTIME_GET_NETWORK,
            1 << 3,
            CallFlags::empty(),
            runtime::get_network
        ),
        descriptor!(
            "System.Runtime.GetTrigger",
            SYSTEM_RUNTIME_GET_TRIGGER,
            1 << 3,
            CallFlags::empty(),
            runtime::get_trigger
        ),
        descriptor!(
            "System.Runtime.GetTime",
            SYSTEM_RUNTIME_GET_TIME,
            1 << 3,
            CallFlags::empty(),
            runtime::get_time
        ),
        descriptor!(
            "System.Runtime.GetScriptContainer",
            SYSTEM_RUNTIME_GET_SCRIPT_CONTAINER,
            1 << 3,
            CallFlags::empty(),
            runtime::get_script_container
        ),
        descriptor!(
            "System.Runtime.GetExecutingScriptHash",
            SYSTEM_RUNTIME_GET_EXECUTING_SCRIPT_HASH,
            1 << 4,
            CallFlags::empty(),
            runtime::get_executing_script_hash
        ),
        descriptor!(
            "System.Runtime.GetCallingScriptHash",
            SYSTEM_RUNTIME_GET_CALLING_SCRIPT_HASH,
            1 << 4,
            CallFlags::empty(),
            runtime::get_calling_script_hash
        ),
        descriptor!(
            "System.Runtime.GetEntryScriptHash",
            SYSTEM_RUNTIME_GET_ENTRY_SCRIPT_HASH,
            1 << 4,
            CallFlags::empty(),
            runtime::get_entry_script_hash
        ),
        descriptor!(
            "System.Runtime.CheckWitness",
            SYSTEM_RUNTIME_CHECK_WITNESS,
            1 << 10,
            CallFlags::empty(),
            runtime::check_witness
        ),
        descriptor!(
            "System.Runtime.Log",
            SYSTEM_RUNTIME_LOG,
            1 << 15,
            CallFlags::ALLOW_NOTIFY,
            runtime::log
        ),
        descriptor!(
            "System.Runtime.Notify",
            SYSTEM_RUNTIME_NOTIFY,
            1 << 15,
            CallFlags::ALLOW_NOTIFY,
            runtime::notify
        ),
        descriptor!(
            "System.Runtime.GasLeft",
            SYSTEM_RUNTIME_GAS_LEFT,
            1 << 4,
            CallFlags::empty(),
            runtime::gas_left
        ),
        descriptor!(
            "System.Storage.GetContext",
            SYSTEM_STORAGE_GET_CONTEXT,
            1 << 4,
            CallFlags::READ_STATES,
            storage::get_context
        ),
        descriptor!(
            "System.Storage.GetReadOnlyContext",
            SYSTEM_STORAGE_GET_READ_ONLY_CONTEXT,
            1 << 4,
            CallFlags::READ_STATES,
            storage::get_read_only_context
        ),
        descriptor!(
            "System.Storage.AsReadOnly",
            SYSTEM_STORAGE_AS_READ_ONLY,
            1 << 4,
            CallFlags::READ_STATES,
            storage::as_read_only
        ),
        descriptor!(
            "System.Storage.Get",
            SYSTEM_STORAGE_GET,
            1 << 15,
            CallFlags::READ_STATES,
            storage::get
        ),
        descriptor!(
            "System.Storage.Put",
            SYSTEM_STORAGE_PUT,
            1 << 15,
            CallFlags::WRITE_STATES,
            storage::put
        ),
        descriptor!(
            "System.Storage.Delete",
            SYSTEM_STORAGE_DELETE,
            1 << 15,
            CallFlags::WRITE_STATES,
            storage::delete
        ),
        descriptor!(
            "System.Storage.Find",
            SYSTEM_STORAGE_FIND,
            1 << 15,
            CallFlags::READ_STATES,
            storage::find
        ),
    ];
    descriptors.into_iter().map(|d| (d.id, d)).collect()
});

/// Resolves a syscall id.
pub fn lookup(id: u32) -> Option<&'static InteropDescriptor> {
    REGISTRY.get(&id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_match_their_names() {
        for descriptor in REGISTRY.values() {
            assert_eq!(
                descriptor.id,
                syscall_id(descriptor.name),
                "id mismatch for {}",
                descriptor.name
            );
        }
    }

    #[test]
    fn test_minimum_syscall_set_present() {
        for name in [
            "System.Contract.Call",
            "System.Contract.CallNative",
            "System.Storage.GetContext",
            "System.Storage.Get",
            "System.Storage.Put",
            "System.Storage.Delete",
            "System.Storage.Find",
            "System.Runtime.Notify",
            "System.Runtime.Log",
            "System.Runtime.CheckWitness",
            "System.Runtime.GetTrigger",
            "System.Runtime.GetTime",
            "System.Runtime.GasLeft",
            "System.Runtime.GetScriptContainer",
            "System.Crypto.CheckSig",
            "System.Crypto.CheckMultisig",
            "System.Iterator.Next",
            "System.Iterator.Value",
        ] {
            assert!(lookup(syscall_id(name)).is_some(), "missing {name}");
        }
    }

    #[test]
    fn test_write_syscalls_require_write_flags() {
        let put = lookup(ids::SYSTEM_STORAGE_PUT).unwrap();
        assert!(put.required_flags.contains(CallFlags::WRITE_STATES));
        let get = lookup(ids::SYSTEM_STORAGE_GET).unwrap();
        assert!(get.required_flags.contains(CallFlags::READ_STATES));
    }
}
