//! Native contracts: built-ins addressed by fixed hashes with negative ids.
//!
//! Natives expose methods through a stub script that lands in
//! `System.Contract.CallNative`; their storage mutations are the only way
//! committee, policy and token state ever changes.

pub mod gas;
pub mod ledger;
pub mod management;
pub mod neo;
pub mod oracle;
pub mod policy;
pub mod role;

use once_cell::sync::Lazy;
use std::collections::HashMap;

use helios_core::UInt160;
use helios_crypto::ECPoint;
use helios_vm::{CallFlags, ScriptBuilder, StackItem, VmError};
use num_bigint::BigInt;
use num_traits::ToPrimitive;

use crate::application_engine::ApplicationEngine;
use crate::contract_state::{create_contract_hash, ContractState};
use crate::manifest::abi::{ContractMethod, ContractParameter, ParameterType};
use crate::manifest::ContractManifest;
use crate::nef::NefFile;
use crate::{interop, Error, Result};

/// One exported native method.
#[derive(Debug, Clone)]
pub struct NativeMethod {
    /// Exported name.
    pub name: &'static str,
    /// Number of parameters.
    pub params: usize,
    /// Price in fee units, scaled by the execution fee factor.
    pub price: i64,
    /// Flags the caller must hold.
    pub required_flags: CallFlags,
    /// Safe methods never mutate state.
    pub safe: bool,
}

impl NativeMethod {
    /// A read-only method.
    pub const fn safe(name: &'static str, params: usize, price: i64) -> Self {
        Self {
            name,
            params,
            price,
            required_flags: CallFlags::READ_STATES,
            safe: true,
        }
    }

    /// A state-mutating method.
    pub const fn unsafe_method(name: &'static str, params: usize, price: i64) -> Self {
        Self {
            name,
            params,
            price,
            required_flags: CallFlags::STATES,
            safe: false,
        }
    }
}

/// The interface every built-in contract implements.
pub trait NativeContract: Send + Sync {
    /// Fixed negative id.
    fn id(&self) -> i32;

    /// Contract name, also the seed of its fixed hash.
    fn name(&self) -> &'static str;

    /// Fixed contract hash.
    fn hash(&self) -> UInt160;

    /// The exported method table.
    fn methods(&self) -> &[NativeMethod];

    /// Dispatches one method call.
    fn invoke(
        &self,
        engine: &mut ApplicationEngine<'_>,
        method: &str,
        args: Vec<StackItem>,
    ) -> Result<StackItem>;

    /// Genesis hook.
    fn initialize(&self, _engine: &mut ApplicationEngine<'_>) -> Result<()> {
        Ok(())
    }

    /// Runs before a block's transactions.
    fn on_persist(&self, _engine: &mut ApplicationEngine<'_>) -> Result<()> {
        Ok(())
    }

    /// Runs after a block's transactions.
    fn post_persist(&self, _engine: &mut ApplicationEngine<'_>) -> Result<()> {
        Ok(())
    }

    /// Finds a method by name and arity.
    fn method(&self, name: &str, params: usize) -> Option<&NativeMethod> {
        self.methods()
            .iter()
            .find(|m| m.name == name && m.params == params)
    }
}

/// The fixed hash of a native contract: the user-contract address rule with
/// a zero sender and zero checksum.
pub fn native_hash(name: &str) -> UInt160 {
    create_contract_hash(&UInt160::zero(), 0, name)
}

/// All native contracts, addressable by hash and id.
pub struct NativeRegistry {
    contracts: Vec<Box<dyn NativeContract>>,
    by_hash: HashMap<UInt160, usize>,
    by_id: HashMap<i32, usize>,
    stub: Vec<u8>,
}

impl NativeRegistry {
    fn new() -> Self {
        let contracts: Vec<Box<dyn NativeContract>> = vec![
            Box::new(management::ContractManagement::new()),
            Box::new(ledger::LedgerContract::new()),
            Box::new(neo::NeoToken::new()),
            Box::new(gas::GasToken::new()),
            Box::new(policy::PolicyContract::new()),
            Box::new(role::RoleManagement::new()),
            Box::new(oracle::OracleContract::new()),
        ];
        let by_hash = contracts
            .iter()
            .enumerate()
            .map(|(index, c)| (c.hash(), index))
            .collect();
        let by_id = contracts
            .iter()
            .enumerate()
            .map(|(index, c)| (c.id(), index))
            .collect();
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(0);
        builder.emit_syscall(interop::ids::SYSTEM_CONTRACT_CALL_NATIVE);
        builder.emit(helios_vm::OpCode::RET);
        Self {
            contracts,
            by_hash,
            by_id,
            stub: builder.into_bytes(),
        }
    }

    /// The shared dispatch stub every native context executes.
    pub fn stub_script(&self) -> Vec<u8> {
        self.stub.clone()
    }

    /// All natives in registration order.
    pub fn all(&self) -> impl Iterator<Item = &dyn NativeContract> {
        self.contracts.iter().map(Box::as_ref)
    }

    /// Resolves by contract hash.
    pub fn by_hash(&self, hash: &UInt160) -> Option<&dyn NativeContract> {
        self.by_hash.get(hash).map(|&i| self.contracts[i].as_ref())
    }

    /// Resolves by contract id.
    pub fn by_id(&self, id: i32) -> Option<&dyn NativeContract> {
        self.by_id.get(&id).map(|&i| self.contracts[i].as_ref())
    }

    /// Builds the persisted contract state of one native.
    pub fn contract_state(&self, native: &dyn NativeContract) -> Result<ContractState> {
        let nef = NefFile::new("helios-native", self.stub.clone())?;
        let mut manifest = ContractManifest::new(native.name());
        manifest.abi.methods = native
            .methods()
            .iter()
            .map(|m| ContractMethod {
                name: m.name.to_string(),
                parameters: (0..m.params)
                    .map(|i| ContractParameter {
                        name: format!("arg{i}"),
                        parameter_type: ParameterType::Any,
                    })
                    .collect(),
                return_type: ParameterType::Any,
                offset: 0,
                safe: m.safe,
            })
            .collect();
        Ok(ContractState {
            id: native.id(),
            update_counter: 0,
            hash: native.hash(),
            nef,
            manifest,
        })
    }
}

static REGISTRY: Lazy<NativeRegistry> = Lazy::new(NativeRegistry::new);

/// The global native registry.
pub fn registry() -> &'static NativeRegistry {
    &REGISTRY
}

/// Persists native contract states and runs genesis hooks; called exactly
/// once, while importing the genesis block.
pub fn initialize_all(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let registry = registry();
    for index in 0..registry.contracts.len() {
        let native = registry.contracts[index].as_ref();
        let state = registry.contract_state(native)?;
        management::put_contract(engine.snapshot_mut(), &state)?;
    }
    for index in 0..registry.contracts.len() {
        registry.contracts[index].initialize(engine)?;
    }
    Ok(())
}

/// Runs every native's OnPersist hook.
pub fn on_persist_all(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let registry = registry();
    for index in 0..registry.contracts.len() {
        registry.contracts[index].on_persist(engine)?;
    }
    Ok(())
}

/// Runs every native's PostPersist hook.
pub fn post_persist_all(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let registry = registry();
    for index in 0..registry.contracts.len() {
        registry.contracts[index].post_persist(engine)?;
    }
    Ok(())
}

// ---- argument helpers shared by the native implementations ---------------

pub(crate) fn arg<'s>(args: &'s [StackItem], index: usize) -> Result<&'s StackItem> {
    args.get(index)
        .ok_or_else(|| Error::InvalidArgument(format!("missing argument {index}")))
}

pub(crate) fn arg_bytes(args: &[StackItem], index: usize) -> Result<Vec<u8>> {
    arg(args, index)?.to_bytes().map_err(Error::Vm)
}

pub(crate) fn arg_int(args: &[StackItem], index: usize) -> Result<BigInt> {
    arg(args, index)?.to_int().map_err(Error::Vm)
}

pub(crate) fn arg_i64(args: &[StackItem], index: usize) -> Result<i64> {
    arg_int(args, index)?
        .to_i64()
        .ok_or_else(|| Error::InvalidArgument(format!("argument {index} out of i64 range")))
}

pub(crate) fn arg_u32(args: &[StackItem], index: usize) -> Result<u32> {
    arg_int(args, index)?
        .to_u32()
        .ok_or_else(|| Error::InvalidArgument(format!("argument {index} out of u32 range")))
}

pub(crate) fn arg_u8(args: &[StackItem], index: usize) -> Result<u8> {
    arg_int(args, index)?
        .to_u8()
        .ok_or_else(|| Error::InvalidArgument(format!("argument {index} out of u8 range")))
}

pub(crate) fn arg_hash(args: &[StackItem], index: usize) -> Result<UInt160> {
    let bytes = arg_bytes(args, index)?;
    UInt160::from_bytes(&bytes).map_err(Error::Core)
}

pub(crate) fn arg_pubkey(args: &[StackItem], index: usize) -> Result<ECPoint> {
    let bytes = arg_bytes(args, index)?;
    ECPoint::from_bytes(&bytes).map_err(Error::Crypto)
}

pub(crate) fn arg_string(args: &[StackItem], index: usize) -> Result<String> {
    let bytes = arg_bytes(args, index)?;
    String::from_utf8(bytes)
        .map_err(|_| Error::InvalidArgument(format!("argument {index} is not UTF-8")))
}

pub(crate) fn arg_optional(args: &[StackItem], index: usize) -> Option<&StackItem> {
    args.get(index).filter(|item| !item.is_null())
}

pub(crate) fn arg_optional_string(args: &[StackItem], index: usize) -> Result<Option<String>> {
    arg_optional(args, index)
        .map(|item| {
            let bytes = item.to_bytes().map_err(Error::Vm)?;
            String::from_utf8(bytes)
                .map_err(|_| Error::InvalidArgument(format!("argument {index} is not UTF-8")))
        })
        .transpose()
}

pub(crate) fn unknown_method(native: &str, method: &str) -> Error {
    Error::MethodNotFound(format!("{native}::{method}"))
}

pub(crate) fn require_committee(engine: &ApplicationEngine<'_>) -> Result<()> {
    if engine.check_committee_witness()? {
        Ok(())
    } else {
        Err(Error::Vm(VmError::invalid_operation(
            "committee witness required",
        )))
    }
}

/// Encodes a boolean result.
pub(crate) fn bool_item(value: bool) -> StackItem {
    StackItem::Boolean(value)
}

/// Encodes an integer result.
pub(crate) fn int_item(value: impl Into<BigInt>) -> StackItem {
    StackItem::Integer(value.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_complete() {
        let registry = registry();
        let names: Vec<&str> = registry.all().map(|n| n.name()).collect();
        assert_eq!(
            names,
            vec![
                "ContractManagement",
                "LedgerContract",
                "NeoToken",
                "GasToken",
                "PolicyContract",
                "RoleManagement",
                "OracleContract",
            ]
        );
    }

    #[test]
    fn test_native_ids_are_negative_and_unique() {
        let registry = registry();
        let mut seen = std::collections::HashSet::new();
        for native in registry.all() {
            assert!(native.id() < 0, "{} id must be negative", native.name());
            assert!(seen.insert(native.id()));
        }
    }

    #[test]
    fn test_hashes_are_fixed_and_distinct() {
        let registry = registry();
        let mut seen = std::collections::HashSet::new();
        for native in registry.all() {
            assert_eq!(native.hash(), native_hash(native.name()));
            assert!(seen.insert(native.hash()));
        }
    }

    #[test]
    fn test_lookup_by_hash_and_id() {
        let registry = registry();
        let neo = registry.by_id(-5).unwrap();
        assert_eq!(neo.name(), "NeoToken");
        assert_eq!(
            registry.by_hash(&neo.hash()).unwrap().id(),
            neo.id()
        );
    }
}
