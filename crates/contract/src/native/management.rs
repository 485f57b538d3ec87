//! The ContractManagement native: deploy, update, destroy, lookup.

use helios_core::UInt160;
use helios_persistence::{DataCache, StorageItem, StorageKey};
use helios_vm::{CallFlags, StackItem};

use crate::application_engine::{ApplicationEngine, ScriptContainer, TriggerType};
use crate::contract_state::{check_deployment, create_contract_hash, ContractState};
use crate::manifest::ContractManifest;
use crate::native::{
    arg, arg_bytes, arg_hash, arg_optional, int_item, native_hash, require_committee,
    unknown_method, NativeContract, NativeMethod,
};
use crate::nef::NefFile;
use crate::{Error, Result};

/// Contract id of the Management native.
pub const ID: i32 = -1;

/// Default minimum deployment fee: 10 GAS.
pub const DEFAULT_MINIMUM_DEPLOYMENT_FEE: i64 = 10_0000_0000;

const PREFIX_CONTRACT: u8 = 8;
const PREFIX_CONTRACT_HASH: u8 = 12;
const KEY_NEXT_ID: u8 = 15;
const KEY_MINIMUM_DEPLOYMENT_FEE: u8 = 20;

fn contract_key(hash: &UInt160) -> StorageKey {
    StorageKey::with_suffix(ID, PREFIX_CONTRACT, hash.as_bytes())
}

fn id_key(id: i32) -> StorageKey {
    StorageKey::with_suffix(ID, PREFIX_CONTRACT_HASH, &id.to_be_bytes())
}

/// Reads a contract state by hash, native or deployed.
pub fn get_contract(snapshot: &DataCache<'_>, hash: &UInt160) -> Option<ContractState> {
    snapshot
        .try_get(&contract_key(hash))
        .and_then(|item| helios_io::from_bytes(&item.value).ok())
}

/// Reads a contract state by id.
pub fn get_contract_by_id(snapshot: &DataCache<'_>, id: i32) -> Option<ContractState> {
    let hash_bytes = snapshot.try_get(&id_key(id))?.value;
    let hash = UInt160::from_bytes(&hash_bytes).ok()?;
    get_contract(snapshot, &hash)
}

/// Persists a contract state and its id index.
pub fn put_contract(snapshot: &mut DataCache<'_>, state: &ContractState) -> Result<()> {
    let bytes = helios_io::to_bytes(state)?;
    snapshot.put(contract_key(&state.hash), StorageItem::new(bytes))?;
    snapshot.put(
        id_key(state.id),
        StorageItem::new(state.hash.to_vec()),
    )?;
    Ok(())
}

fn next_available_id(engine: &mut ApplicationEngine<'_>) -> Result<i32> {
    let current = engine
        .storage_get(ID, &[KEY_NEXT_ID])
        .and_then(|v| v.try_into().ok().map(i32::from_le_bytes))
        .unwrap_or(1);
    engine.storage_put(ID, &[KEY_NEXT_ID], (current + 1).to_le_bytes().to_vec())?;
    Ok(current)
}

fn minimum_deployment_fee(snapshot: &DataCache<'_>) -> i64 {
    snapshot
        .try_get(&StorageKey::from_prefix(ID, KEY_MINIMUM_DEPLOYMENT_FEE))
        .and_then(|item| item.value.try_into().ok().map(i64::from_le_bytes))
        .unwrap_or(DEFAULT_MINIMUM_DEPLOYMENT_FEE)
}

fn contract_to_item(state: &ContractState) -> StackItem {
    StackItem::new_array(vec![
        int_item(state.id),
        int_item(state.update_counter as i64),
        StackItem::from_bytes(state.hash.to_vec()),
        StackItem::from_bytes(state.nef.script.clone()),
        StackItem::from_bytes(state.manifest.to_json().unwrap_or_default()),
    ])
}

/// The ContractManagement native contract.
pub struct ContractManagement {
    hash: UInt160,
    methods: Vec<NativeMethod>,
}

impl ContractManagement {
    /// Creates the singleton instance.
    pub fn new() -> Self {
        Self {
            hash: native_hash("ContractManagement"),
            methods: vec![
                NativeMethod::safe("getContract", 1, 1 << 15),
                NativeMethod::safe("getContractById", 1, 1 << 15),
                NativeMethod::safe("getMinimumDeploymentFee", 0, 1 << 15),
                NativeMethod::unsafe_method("setMinimumDeploymentFee", 1, 1 << 15),
                NativeMethod {
                    name: "deploy",
                    params: 2,
                    price: 0,
                    required_flags: CallFlags::ALL,
                    safe: false,
                },
                NativeMethod {
                    name: "deploy",
                    params: 3,
                    price: 0,
                    required_flags: CallFlags::ALL,
                    safe: false,
                },
                NativeMethod {
                    name: "update",
                    params: 2,
                    price: 0,
                    required_flags: CallFlags::ALL,
                    safe: false,
                },
                NativeMethod {
                    name: "destroy",
                    params: 0,
                    price: 1 << 15,
                    required_flags: CallFlags::ALL,
                    safe: false,
                },
            ],
        }
    }

    fn deploy(
        &self,
        engine: &mut ApplicationEngine<'_>,
        nef_bytes: Vec<u8>,
        manifest_bytes: Vec<u8>,
        data: Option<StackItem>,
    ) -> Result<StackItem> {
        if engine.trigger() != TriggerType::Application {
            return Err(Error::Native("deploy requires Application trigger".into()));
        }
        let nef: NefFile = helios_io::from_bytes(&nef_bytes)?;
        let manifest = ContractManifest::from_json(&manifest_bytes)?;
        check_deployment(&nef, &manifest)?;

        let sender = match engine.container() {
            Some(ScriptContainer::Transaction(tx)) => tx
                .sender()
                .ok_or_else(|| Error::Native("deploying transaction has no sender".into()))?,
            _ => return Err(Error::Native("deploy outside a transaction".into())),
        };

        let fee = minimum_deployment_fee(engine.snapshot())
            + engine.storage_price() * (nef_bytes.len() + manifest_bytes.len()) as i64;
        engine.add_gas(fee)?;

        let hash = create_contract_hash(&sender, nef.checksum, &manifest.name);
        if get_contract(engine.snapshot(), &hash).is_some() {
            return Err(Error::Native(format!("contract {hash} already exists")));
        }
        let state = ContractState {
            id: next_available_id(engine)?,
            update_counter: 0,
            hash,
            nef,
            manifest,
        };
        put_contract(engine.snapshot_mut(), &state)?;

        engine.notify(
            "Deploy".into(),
            vec![StackItem::from_bytes(hash.to_vec())],
        )?;
        self.invoke_deploy_hook(engine, &state, data, false)?;
        Ok(contract_to_item(&state))
    }

    fn update(
        &self,
        engine: &mut ApplicationEngine<'_>,
        nef_bytes: Option<Vec<u8>>,
        manifest_bytes: Option<Vec<u8>>,
    ) -> Result<()> {
        let target = engine
            .calling_script_hash()
            .ok_or_else(|| Error::Native("update must be called by a contract".into()))?;
        let mut state = get_contract(engine.snapshot(), &target)
            .ok_or_else(|| Error::ContractNotFound(target.to_string()))?;
        if state.is_native() {
            return Err(Error::Native("native contracts cannot be updated".into()));
        }
        if nef_bytes.is_none() && manifest_bytes.is_none() {
            return Err(Error::Native("update with nothing to change".into()));
        }
        if let Some(bytes) = nef_bytes {
            state.nef = helios_io::from_bytes(&bytes)?;
        }
        if let Some(bytes) = manifest_bytes {
            let manifest = ContractManifest::from_json(&bytes)?;
            if manifest.name != state.manifest.name {
                return Err(Error::Native("updates cannot rename a contract".into()));
            }
            state.manifest = manifest;
        }
        check_deployment(&state.nef, &state.manifest)?;
        state.update_counter = state.update_counter.wrapping_add(1);
        put_contract(engine.snapshot_mut(), &state)?;

        engine.notify(
            "Update".into(),
            vec![StackItem::from_bytes(target.to_vec())],
        )?;
        self.invoke_deploy_hook(engine, &state, None, true)?;
        Ok(())
    }

    fn destroy(&self, engine: &mut ApplicationEngine<'_>) -> Result<()> {
        let target = engine
            .calling_script_hash()
            .ok_or_else(|| Error::Native("destroy must be called by a contract".into()))?;
        let Some(state) = get_contract(engine.snapshot(), &target) else {
            return Ok(());
        };
        if state.is_native() {
            return Err(Error::Native("native contracts cannot be destroyed".into()));
        }
        engine.snapshot_mut().delete(contract_key(&target))?;
        engine.snapshot_mut().delete(id_key(state.id))?;
        // The contract's storage dies with it.
        let keys: Vec<StorageKey> = engine
            .storage_find(state.id, &[])
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        for key in keys {
            engine.snapshot_mut().delete(key)?;
        }
        engine.notify(
            "Destroy".into(),
            vec![StackItem::from_bytes(target.to_vec())],
        )?;
        Ok(())
    }

    /// Calls `_deploy(data, is_update)` on the contract when it exports it.
    fn invoke_deploy_hook(
        &self,
        engine: &mut ApplicationEngine<'_>,
        state: &ContractState,
        data: Option<StackItem>,
        is_update: bool,
    ) -> Result<()> {
        if state.manifest.abi.get_method("_deploy", 2).is_none() {
            return Ok(());
        }
        engine.call_contract(
            state.hash,
            "_deploy",
            vec![data.unwrap_or(StackItem::Null), StackItem::Boolean(is_update)],
            CallFlags::ALL,
            true,
        )
    }

    fn set_minimum_deployment_fee(
        &self,
        engine: &mut ApplicationEngine<'_>,
        value: i64,
    ) -> Result<()> {
        require_committee(engine)?;
        if value < 0 {
            return Err(Error::Native("deployment fee cannot be negative".into()));
        }
        engine.storage_put(
            ID,
            &[KEY_MINIMUM_DEPLOYMENT_FEE],
            value.to_le_bytes().to_vec(),
        )
    }
}

impl Default for ContractManagement {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for ContractManagement {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "ContractManagement"
    }

    fn hash(&self) -> UInt160 {
        self.hash
    }

    fn methods(&self) -> &[NativeMethod] {
        &self.methods
    }

    fn invoke(
        &self,
        engine: &mut ApplicationEngine<'_>,
        method: &str,
        args: Vec<StackItem>,
    ) -> Result<StackItem> {
        match (method, args.len()) {
            ("getContract", 1) => {
                let hash = arg_hash(&args, 0)?;
                Ok(match get_contract(engine.snapshot(), &hash) {
                    Some(state) => contract_to_item(&state),
                    None => StackItem::Null,
                })
            }
            ("getContractById", 1) => {
                use num_traits::ToPrimitive;
                let id = arg(&args, 0)?
                    .to_int()
                    .map_err(Error::Vm)?
                    .to_i32()
                    .ok_or_else(|| Error::InvalidArgument("contract id out of range".into()))?;
                Ok(match get_contract_by_id(engine.snapshot(), id) {
                    Some(state) => contract_to_item(&state),
                    None => StackItem::Null,
                })
            }
            ("getMinimumDeploymentFee", 0) => {
                Ok(int_item(minimum_deployment_fee(engine.snapshot())))
            }
            ("setMinimumDeploymentFee", 1) => {
                let value = crate::native::arg_i64(&args, 0)?;
                self.set_minimum_deployment_fee(engine, value)?;
                Ok(StackItem::Null)
            }
            ("deploy", 2) | ("deploy", 3) => {
                let nef = arg_bytes(&args, 0)?;
                let manifest = arg_bytes(&args, 1)?;
                let data = arg_optional(&args, 2).cloned();
                self.deploy(engine, nef, manifest, data)
            }
            ("update", 2) => {
                let nef = arg_optional(&args, 0)
                    .map(|item| item.to_bytes().map_err(Error::Vm))
                    .transpose()?;
                let manifest = arg_optional(&args, 1)
                    .map(|item| item.to_bytes().map_err(Error::Vm))
                    .transpose()?;
                self.update(engine, nef, manifest)?;
                Ok(StackItem::Null)
            }
            ("destroy", 0) => {
                self.destroy(engine)?;
                Ok(StackItem::Null)
            }
            _ => Err(unknown_method("ContractManagement", method)),
        }
    }
}
