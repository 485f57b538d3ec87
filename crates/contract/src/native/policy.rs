//! The Policy native contract: fees, prices and blocked accounts.

use helios_core::UInt160;
use helios_persistence::DataCache;
use helios_vm::StackItem;

use crate::application_engine::ApplicationEngine;
use crate::native::{
    arg_hash, arg_i64, arg_u32, bool_item, int_item, native_hash, require_committee,
    unknown_method, NativeContract, NativeMethod,
};
use crate::{Error, Result};

/// Contract id of the Policy native.
pub const ID: i32 = -7;

/// Default network fee per transaction byte, in datoshi.
pub const DEFAULT_FEE_PER_BYTE: i64 = 1000;
/// Default execution fee factor.
pub const DEFAULT_EXEC_FEE_FACTOR: u32 = 30;
/// Default storage price per byte, in datoshi.
pub const DEFAULT_STORAGE_PRICE: u32 = 100_000;

const KEY_FEE_PER_BYTE: u8 = 10;
const KEY_EXEC_FEE_FACTOR: u8 = 18;
const KEY_STORAGE_PRICE: u8 = 19;
const PREFIX_BLOCKED_ACCOUNT: u8 = 15;

fn read_i64(snapshot: &DataCache<'_>, key: u8, default: i64) -> i64 {
    snapshot
        .try_get(&helios_persistence::StorageKey::from_prefix(ID, key))
        .and_then(|item| item.value.try_into().ok().map(i64::from_le_bytes))
        .unwrap_or(default)
}

fn read_u32(snapshot: &DataCache<'_>, key: u8, default: u32) -> u32 {
    snapshot
        .try_get(&helios_persistence::StorageKey::from_prefix(ID, key))
        .and_then(|item| item.value.try_into().ok().map(u32::from_le_bytes))
        .unwrap_or(default)
}

/// The network fee per byte currently in force.
pub fn fee_per_byte(snapshot: &DataCache<'_>) -> i64 {
    read_i64(snapshot, KEY_FEE_PER_BYTE, DEFAULT_FEE_PER_BYTE)
}

/// The execution fee factor currently in force.
pub fn exec_fee_factor(snapshot: &DataCache<'_>) -> i64 {
    read_u32(snapshot, KEY_EXEC_FEE_FACTOR, DEFAULT_EXEC_FEE_FACTOR) as i64
}

/// The storage price per byte currently in force.
pub fn storage_price(snapshot: &DataCache<'_>) -> i64 {
    read_u32(snapshot, KEY_STORAGE_PRICE, DEFAULT_STORAGE_PRICE) as i64
}

/// True when `account` is on the blocked list.
pub fn is_blocked(snapshot: &DataCache<'_>, account: &UInt160) -> bool {
    snapshot.contains(&helios_persistence::StorageKey::with_suffix(
        ID,
        PREFIX_BLOCKED_ACCOUNT,
        account.as_bytes(),
    ))
}

/// The Policy native contract.
pub struct PolicyContract {
    hash: UInt160,
    methods: Vec<NativeMethod>,
}

impl PolicyContract {
    /// Creates the singleton instance.
    pub fn new() -> Self {
        Self {
            hash: native_hash("PolicyContract"),
            methods: vec![
                NativeMethod::safe("getFeePerByte", 0, 1 << 15),
                NativeMethod::unsafe_method("setFeePerByte", 1, 1 << 15),
                NativeMethod::safe("getExecFeeFactor", 0, 1 << 15),
                NativeMethod::unsafe_method("setExecFeeFactor", 1, 1 << 15),
                NativeMethod::safe("getStoragePrice", 0, 1 << 15),
                NativeMethod::unsafe_method("setStoragePrice", 1, 1 << 15),
                NativeMethod::safe("isBlocked", 1, 1 << 15),
                NativeMethod::unsafe_method("blockAccount", 1, 1 << 15),
                NativeMethod::unsafe_method("unblockAccount", 1, 1 << 15),
            ],
        }
    }

    fn set_fee_per_byte(&self, engine: &mut ApplicationEngine<'_>, value: i64) -> Result<()> {
        require_committee(engine)?;
        if !(0..=100_000_000).contains(&value) {
            return Err(Error::Native(format!("fee per byte {value} out of range")));
        }
        engine.storage_put(ID, &[KEY_FEE_PER_BYTE], value.to_le_bytes().to_vec())
    }

    fn set_exec_fee_factor(&self, engine: &mut ApplicationEngine<'_>, value: u32) -> Result<()> {
        require_committee(engine)?;
        if value == 0 || value > 100 {
            return Err(Error::Native(format!(
                "exec fee factor {value} out of range"
            )));
        }
        engine.storage_put(ID, &[KEY_EXEC_FEE_FACTOR], value.to_le_bytes().to_vec())
    }

    fn set_storage_price(&self, engine: &mut ApplicationEngine<'_>, value: u32) -> Result<()> {
        require_committee(engine)?;
        if value == 0 || value > 10_000_000 {
            return Err(Error::Native(format!("storage price {value} out of range")));
        }
        engine.storage_put(ID, &[KEY_STORAGE_PRICE], value.to_le_bytes().to_vec())
    }

    fn block_account(&self, engine: &mut ApplicationEngine<'_>, account: UInt160) -> Result<bool> {
        require_committee(engine)?;
        if engine.natives().by_hash(&account).is_some() {
            return Err(Error::Native("cannot block a native contract".into()));
        }
        let key = [&[PREFIX_BLOCKED_ACCOUNT][..], account.as_bytes()].concat();
        if engine.storage_get(ID, &key).is_some() {
            return Ok(false);
        }
        engine.storage_put(ID, &key, Vec::new())?;
        Ok(true)
    }

    fn unblock_account(
        &self,
        engine: &mut ApplicationEngine<'_>,
        account: UInt160,
    ) -> Result<bool> {
        require_committee(engine)?;
        let key = [&[PREFIX_BLOCKED_ACCOUNT][..], account.as_bytes()].concat();
        if engine.storage_get(ID, &key).is_none() {
            return Ok(false);
        }
        engine.storage_delete(ID, &key)?;
        Ok(true)
    }
}

impl Default for PolicyContract {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for PolicyContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "PolicyContract"
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
        match method {
            "getFeePerByte" => Ok(int_item(fee_per_byte(engine.snapshot()))),
            "getExecFeeFactor" => Ok(int_item(exec_fee_factor(engine.snapshot()))),
            "getStoragePrice" => Ok(int_item(storage_price(engine.snapshot()))),
            "setFeePerByte" => {
                self.set_fee_per_byte(engine, arg_i64(&args, 0)?)?;
                Ok(StackItem::Null)
            }
            "setExecFeeFactor" => {
                self.set_exec_fee_factor(engine, arg_u32(&args, 0)?)?;
                Ok(StackItem::Null)
            }
            "setStoragePrice" => {
                self.set_storage_price(engine, arg_u32(&args, 0)?)?;
                Ok(StackItem::Null)
            }
            "isBlocked" => Ok(bool_item(is_blocked(
                engine.snapshot(),
                &arg_hash(&args, 0)?,
            ))),
            "blockAccount" => {
                let changed = self.block_account(engine, arg_hash(&args, 0)?)?;
                Ok(bool_item(changed))
            }
            "unblockAccount" => {
                let changed = self.unblock_account(engine, arg_hash(&args, 0)?)?;
                Ok(bool_item(changed))
            }
            other => Err(unknown_method("PolicyContract", other)),
        }
    }
}
