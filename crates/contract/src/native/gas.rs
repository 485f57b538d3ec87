//! The GAS utility token.

use helios_core::UInt160;
use helios_persistence::{DataCache, StorageKey};
use helios_vm::StackItem;

use crate::application_engine::ApplicationEngine;
use crate::native::{
    arg, arg_hash, arg_i64, bool_item, int_item, native_hash, neo, unknown_method,
    NativeContract, NativeMethod,
};
use crate::{Error, Result};

/// Contract id of the GAS native.
pub const ID: i32 = -6;

/// GAS uses 8 decimals.
pub const DECIMALS: u32 = 8;

const PREFIX_BALANCE: u8 = 20;
const KEY_TOTAL_SUPPLY: u8 = 11;

fn balance_key(account: &UInt160) -> StorageKey {
    StorageKey::with_suffix(ID, PREFIX_BALANCE, account.as_bytes())
}

/// The GAS balance of an account, in datoshi.
pub fn balance_of(snapshot: &DataCache<'_>, account: &UInt160) -> i64 {
    snapshot
        .try_get(&balance_key(account))
        .and_then(|item| item.value.try_into().ok().map(i64::from_le_bytes))
        .unwrap_or(0)
}

/// Total GAS in circulation, in datoshi.
pub fn total_supply(snapshot: &DataCache<'_>) -> i64 {
    snapshot
        .try_get(&StorageKey::from_prefix(ID, KEY_TOTAL_SUPPLY))
        .and_then(|item| item.value.try_into().ok().map(i64::from_le_bytes))
        .unwrap_or(0)
}

fn write_balance(engine: &mut ApplicationEngine<'_>, account: &UInt160, value: i64) -> Result<()> {
    let key = [&[PREFIX_BALANCE][..], account.as_bytes()].concat();
    if value == 0 {
        engine.storage_delete(ID, &key)
    } else {
        engine.storage_put(ID, &key, value.to_le_bytes().to_vec())
    }
}

fn write_total_supply(engine: &mut ApplicationEngine<'_>, value: i64) -> Result<()> {
    engine.storage_put(ID, &[KEY_TOTAL_SUPPLY], value.to_le_bytes().to_vec())
}

/// Creates GAS out of thin air; reserved for reward distribution.
pub fn mint(engine: &mut ApplicationEngine<'_>, account: &UInt160, amount: i64) -> Result<()> {
    if amount < 0 {
        return Err(Error::Native("cannot mint a negative amount".into()));
    }
    if amount == 0 {
        return Ok(());
    }
    let balance = balance_of(engine.snapshot(), account);
    write_balance(engine, account, balance + amount)?;
    let supply = total_supply(engine.snapshot());
    write_total_supply(engine, supply + amount)?;
    engine.notify(
        "Transfer".into(),
        vec![
            StackItem::Null,
            StackItem::from_bytes(account.to_vec()),
            int_item(amount),
        ],
    )
}

/// Destroys GAS; used for fees and candidate registration.
pub fn burn(engine: &mut ApplicationEngine<'_>, account: &UInt160, amount: i64) -> Result<()> {
    if amount < 0 {
        return Err(Error::Native("cannot burn a negative amount".into()));
    }
    if amount == 0 {
        return Ok(());
    }
    let balance = balance_of(engine.snapshot(), account);
    if balance < amount {
        return Err(Error::Native(format!(
            "insufficient GAS: have {balance}, burning {amount}"
        )));
    }
    write_balance(engine, account, balance - amount)?;
    let supply = total_supply(engine.snapshot());
    write_total_supply(engine, supply - amount)?;
    engine.notify(
        "Transfer".into(),
        vec![
            StackItem::from_bytes(account.to_vec()),
            StackItem::Null,
            int_item(amount),
        ],
    )
}

/// The GAS native contract.
pub struct GasToken {
    hash: UInt160,
    methods: Vec<NativeMethod>,
}

impl GasToken {
    /// Creates the singleton instance.
    pub fn new() -> Self {
        Self {
            hash: native_hash("GasToken"),
            methods: vec![
                NativeMethod::safe("symbol", 0, 1),
                NativeMethod::safe("decimals", 0, 1),
                NativeMethod::safe("totalSupply", 0, 1 << 15),
                NativeMethod::safe("balanceOf", 1, 1 << 15),
                NativeMethod::unsafe_method("transfer", 4, 1 << 17),
            ],
        }
    }

    fn transfer(
        &self,
        engine: &mut ApplicationEngine<'_>,
        from: UInt160,
        to: UInt160,
        amount: i64,
    ) -> Result<bool> {
        if amount < 0 {
            return Err(Error::Native("cannot transfer a negative amount".into()));
        }
        if !engine.check_witness(&from)? {
            return Ok(false);
        }
        let from_balance = balance_of(engine.snapshot(), &from);
        if from_balance < amount {
            return Ok(false);
        }
        if from != to && amount > 0 {
            write_balance(engine, &from, from_balance - amount)?;
            let to_balance = balance_of(engine.snapshot(), &to);
            write_balance(engine, &to, to_balance + amount)?;
        }
        engine.notify(
            "Transfer".into(),
            vec![
                StackItem::from_bytes(from.to_vec()),
                StackItem::from_bytes(to.to_vec()),
                int_item(amount),
            ],
        )?;
        Ok(true)
    }
}

impl Default for GasToken {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for GasToken {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "GasToken"
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
            "symbol" => Ok(StackItem::from_bytes(b"GAS".to_vec())),
            "decimals" => Ok(int_item(DECIMALS)),
            "totalSupply" => Ok(int_item(total_supply(engine.snapshot()))),
            "balanceOf" => Ok(int_item(balance_of(
                engine.snapshot(),
                &arg_hash(&args, 0)?,
            ))),
            "transfer" => {
                let from = arg_hash(&args, 0)?;
                let to = arg_hash(&args, 1)?;
                let amount = arg_i64(&args, 2)?;
                let _data = arg(&args, 3)?;
                let ok = self.transfer(engine, from, to, amount)?;
                Ok(bool_item(ok))
            }
            other => Err(unknown_method("GasToken", other)),
        }
    }

    fn initialize(&self, engine: &mut ApplicationEngine<'_>) -> Result<()> {
        let distribution = engine.settings().initial_gas_distribution;
        let committee = neo::committee_keys(engine.snapshot(), engine.settings())?;
        let address = crate::contract::committee_address(&committee)?;
        mint(engine, &address, distribution)
    }

    fn on_persist(&self, engine: &mut ApplicationEngine<'_>) -> Result<()> {
        // Fees are burned up front; execution failure keeps the burn.
        let Some(block) = engine.persisting_block().cloned() else {
            return Ok(());
        };
        for tx in &block.transactions {
            let Some(sender) = tx.sender() else { continue };
            burn(engine, &sender, tx.system_fee + tx.network_fee)?;
        }
        Ok(())
    }

    fn post_persist(&self, engine: &mut ApplicationEngine<'_>) -> Result<()> {
        let Some(block) = engine.persisting_block().cloned() else {
            return Ok(());
        };
        let total_network_fee: i64 = block.transactions.iter().map(|tx| tx.network_fee).sum();
        if total_network_fee == 0 {
            return Ok(());
        }
        let validators = neo::next_block_validators(engine.snapshot(), engine.settings())?;
        if validators.is_empty() {
            return Ok(());
        }
        let primary = validators[block.header.primary as usize % validators.len()];
        let address = crate::contract::signature_address(&primary);
        mint(engine, &address, total_network_fee)
    }
}
