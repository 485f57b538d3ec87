//! The Ledger native: a read-only view over persisted chain data.

use helios_config::MAX_TRACEABLE_BLOCKS;
use helios_core::{Block, Header, Transaction, UInt256};
use helios_io::{BinaryWriter, MemoryReader, Serializable};
use helios_persistence::{DataCache, StorageItem, StorageKey};
use helios_vm::StackItem;

use crate::application_engine::ApplicationEngine;
use crate::native::{arg_bytes, int_item, native_hash, unknown_method, NativeContract, NativeMethod};
use crate::Result;

/// Contract id of the Ledger native.
pub const ID: i32 = -4;

const KEY_CURRENT: u8 = 12;
const PREFIX_BLOCK_HASH_BY_INDEX: u8 = 9;
const PREFIX_BLOCK: u8 = 5;
const PREFIX_TRANSACTION: u8 = 11;

/// Execution outcome persisted with each transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionState {
    /// Height of the block containing the transaction.
    pub block_index: u32,
    /// Final VM state byte: 1 = HALT, 2 = FAULT.
    pub vm_state: u8,
    /// The transaction itself.
    pub transaction: Transaction,
}

impl Serializable for TransactionState {
    fn size(&self) -> usize {
        4 + 1 + self.transaction.size()
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_u32(self.block_index)?;
        writer.write_u8(self.vm_state)?;
        writer.write_serializable(&self.transaction)
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let block_index = reader.read_u32()?;
        let vm_state = reader.read_u8()?;
        let transaction = reader.read_serializable()?;
        Ok(Self {
            block_index,
            vm_state,
            transaction,
        })
    }
}

/// A block stored without transaction bodies.
#[derive(Debug, Clone)]
pub struct TrimmedBlock {
    /// The header.
    pub header: Header,
    /// Hashes of the block's transactions, in order.
    pub hashes: Vec<UInt256>,
}

impl Serializable for TrimmedBlock {
    fn size(&self) -> usize {
        self.header.size()
            + helios_io::serializable::var_int_size(self.hashes.len() as u64)
            + self.hashes.len() * UInt256::SIZE
    }

    fn serialize(&self, writer: &mut BinaryWriter) -> helios_io::Result<()> {
        writer.write_serializable(&self.header)?;
        writer.write_serializable_list(&self.hashes)
    }

    fn deserialize(reader: &mut MemoryReader) -> helios_io::Result<Self> {
        let header = reader.read_serializable()?;
        let hashes = reader.read_serializable_list(helios_config::MAX_TRANSACTIONS_PER_BLOCK)?;
        Ok(Self { header, hashes })
    }
}

// ---- storage helpers shared with the import pipeline ----------------------

/// The current chain tip, if any block was persisted.
pub fn current_hash_and_index(snapshot: &DataCache<'_>) -> Option<(UInt256, u32)> {
    let value = snapshot
        .try_get(&StorageKey::from_prefix(ID, KEY_CURRENT))?
        .value;
    if value.len() != UInt256::SIZE + 4 {
        return None;
    }
    let hash = UInt256::from_bytes(&value[..UInt256::SIZE]).ok()?;
    let index = u32::from_le_bytes([
        value[UInt256::SIZE],
        value[UInt256::SIZE + 1],
        value[UInt256::SIZE + 2],
        value[UInt256::SIZE + 3],
    ]);
    Some((hash, index))
}

/// The current chain height.
pub fn current_index(snapshot: &DataCache<'_>) -> Option<u32> {
    current_hash_and_index(snapshot).map(|(_, index)| index)
}

/// The block hash at `index`.
pub fn block_hash_at(snapshot: &DataCache<'_>, index: u32) -> Option<UInt256> {
    let value = snapshot
        .try_get(&StorageKey::with_suffix(
            ID,
            PREFIX_BLOCK_HASH_BY_INDEX,
            &index.to_be_bytes(),
        ))?
        .value;
    UInt256::from_bytes(&value).ok()
}

/// The trimmed block stored under `hash`.
pub fn trimmed_block(snapshot: &DataCache<'_>, hash: &UInt256) -> Option<TrimmedBlock> {
    let value = snapshot
        .try_get(&StorageKey::with_suffix(ID, PREFIX_BLOCK, hash.as_bytes()))?
        .value;
    helios_io::from_bytes(&value).ok()
}

/// The stored transaction state for `hash`.
pub fn transaction_state(snapshot: &DataCache<'_>, hash: &UInt256) -> Option<TransactionState> {
    let value = snapshot
        .try_get(&StorageKey::with_suffix(
            ID,
            PREFIX_TRANSACTION,
            hash.as_bytes(),
        ))?
        .value;
    helios_io::from_bytes(&value).ok()
}

/// True when a block at `index` is still inside the traceable window.
pub fn is_traceable(snapshot: &DataCache<'_>, index: u32) -> bool {
    match current_index(snapshot) {
        Some(current) => {
            index <= current && index + MAX_TRACEABLE_BLOCKS > current
        }
        None => false,
    }
}

/// Persists a block, its index entry, the tip pointer and every
/// transaction's state. Called by the import pipeline inside the
/// block-scoped DAO.
pub fn put_block(
    snapshot: &mut DataCache<'_>,
    block: &Block,
    vm_states: &[u8],
) -> Result<()> {
    let hash = block.hash();
    let trimmed = TrimmedBlock {
        header: block.header.clone(),
        hashes: block.transactions.iter().map(Transaction::hash).collect(),
    };
    snapshot.put(
        StorageKey::with_suffix(ID, PREFIX_BLOCK, hash.as_bytes()),
        StorageItem::new(helios_io::to_bytes(&trimmed)?),
    )?;
    snapshot.put(
        StorageKey::with_suffix(ID, PREFIX_BLOCK_HASH_BY_INDEX, &block.index().to_be_bytes()),
        StorageItem::new(hash.to_vec()),
    )?;
    let mut tip = hash.to_vec();
    tip.extend_from_slice(&block.index().to_le_bytes());
    snapshot.put(
        StorageKey::from_prefix(ID, KEY_CURRENT),
        StorageItem::new(tip),
    )?;
    for (tx, &vm_state) in block.transactions.iter().zip(vm_states) {
        let state = TransactionState {
            block_index: block.index(),
            vm_state,
            transaction: tx.clone(),
        };
        snapshot.put(
            StorageKey::with_suffix(ID, PREFIX_TRANSACTION, tx.hash().as_bytes()),
            StorageItem::new(helios_io::to_bytes(&state)?),
        )?;
    }
    Ok(())
}

fn header_to_item(hash: UInt256, header: &Header, tx_count: usize) -> StackItem {
    StackItem::new_array(vec![
        StackItem::from_bytes(hash.to_vec()),
        int_item(header.version as i64),
        StackItem::from_bytes(header.prev_hash.to_vec()),
        StackItem::from_bytes(header.merkle_root.to_vec()),
        int_item(header.timestamp as i64),
        int_item(header.index as i64),
        int_item(header.primary as i64),
        StackItem::from_bytes(header.next_consensus.to_vec()),
        int_item(tx_count as i64),
    ])
}

/// The Ledger native contract.
pub struct LedgerContract {
    hash: helios_core::UInt160,
    methods: Vec<NativeMethod>,
}

impl LedgerContract {
    /// Creates the singleton instance.
    pub fn new() -> Self {
        Self {
            hash: native_hash("LedgerContract"),
            methods: vec![
                NativeMethod::safe("currentHash", 0, 1 << 15),
                NativeMethod::safe("currentIndex", 0, 1 << 15),
                NativeMethod::safe("getBlock", 1, 1 << 15),
                NativeMethod::safe("getTransaction", 1, 1 << 15),
                NativeMethod::safe("getTransactionHeight", 1, 1 << 15),
            ],
        }
    }

    fn resolve_block_hash(
        &self,
        snapshot: &DataCache<'_>,
        id_bytes: &[u8],
    ) -> Option<UInt256> {
        match id_bytes.len() {
            UInt256::SIZE => UInt256::from_bytes(id_bytes).ok(),
            // Anything shorter is a little-endian index.
            len if len < 5 => {
                let mut buf = [0u8; 4];
                buf[..len].copy_from_slice(id_bytes);
                block_hash_at(snapshot, u32::from_le_bytes(buf))
            }
            _ => None,
        }
    }

    fn get_block(&self, snapshot: &DataCache<'_>, id_bytes: &[u8]) -> StackItem {
        let Some(hash) = self.resolve_block_hash(snapshot, id_bytes) else {
            return StackItem::Null;
        };
        let Some(trimmed) = trimmed_block(snapshot, &hash) else {
            return StackItem::Null;
        };
        if !is_traceable(snapshot, trimmed.header.index) {
            return StackItem::Null;
        }
        header_to_item(hash, &trimmed.header, trimmed.hashes.len())
    }

    fn get_transaction(&self, snapshot: &DataCache<'_>, hash_bytes: &[u8]) -> StackItem {
        let Ok(hash) = UInt256::from_bytes(hash_bytes) else {
            return StackItem::Null;
        };
        let Some(state) = transaction_state(snapshot, &hash) else {
            return StackItem::Null;
        };
        if !is_traceable(snapshot, state.block_index) {
            return StackItem::Null;
        }
        let tx = &state.transaction;
        StackItem::new_array(vec![
            StackItem::from_bytes(tx.hash().to_vec()),
            int_item(tx.version as i64),
            int_item(tx.nonce as i64),
            StackItem::from_bytes(tx.sender().unwrap_or_default().to_vec()),
            int_item(tx.system_fee),
            int_item(tx.network_fee),
            int_item(tx.valid_until_block as i64),
            StackItem::from_bytes(tx.script.clone()),
        ])
    }

    fn get_transaction_height(&self, snapshot: &DataCache<'_>, hash_bytes: &[u8]) -> StackItem {
        let Ok(hash) = UInt256::from_bytes(hash_bytes) else {
            return int_item(-1);
        };
        match transaction_state(snapshot, &hash) {
            Some(state) if is_traceable(snapshot, state.block_index) => {
                int_item(state.block_index as i64)
            }
            _ => int_item(-1),
        }
    }
}

impl Default for LedgerContract {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeContract for LedgerContract {
    fn id(&self) -> i32 {
        ID
    }

    fn name(&self) -> &'static str {
        "LedgerContract"
    }

    fn hash(&self) -> helios_core::UInt160 {
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
            "currentHash" => Ok(match current_hash_and_index(engine.snapshot()) {
                Some((hash, _)) => StackItem::from_bytes(hash.to_vec()),
                None => StackItem::Null,
            }),
            "currentIndex" => Ok(match current_index(engine.snapshot()) {
                Some(index) => int_item(index as i64),
                None => int_item(-1),
            }),
            "getBlock" => {
                let id = arg_bytes(&args, 0)?;
                Ok(self.get_block(engine.snapshot(), &id))
            }
            "getTransaction" => {
                let hash = arg_bytes(&args, 0)?;
                Ok(self.get_transaction(engine.snapshot(), &hash))
            }
            "getTransactionHeight" => {
                let hash = arg_bytes(&args, 0)?;
                Ok(self.get_transaction_height(engine.snapshot(), &hash))
            }
            other => Err(unknown_method("LedgerContract", other)),
        }
    }
}
