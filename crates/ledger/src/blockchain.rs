//! The blockchain: genesis construction and the block import pipeline.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use helios_config::{ProtocolSettings, MAX_TRANSACTIONS_PER_BLOCK};
use helios_core::{compute_merkle_root, Block, Header, Transaction, UInt160, UInt256, Witness};
use helios_crypto::ECPoint;
use helios_persistence::{DataCache, Store};
use helios_vm::{OpCode, VMState};

use helios_contract::application_engine::{
    verify_witness, ApplicationEngine, NotificationEvent, ScriptContainer, TriggerType,
};
use helios_contract::native;

use crate::events::BlockchainEvent;
use crate::mempool::Mempool;
use crate::{Error, Result};

/// Gas allowed for a single witness verification run.
pub const MAX_VERIFICATION_GAS: i64 = 1_5000_0000;

/// Fixed genesis timestamp, milliseconds.
const GENESIS_TIMESTAMP: u64 = 1_640_995_200_000;

/// The outcome of executing one transaction inside a block.
#[derive(Debug, Clone)]
pub struct ApplicationExecuted {
    /// The executed transaction's hash.
    pub tx_hash: UInt256,
    /// Final VM state: HALT or FAULT.
    pub vm_state: VMState,
    /// Gas actually consumed, in datoshi.
    pub gas_consumed: i64,
    /// The fault reason, when the script faulted.
    pub exception: Option<String>,
    /// Notifications in emission order.
    pub notifications: Vec<NotificationEvent>,
}

/// The replicated ledger: total ordering of blocks over a pluggable store.
pub struct Blockchain {
    store: Arc<dyn Store>,
    settings: Arc<ProtocolSettings>,
    mempool: Arc<Mutex<Mempool>>,
    events: broadcast::Sender<BlockchainEvent>,
    tip: RwLock<(UInt256, u32)>,
}

impl Blockchain {
    /// Opens the chain over `store`, importing the genesis block when the
    /// store is empty.
    pub fn new(store: Arc<dyn Store>, settings: Arc<ProtocolSettings>) -> Result<Self> {
        settings
            .validate()
            .map_err(|e| Error::InvariantViolation(e.to_string()))?;
        let (events, _) = broadcast::channel(256);
        let chain = Self {
            store,
            settings,
            mempool: Arc::new(Mutex::new(Mempool::new())),
            events,
            tip: RwLock::new((UInt256::zero(), 0)),
        };

        let existing = {
            let snapshot = DataCache::new(chain.store.as_ref());
            native::ledger::current_hash_and_index(&snapshot)
        };
        match existing {
            Some((hash, index)) => {
                *chain.tip.write() = (hash, index);
                info!(height = index, "ledger opened at existing tip");
            }
            None => {
                let genesis = chain.build_genesis()?;
                chain.persist_block(&genesis, true)?;
                info!(hash = %genesis.hash(), "genesis block persisted");
            }
        }
        Ok(chain)
    }

    /// Network settings.
    pub fn settings(&self) -> &Arc<ProtocolSettings> {
        &self.settings
    }

    /// The shared memory pool.
    pub fn mempool(&self) -> &Arc<Mutex<Mempool>> {
        &self.mempool
    }

    /// Subscribes to post-commit events.
    pub fn subscribe(&self) -> broadcast::Receiver<BlockchainEvent> {
        self.events.subscribe()
    }

    /// Current height.
    pub fn height(&self) -> u32 {
        self.tip.read().1
    }

    /// Current tip hash.
    pub fn current_hash(&self) -> UInt256 {
        self.tip.read().0
    }

    /// A fresh read snapshot over the store.
    pub fn snapshot(&self) -> DataCache<'_> {
        DataCache::new(self.store.as_ref())
    }

    /// The standby validators derived from settings.
    pub fn standby_validators(&self) -> Result<Vec<ECPoint>> {
        self.settings
            .standby_validators()
            .iter()
            .map(|hex| ECPoint::from_hex(hex).map_err(Error::Crypto))
            .collect()
    }

    /// The validator set expected to sign the next block.
    pub fn next_block_validators(&self) -> Result<Vec<ECPoint>> {
        let snapshot = self.snapshot();
        native::neo::next_block_validators(&snapshot, &self.settings).map_err(Error::Contract)
    }

    /// Reads a block back from storage.
    pub fn block_at(&self, index: u32) -> Option<Block> {
        let snapshot = self.snapshot();
        let hash = native::ledger::block_hash_at(&snapshot, index)?;
        let trimmed = native::ledger::trimmed_block(&snapshot, &hash)?;
        let transactions = trimmed
            .hashes
            .iter()
            .filter_map(|h| native::ledger::transaction_state(&snapshot, h))
            .map(|state| state.transaction)
            .collect();
        Some(Block {
            header: trimmed.header,
            transactions,
        })
    }

    /// Reads a transaction and its block height from storage.
    pub fn transaction(&self, hash: &UInt256) -> Option<(Transaction, u32)> {
        let snapshot = self.snapshot();
        native::ledger::transaction_state(&snapshot, hash)
            .map(|state| (state.transaction, state.block_index))
    }

    fn build_genesis(&self) -> Result<Block> {
        let validators = self.standby_validators()?;
        let next_consensus = if validators.is_empty() {
            UInt160::zero()
        } else {
            helios_contract::validators_address(&validators)?
        };
        let header = Header::new(
            0,
            UInt256::zero(),
            compute_merkle_root(&[]),
            GENESIS_TIMESTAMP,
            0,
            0,
            next_consensus,
            Witness::new(Vec::new(), vec![OpCode::PUSH1.as_byte()]),
        );
        Ok(Block {
            header,
            transactions: Vec::new(),
        })
    }

    /// Verifies a header against the current tip.
    fn verify_header(&self, block: &Block) -> Result<()> {
        let (tip_hash, tip_index) = *self.tip.read();
        if block.index() != tip_index + 1 {
            return Err(Error::BlockVerification(format!(
                "expected index {}, got {}",
                tip_index + 1,
                block.index()
            )));
        }
        if block.header.prev_hash != tip_hash {
            return Err(Error::BlockVerification(format!(
                "previous hash {} does not match tip {}",
                block.header.prev_hash, tip_hash
            )));
        }
        if block.transactions.len() > MAX_TRANSACTIONS_PER_BLOCK {
            return Err(Error::BlockVerification(format!(
                "{} transactions exceed the block ceiling",
                block.transactions.len()
            )));
        }
        block.verify_merkle_root()?;

        // The previous header names who must witness this one.
        let snapshot = self.snapshot();
        let prev = native::ledger::trimmed_block(&snapshot, &tip_hash).ok_or_else(|| {
            Error::InvariantViolation(format!("tip block {tip_hash} missing from storage"))
        })?;
        let expected = prev.header.next_consensus;
        let verified = verify_witness(
            &self.settings,
            self.snapshot(),
            ScriptContainer::Header(Arc::new(block.header.clone())),
            &expected,
            &block.header.witness,
            MAX_VERIFICATION_GAS,
        )?;
        if !verified {
            return Err(Error::BlockVerification(
                "header witness does not satisfy next_consensus".into(),
            ));
        }
        Ok(())
    }

    /// Imports one block: verify, execute, commit atomically, notify.
    pub fn add_block(&self, block: Block) -> Result<Vec<ApplicationExecuted>> {
        self.verify_header(&block)?;
        let executed = self.persist_block(&block, false)?;

        self.mempool.lock().reconcile(&block.transactions);
        let block = Arc::new(block);
        let _ = self
            .events
            .send(BlockchainEvent::BlockPersisted(Arc::clone(&block)));
        for result in &executed {
            let _ = self.events.send(BlockchainEvent::TransactionExecuted(
                Arc::new(result.clone()),
            ));
        }
        debug!(height = block.index(), txs = executed.len(), "block committed");
        Ok(executed)
    }

    /// Runs the execution pipeline against a block-scoped DAO and commits it
    /// in a single atomic batch.
    fn persist_block(&self, block: &Block, genesis: bool) -> Result<Vec<ApplicationExecuted>> {
        let block_arc = Arc::new(block.clone());
        let mut block_dao = DataCache::new(self.store.as_ref());
        let mut executed = Vec::with_capacity(block.transactions.len());
        let mut vm_states = Vec::with_capacity(block.transactions.len());

        // OnPersist: native bookkeeping ahead of the transactions.
        {
            let mut engine = ApplicationEngine::new(
                TriggerType::OnPersist,
                None,
                DataCache::wrap(&block_dao),
                Some(Arc::clone(&block_arc)),
                Arc::clone(&self.settings),
                -1,
            );
            if genesis {
                native::initialize_all(&mut engine)?;
            }
            native::on_persist_all(&mut engine)?;
            let dirty = engine.into_snapshot().into_dirty();
            block_dao.apply(dirty);
        }

        // Per-transaction execution, isolated by a child DAO each.
        for tx in &block.transactions {
            let mut engine = ApplicationEngine::new(
                TriggerType::Application,
                Some(ScriptContainer::Transaction(Arc::new(tx.clone()))),
                DataCache::wrap(&block_dao),
                Some(Arc::clone(&block_arc)),
                Arc::clone(&self.settings),
                tx.system_fee,
            );
            engine.load_script(tx.script.clone(), helios_vm::CallFlags::ALL)?;
            let state = engine.execute();
            let result = ApplicationExecuted {
                tx_hash: tx.hash(),
                vm_state: state,
                gas_consumed: engine.gas_consumed(),
                exception: engine.fault_reason(),
                notifications: engine.notifications().to_vec(),
            };
            match state {
                VMState::Halt => {
                    let dirty = engine.into_snapshot().into_dirty();
                    block_dao.apply(dirty);
                }
                _ => {
                    // Fees were burned during OnPersist; state changes drop.
                    warn!(tx = %tx.hash(), reason = ?result.exception, "transaction faulted");
                }
            }
            vm_states.push(match state {
                VMState::Halt => 1,
                _ => 2,
            });
            executed.push(result);
        }

        // PostPersist: reward distribution and response cleanup.
        {
            let mut engine = ApplicationEngine::new(
                TriggerType::PostPersist,
                None,
                DataCache::wrap(&block_dao),
                Some(Arc::clone(&block_arc)),
                Arc::clone(&self.settings),
                -1,
            );
            native::post_persist_all(&mut engine)?;
            let dirty = engine.into_snapshot().into_dirty();
            block_dao.apply(dirty);
        }

        native::ledger::put_block(&mut block_dao, block, &vm_states)?;

        let batch = block_dao.into_batch()?;
        self.store.write_batch(batch);
        *self.tip.write() = (block.hash(), block.index());
        Ok(executed)
    }

    /// Admission control for mempool entry: structure, fees, expiry,
    /// blocked-sender policy and witness verification.
    pub fn verify_transaction(&self, tx: &Transaction) -> Result<()> {
        tx.validate_structure()?;
        let height = self.height();
        if tx.valid_until_block <= height {
            return Err(Error::TransactionRejected(format!(
                "expired at {}, current height {height}",
                tx.valid_until_block
            )));
        }
        if tx.valid_until_block > height + self.settings.max_valid_until_block_increment {
            return Err(Error::TransactionRejected(
                "valid_until_block too far ahead".into(),
            ));
        }
        let snapshot = self.snapshot();
        let sender = tx
            .sender()
            .ok_or_else(|| Error::TransactionRejected("no sender".into()))?;
        if native::policy::is_blocked(&snapshot, &sender) {
            return Err(Error::TransactionRejected("sender is blocked".into()));
        }
        let fee_per_byte = native::policy::fee_per_byte(&snapshot);
        let minimum_fee = helios_io::Serializable::size(tx) as i64 * fee_per_byte;
        if tx.network_fee < minimum_fee {
            return Err(Error::TransactionRejected(format!(
                "network fee {} below the {minimum_fee} minimum",
                tx.network_fee
            )));
        }
        let balance = native::gas::balance_of(&snapshot, &sender);
        if balance < tx.system_fee + tx.network_fee {
            return Err(Error::TransactionRejected(
                "sender cannot cover fees".into(),
            ));
        }
        if tx.witnesses.len() != tx.signers.len() {
            return Err(Error::TransactionRejected(
                "missing witnesses".into(),
            ));
        }
        for (signer, witness) in tx.signers.iter().zip(&tx.witnesses) {
            let verified = verify_witness(
                &self.settings,
                self.snapshot(),
                ScriptContainer::Transaction(Arc::new(tx.clone())),
                &signer.account,
                witness,
                MAX_VERIFICATION_GAS,
            )?;
            if !verified {
                return Err(Error::TransactionRejected(format!(
                    "witness for {} failed",
                    signer.account
                )));
            }
        }
        Ok(())
    }

    /// Verifies and pools a transaction.
    pub fn pool_transaction(&self, tx: Transaction) -> Result<()> {
        if self.mempool.lock().contains(&tx.hash()) {
            return Ok(());
        }
        if self.transaction(&tx.hash()).is_some() {
            return Err(Error::TransactionRejected("already on chain".into()));
        }
        self.verify_transaction(&tx)?;
        if !self.mempool.lock().try_add(Arc::new(tx)) {
            return Err(Error::TransactionRejected("pool is full".into()));
        }
        Ok(())
    }
}
