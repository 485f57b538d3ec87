//! The consensus service: a single-task event loop driving dBFT rounds.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use helios_core::{compute_merkle_root, Block, Header, Transaction, UInt256, Witness};
use helios_crypto::{ECPoint, KeyPair, Secp256r1};
use helios_ledger::Blockchain;
use helios_vm::ScriptBuilder;

use crate::context::{ConsensusContext, Proposal};
use crate::messages::{
    ConsensusMessage, ConsensusMessageBody, ExtensiblePayload, PAYLOAD_CATEGORY,
};
use crate::relay_cache::RelayCache;
use crate::{Error, Result};

/// Which witness assembly the commit phase uses.
///
/// Only the classical multi-signature path is wired; `Bls` is accepted in
/// configuration and currently routes to the same assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WitnessMode {
    /// Classical m-of-n ECDSA multi-signature.
    MultiSig,
    /// BLS aggregation (reserved).
    Bls,
}

/// Consensus runtime parameters.
#[derive(Debug, Clone)]
pub struct ConsensusConfig {
    /// Watch-only nodes follow rounds but never sign.
    pub watch_only: bool,
    /// Witness assembly selection.
    pub witness_mode: WitnessMode,
    /// Base view timeout.
    pub timeout: Duration,
    /// Event channel capacity.
    pub channel_capacity: usize,
    /// Relay cache capacity.
    pub relay_cache_capacity: usize,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            watch_only: false,
            witness_mode: WitnessMode::MultiSig,
            timeout: Duration::from_millis(helios_config::MILLISECONDS_PER_BLOCK),
            channel_capacity: 100,
            relay_cache_capacity: 100,
        }
    }
}

/// Sends signed payloads to peers; networking is provided by the host.
pub trait PayloadRelay: Send + Sync {
    /// Relays one payload to the network.
    fn relay(&self, payload: ExtensiblePayload);
}

/// A relay that drops everything, for tests and watch-only setups.
pub struct NullRelay;

impl PayloadRelay for NullRelay {
    fn relay(&self, _payload: ExtensiblePayload) {}
}

/// Events multiplexed by the consensus loop.
#[derive(Debug)]
pub enum ConsensusEvent {
    /// The view timer fired.
    Timer,
    /// An inbound consensus payload.
    Payload(ExtensiblePayload),
    /// An inbound transaction.
    Transaction(Transaction),
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Drives dBFT rounds against the blockchain.
pub struct ConsensusService {
    chain: Arc<Blockchain>,
    config: ConsensusConfig,
    key: Option<KeyPair>,
    relay: Arc<dyn PayloadRelay>,
    context: ConsensusContext,
    relay_cache: RelayCache,
    events: mpsc::Receiver<ConsensusEvent>,
}

impl ConsensusService {
    /// Creates the service and the sender used to feed it events.
    pub fn new(
        chain: Arc<Blockchain>,
        key: Option<KeyPair>,
        relay: Arc<dyn PayloadRelay>,
        config: ConsensusConfig,
    ) -> Result<(Self, mpsc::Sender<ConsensusEvent>)> {
        let (tx, rx) = mpsc::channel(config.channel_capacity);
        let relay_cache = RelayCache::new(config.relay_cache_capacity);
        let key = if config.watch_only { None } else { key };
        let context = Self::fresh_context(&chain, key.as_ref())?;
        Ok((
            Self {
                chain,
                config,
                key,
                relay,
                context,
                relay_cache,
                events: rx,
            },
            tx,
        ))
    }

    fn fresh_context(
        chain: &Blockchain,
        key: Option<&KeyPair>,
    ) -> Result<ConsensusContext> {
        let validators = chain.next_block_validators()?;
        let my_key = key.map(KeyPair::public_key);
        Ok(ConsensusContext::new(
            chain.height() + 1,
            validators,
            my_key.as_ref(),
        ))
    }

    /// The round context, for inspection.
    pub fn context(&self) -> &ConsensusContext {
        &self.context
    }

    /// Runs the event loop until the event channel closes.
    pub async fn run(mut self) {
        let mut timer = tokio::time::interval(self.config.timeout);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(
            validators = self.context.validator_count(),
            watch_only = !self.context.is_validator(),
            "consensus loop started"
        );
        loop {
            let event = tokio::select! {
                _ = timer.tick() => ConsensusEvent::Timer,
                received = self.events.recv() => match received {
                    Some(event) => event,
                    None => break,
                },
            };
            if let Err(error) = self.handle(event) {
                warn!(%error, "consensus event failed");
            }
        }
        info!("consensus loop stopped");
    }

    /// Handles one event synchronously; exposed for deterministic tests.
    pub fn handle(&mut self, event: ConsensusEvent) -> Result<()> {
        match event {
            ConsensusEvent::Timer => self.on_timer(),
            ConsensusEvent::Payload(payload) => self.on_payload(payload),
            ConsensusEvent::Transaction(tx) => {
                if let Err(error) = self.chain.pool_transaction(tx) {
                    debug!(%error, "transaction rejected");
                }
                Ok(())
            }
        }
    }

    fn on_timer(&mut self) -> Result<()> {
        // A stale context means a block landed through another path.
        if self.context.block_index != self.chain.height() + 1 {
            self.context = Self::fresh_context(&self.chain, self.key.as_ref())?;
        }
        if !self.context.is_validator() {
            return Ok(());
        }
        if self.context.is_primary() && self.context.proposal.is_none() {
            return self.send_prepare_request();
        }
        if self.context.proposal.is_none() || !self.context.commits_complete() {
            return self.send_change_view();
        }
        Ok(())
    }

    // ---- block construction ----------------------------------------------

    fn build_header(&self, proposal: &Proposal) -> Result<Header> {
        let hashes: Vec<UInt256> = proposal.transactions.iter().map(Transaction::hash).collect();
        let next_consensus = helios_contract::validators_address(&self.context.validators)?;
        Ok(Header::new(
            0,
            self.chain.current_hash(),
            compute_merkle_root(&hashes),
            proposal.timestamp,
            self.context.block_index,
            self.context.primary_index() as u8,
            next_consensus,
            Witness::default(),
        ))
    }

    fn block_sign_data(&self, proposal: &Proposal) -> Result<Vec<u8>> {
        let header = self.build_header(proposal)?;
        Ok(header.sign_data(self.chain.settings().magic()))
    }

    /// Assembles the multi-signature witness out of collected commits.
    fn assemble_witness(&self) -> Result<Witness> {
        let n = self.context.validator_count();
        let m = helios_contract::validators_threshold(n);
        let verification = match self.config.witness_mode {
            // BLS aggregation is reserved; it assembles the classical
            // multisig until an aggregate scheme ships.
            WitnessMode::MultiSig | WitnessMode::Bls => {
                helios_contract::create_multisig_redeem_script(m, &self.context.validators)?
            }
        };
        // The validator set is sorted, so walking indexes ascending yields
        // signatures in key order, which CheckMultisig requires.
        let mut builder = ScriptBuilder::new();
        let mut used = 0;
        for index in 0..n {
            if used >= m {
                break;
            }
            if let Some(signature) = self.context.commits.get(&index) {
                builder.emit_push_bytes(signature);
                used += 1;
            }
        }
        if used < m {
            return Err(Error::InvalidPayload(format!(
                "only {used} of {m} commit signatures collected"
            )));
        }
        Ok(Witness::new(builder.into_bytes(), verification))
    }

    fn try_commit_block(&mut self) -> Result<()> {
        if !self.context.commits_complete() {
            return Ok(());
        }
        let Some(proposal) = self.context.proposal.clone() else {
            return Ok(());
        };
        let mut header = self.build_header(&proposal)?;
        header.witness = self.assemble_witness()?;
        let block = Block {
            header,
            transactions: proposal.transactions,
        };
        info!(height = block.index(), hash = %block.hash(), "committing block");
        self.chain.add_block(block)?;
        self.context = Self::fresh_context(&self.chain, self.key.as_ref())?;
        Ok(())
    }

    // ---- outbound messages -----------------------------------------------

    fn sign_and_relay(&mut self, body: ConsensusMessageBody) -> Result<Option<ExtensiblePayload>> {
        let Some(key) = &self.key else {
            return Ok(None);
        };
        let Some(my_index) = self.context.my_index else {
            return Ok(None);
        };
        let message = ConsensusMessage::new(
            self.context.block_index,
            my_index as u8,
            self.context.view_number,
            body,
        );
        let mut payload = ExtensiblePayload {
            category: PAYLOAD_CATEGORY.into(),
            valid_block_start: self.context.block_index.saturating_sub(1),
            valid_block_end: self.context.block_index + 1,
            sender: helios_contract::signature_address(&key.public_key()),
            data: helios_io::to_bytes(&message)?,
            witness: Witness::default(),
        };
        let signature = key.sign(&payload.sign_data(self.chain.settings().magic())?)?;
        let mut invocation = ScriptBuilder::new();
        invocation.emit_push_bytes(&signature);
        payload.witness = Witness::new(
            invocation.into_bytes(),
            helios_contract::create_signature_redeem_script(&key.public_key()),
        );
        self.relay_cache.try_add(payload.hash()?);
        self.relay.relay(payload.clone());
        Ok(Some(payload))
    }

    fn send_prepare_request(&mut self) -> Result<()> {
        let transactions: Vec<Transaction> = self
            .chain
            .mempool()
            .lock()
            .take_sorted(helios_config::MAX_TRANSACTIONS_PER_BLOCK)
            .iter()
            .map(|tx| (**tx).clone())
            .collect();
        let proposal = Proposal {
            timestamp: now_ms(),
            nonce: rand::random(),
            transactions,
        };
        let body = ConsensusMessageBody::PrepareRequest {
            timestamp: proposal.timestamp,
            nonce: proposal.nonce,
            transaction_hashes: proposal.transactions.iter().map(Transaction::hash).collect(),
        };
        self.context.proposal = Some(proposal.clone());
        if let Some(payload) = self.sign_and_relay(body)? {
            let hash = payload.hash()?;
            self.context.preparation_hash = Some(hash);
            if let Some(my_index) = self.context.my_index {
                self.context.preparations.insert(my_index, hash);
            }
        }
        debug!(
            height = self.context.block_index,
            txs = proposal.transactions.len(),
            "prepare request sent"
        );
        self.send_commit_if_prepared()
    }

    fn send_change_view(&mut self) -> Result<()> {
        let body = ConsensusMessageBody::ChangeView {
            timestamp: now_ms(),
        };
        if let Some(my_index) = self.context.my_index {
            let next = self.context.view_number + 1;
            self.context.view_changes.insert(my_index, next);
        }
        self.sign_and_relay(body)?;
        self.maybe_change_view()
    }

    fn send_commit_if_prepared(&mut self) -> Result<()> {
        if !self.context.preparations_complete() {
            return Ok(());
        }
        if self
            .context
            .my_index
            .is_some_and(|index| self.context.commits.contains_key(&index))
        {
            return Ok(());
        }
        let Some(proposal) = self.context.proposal.clone() else {
            return Ok(());
        };
        let Some(key) = &self.key else {
            return Ok(());
        };
        let signature = key.sign(&self.block_sign_data(&proposal)?)?.to_vec();
        if let Some(my_index) = self.context.my_index {
            self.context.commits.insert(my_index, signature.clone());
        }
        self.sign_and_relay(ConsensusMessageBody::Commit { signature })?;
        self.try_commit_block()
    }

    // ---- inbound messages ------------------------------------------------

    /// Validates the payload envelope and its validator signature.
    fn verify_payload(&self, payload: &ExtensiblePayload) -> Result<ConsensusMessage> {
        if payload.category != PAYLOAD_CATEGORY {
            return Err(Error::InvalidPayload(format!(
                "unexpected category {}",
                payload.category
            )));
        }
        let height = self.chain.height() + 1;
        if height < payload.valid_block_start || height >= payload.valid_block_end {
            return Err(Error::InvalidPayload(format!(
                "payload valid for [{}, {}), current {height}",
                payload.valid_block_start, payload.valid_block_end
            )));
        }
        let message = payload.message()?;
        let validator: &ECPoint = self
            .context
            .validators
            .get(message.validator_index as usize)
            .ok_or_else(|| {
                Error::InvalidPayload(format!(
                    "validator index {} out of range",
                    message.validator_index
                ))
            })?;
        if helios_contract::signature_address(validator) != payload.sender {
            return Err(Error::InvalidPayload(
                "sender does not match validator key".into(),
            ));
        }
        // The witness invocation is a single signature push.
        let invocation = &payload.witness.invocation_script;
        if invocation.len() != 66 || invocation[0] != 0x0C || invocation[1] != 64 {
            return Err(Error::InvalidPayload("malformed payload witness".into()));
        }
        let signature = &invocation[2..66];
        let data = payload.sign_data(self.chain.settings().magic())?;
        if !Secp256r1::verify(&data, signature, validator)? {
            return Err(Error::InvalidPayload("bad payload signature".into()));
        }
        Ok(message)
    }

    fn on_payload(&mut self, payload: ExtensiblePayload) -> Result<()> {
        let hash = payload.hash()?;
        if !self.relay_cache.try_add(hash) {
            return Ok(());
        }
        let message = self.verify_payload(&payload)?;
        if message.block_index != self.context.block_index {
            return Ok(());
        }
        // Relay once per payload, then act on it.
        self.relay.relay(payload.clone());

        match message.body {
            ConsensusMessageBody::PrepareRequest {
                timestamp,
                nonce,
                ref transaction_hashes,
            } => self.on_prepare_request(&payload, &message, timestamp, nonce, transaction_hashes.clone()),
            ConsensusMessageBody::PrepareResponse { preparation_hash } => {
                self.on_prepare_response(&message, preparation_hash)
            }
            ConsensusMessageBody::Commit { ref signature } => self.on_commit(&message, signature.clone()),
            ConsensusMessageBody::ChangeView { .. } => {
                self.context
                    .view_changes
                    .insert(message.validator_index as usize, message.view_number + 1);
                self.maybe_change_view()
            }
            ConsensusMessageBody::RecoveryRequest { .. }
            | ConsensusMessageBody::RecoveryMessage { .. } => {
                debug!("recovery messages are relayed but not replayed");
                Ok(())
            }
        }
    }

    fn on_prepare_request(
        &mut self,
        payload: &ExtensiblePayload,
        message: &ConsensusMessage,
        timestamp: u64,
        nonce: u64,
        transaction_hashes: Vec<UInt256>,
    ) -> Result<()> {
        if message.view_number != self.context.view_number {
            return Ok(());
        }
        if message.validator_index as usize != self.context.primary_index() {
            return Err(Error::InvalidPayload(
                "prepare request from a non-primary".into(),
            ));
        }
        if self.context.proposal.is_some() {
            return Ok(());
        }
        // Every proposed transaction must be available and verified.
        let mut transactions = Vec::with_capacity(transaction_hashes.len());
        {
            let mempool = self.chain.mempool().lock();
            for hash in &transaction_hashes {
                match mempool.get(hash) {
                    Some(tx) => transactions.push((*tx).clone()),
                    None => {
                        debug!(%hash, "proposal references an unknown transaction");
                        return Ok(());
                    }
                }
            }
        }
        let hash = payload.hash()?;
        self.context.proposal = Some(Proposal {
            timestamp,
            nonce,
            transactions,
        });
        self.context.preparation_hash = Some(hash);
        self.context
            .preparations
            .insert(message.validator_index as usize, hash);
        if let Some(my_index) = self.context.my_index {
            self.context.preparations.insert(my_index, hash);
            self.sign_and_relay(ConsensusMessageBody::PrepareResponse {
                preparation_hash: hash,
            })?;
        }
        self.send_commit_if_prepared()
    }

    fn on_prepare_response(
        &mut self,
        message: &ConsensusMessage,
        preparation_hash: UInt256,
    ) -> Result<()> {
        if message.view_number != self.context.view_number {
            return Ok(());
        }
        if self.context.preparation_hash != Some(preparation_hash) {
            return Ok(());
        }
        self.context
            .preparations
            .insert(message.validator_index as usize, preparation_hash);
        self.send_commit_if_prepared()
    }

    fn on_commit(&mut self, message: &ConsensusMessage, signature: Vec<u8>) -> Result<()> {
        if message.view_number != self.context.view_number {
            return Ok(());
        }
        let Some(proposal) = self.context.proposal.clone() else {
            return Ok(());
        };
        let validator = self.context.validators[message.validator_index as usize];
        let data = self.block_sign_data(&proposal)?;
        if !Secp256r1::verify(&data, &signature, &validator)? {
            return Err(Error::InvalidPayload("bad commit signature".into()));
        }
        self.context
            .commits
            .insert(message.validator_index as usize, signature);
        self.try_commit_block()
    }

    fn maybe_change_view(&mut self) -> Result<()> {
        if self.context.view_change_ready() {
            self.context.change_view();
            info!(view = self.context.view_number, "view changed");
        }
        Ok(())
    }
}
