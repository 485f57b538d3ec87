//! The oracle service: worker pool, fetch pipeline, retry ticker.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use helios_config::ProtocolSettings;
use helios_core::{
    OracleResponseCode, Signer, Transaction, TransactionAttribute, UInt256, WitnessScope,
};
use helios_crypto::{ECPoint, KeyPair};
use helios_vm::{CallFlags, ScriptBuilder};

use helios_contract::interop::ids::SYSTEM_CONTRACT_CALL;
use helios_contract::native::oracle::OracleRequest;
use helios_contract::native::native_hash;
use helios_contract::create_multisig_redeem_script;
use helios_contract::validators_threshold;

use crate::config::OracleConfig;
use crate::filter::filter_json;
use crate::incomplete::IncompleteTx;
use crate::{Error, Result};

/// Read-only chain access the oracle needs.
pub trait OracleLedger: Send + Sync {
    /// Current chain height.
    fn height(&self) -> u32;
    /// Height a transaction was included at, if persisted.
    fn transaction_height(&self, hash: &UInt256) -> Option<u32>;
    /// The currently designated oracle node keys.
    fn oracle_nodes(&self) -> Vec<ECPoint>;
    /// Network settings.
    fn settings(&self) -> Arc<ProtocolSettings>;
}

/// Broadcasts this node's signatures to the other oracle nodes.
pub trait Broadcaster: Send + Sync {
    /// Sends one (response, signature) pair to peers.
    fn send_response(&self, key: &ECPoint, response: &ResponseData, tx_signature: &[u8]);
    /// Starts the broadcaster.
    fn run(&self);
    /// Stops the broadcaster.
    fn shutdown(&self);
}

/// A broadcaster that drops everything.
pub struct NullBroadcaster;

impl Broadcaster for NullBroadcaster {
    fn send_response(&self, _key: &ECPoint, _response: &ResponseData, _tx_signature: &[u8]) {}
    fn run(&self) {}
    fn shutdown(&self) {}
}

/// Fetches `neofs://` URLs; the concrete client lives outside the core.
#[async_trait]
pub trait NeoFsFetcher: Send + Sync {
    /// Fetches `url` through gateway `node`.
    async fn fetch(&self, url: &str, node: &str) -> std::result::Result<Vec<u8>, String>;
}

/// A NeoFS fetcher for deployments without NeoFS connectivity.
pub struct NoNeoFs;

#[async_trait]
impl NeoFsFetcher for NoNeoFs {
    async fn fetch(&self, _url: &str, _node: &str) -> std::result::Result<Vec<u8>, String> {
        Err("NeoFS support is not configured".into())
    }
}

/// Receives finished response transactions; usually the mempool.
pub type TxPoolCallback =
    Arc<dyn Fn(Transaction) -> std::result::Result<(), String> + Send + Sync>;

/// One computed response, as broadcast between oracle nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseData {
    /// The request id.
    pub id: u64,
    /// Outcome classification.
    pub code: OracleResponseCode,
    /// Filtered result payload.
    pub result: Vec<u8>,
}

enum WorkItem {
    /// A fresh request to process.
    Request(u64, Box<OracleRequest>),
    /// A retry; takes the backup path.
    Retry(u64),
}

/// The oracle module: owns the workers, the incomplete-transaction table and
/// the retry ticker.
pub struct OracleService {
    config: OracleConfig,
    key: KeyPair,
    ledger: Arc<dyn OracleLedger>,
    broadcaster: RwLock<Arc<dyn Broadcaster>>,
    neofs: Arc<dyn NeoFsFetcher>,
    on_transaction: TxPoolCallback,
    http: reqwest::Client,

    /// Request id → entry; entry-level mutexes keep workers from processing
    /// the same request twice in parallel.
    responses: RwLock<HashMap<u64, Arc<Mutex<IncompleteTx>>>>,
    /// Ids dropped by the ticker; late results are discarded.
    removed: Mutex<HashSet<u64>>,

    work_tx: mpsc::Sender<WorkItem>,
    work_rx: Mutex<Option<mpsc::Receiver<WorkItem>>>,
    close_tx: watch::Sender<bool>,
}

impl OracleService {
    /// Creates the service; [`OracleService::start`] spawns the workers.
    pub fn new(
        config: OracleConfig,
        key: KeyPair,
        ledger: Arc<dyn OracleLedger>,
        broadcaster: Arc<dyn Broadcaster>,
        neofs: Arc<dyn NeoFsFetcher>,
        on_transaction: TxPoolCallback,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::custom({
                let limit = config.max_redirects;
                move |attempt| {
                    if attempt.previous().len() >= limit {
                        return attempt.error("too many redirects");
                    }
                    if attempt.url().scheme() != "https" {
                        return attempt.error("redirect to a non-https location");
                    }
                    attempt.follow()
                }
            }))
            .user_agent("HeliosOracle/3.0")
            .build()
            .map_err(|e| Error::Fetch(e.to_string()))?;

        let (work_tx, work_rx) = mpsc::channel(config.max_concurrent_requests.max(1));
        let (close_tx, _) = watch::channel(false);
        Ok(Self {
            config,
            key,
            ledger,
            broadcaster: RwLock::new(broadcaster),
            neofs,
            on_transaction,
            http,
            responses: RwLock::new(HashMap::new()),
            removed: Mutex::new(HashSet::new()),
            work_tx,
            work_rx: Mutex::new(Some(work_rx)),
            close_tx,
        })
    }

    /// Spawns the worker pool and the retry ticker.
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut receiver = self
            .work_rx
            .lock()
            .take()
            .ok_or(Error::NotRunning)?;
        self.broadcaster.read().run();

        // One distributor fans items out to a bounded set of workers; the
        // per-entry locks keep a request from running twice concurrently.
        let workers = self.config.max_concurrent_requests.max(1);
        let semaphore = Arc::new(tokio::sync::Semaphore::new(workers));
        let service = Arc::clone(self);
        let mut close_rx = self.close_tx.subscribe();
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    _ = close_rx.changed() => break,
                    item = receiver.recv() => match item {
                        Some(item) => item,
                        None => break,
                    },
                };
                let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
                    break;
                };
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    let _permit = permit;
                    match item {
                        WorkItem::Request(id, request) => {
                            if let Err(error) = service.process_request(id, *request).await {
                                debug!(id, %error, "request processing failed");
                            }
                        }
                        WorkItem::Retry(id) => service.process_failed(id),
                    }
                });
            }
            info!("oracle distributor stopped");
        });

        let service = Arc::clone(self);
        let mut close_rx = self.close_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.config.refresh_interval);
            loop {
                tokio::select! {
                    _ = close_rx.changed() => break,
                    _ = ticker.tick() => service.tick().await,
                }
            }
            info!("oracle ticker stopped");
        });
        info!(workers, "oracle service started");
        Ok(())
    }

    /// Signals shutdown; workers finish their current request and exit.
    pub fn shutdown(&self) {
        let _ = self.close_tx.send(true);
        self.broadcaster.read().shutdown();
    }

    /// Swaps the broadcaster, stopping the old one and starting the new.
    pub fn set_broadcaster(&self, broadcaster: Arc<dyn Broadcaster>) {
        let mut slot = self.broadcaster.write();
        slot.shutdown();
        broadcaster.run();
        *slot = broadcaster;
    }

    /// Queues freshly observed on-chain requests.
    pub async fn add_requests(&self, requests: Vec<(u64, OracleRequest)>) {
        for (id, request) in requests {
            if self.removed.lock().contains(&id) {
                continue;
            }
            if self
                .work_tx
                .send(WorkItem::Request(id, Box::new(request)))
                .await
                .is_err()
            {
                warn!(id, "oracle work channel closed");
                return;
            }
        }
    }

    /// Forgets requests answered on-chain.
    pub fn remove_requests(&self, ids: &[u64]) {
        let mut responses = self.responses.write();
        for id in ids {
            responses.remove(id);
        }
    }

    /// Number of requests still being worked on.
    pub fn pending(&self) -> usize {
        self.responses.read().len()
    }

    fn entry(&self, id: u64, create: bool) -> Option<Arc<Mutex<IncompleteTx>>> {
        if let Some(entry) = self.responses.read().get(&id) {
            return Some(Arc::clone(entry));
        }
        if !create {
            return None;
        }
        let mut responses = self.responses.write();
        Some(Arc::clone(
            responses.entry(id).or_insert_with(|| {
                Arc::new(Mutex::new(IncompleteTx::new()))
            }),
        ))
    }

    /// The periodic sweep: drop entries past `max_task_timeout`, requeue
    /// entries past `refresh_interval`.
    async fn tick(&self) {
        let now = Instant::now();
        let mut reprocess = Vec::new();
        {
            let mut responses = self.responses.write();
            let mut removed = self.removed.lock();
            removed.clear();
            responses.retain(|&id, entry| {
                let entry = entry.lock();
                let age = now.duration_since(entry.last_touch);
                if age > self.config.max_task_timeout {
                    removed.insert(id);
                    false
                } else {
                    if age > self.config.refresh_interval {
                        reprocess.push(id);
                    }
                    true
                }
            });
        }
        for id in reprocess {
            if self.work_tx.send(WorkItem::Retry(id)).await.is_err() {
                return;
            }
        }
    }

    // ---- fetch pipeline --------------------------------------------------

    async fn fetch(&self, request: &OracleRequest, attempts: u32, id: u64) -> ResponseData {
        let mut response = ResponseData {
            id,
            code: OracleResponseCode::Success,
            result: Vec::new(),
        };
        match url::Url::parse(&request.url) {
            Err(error) => {
                warn!(url = %request.url, %error, "malformed oracle request URL");
                response.code = OracleResponseCode::ProtocolNotSupported;
            }
            Ok(parsed) => match parsed.scheme() {
                "https" => self.fetch_https(request, &mut response).await,
                "neofs" => self.fetch_neofs(request, attempts, id, &mut response).await,
                other => {
                    warn!(scheme = other, "unsupported oracle URL scheme");
                    response.code = OracleResponseCode::ProtocolNotSupported;
                }
            },
        }
        if response.code == OracleResponseCode::Success {
            if let Some(filter) = &request.filter {
                match filter_json(&response.result, filter) {
                    Ok(filtered) => response.result = filtered,
                    Err(error) => {
                        warn!(id, %error, "oracle filter failed");
                        response.code = OracleResponseCode::Error;
                        response.result = Vec::new();
                    }
                }
            }
        }
        if response.code != OracleResponseCode::Success {
            response.result = Vec::new();
        }
        response
    }

    async fn fetch_https(&self, request: &OracleRequest, response: &mut ResponseData) {
        let sent = self
            .http
            .get(&request.url)
            .header("Content-Type", "application/json")
            .send()
            .await;
        let reply = match sent {
            Ok(reply) => reply,
            Err(error) => {
                response.code = if error.is_redirect() {
                    OracleResponseCode::Forbidden
                } else if error.is_timeout() {
                    OracleResponseCode::Timeout
                } else {
                    OracleResponseCode::Error
                };
                warn!(url = %request.url, %error, "oracle https request failed");
                return;
            }
        };
        match reply.status().as_u16() {
            200 => {
                if !self.content_type_allowed(reply.headers()) {
                    response.code = OracleResponseCode::ContentTypeNotSupported;
                    return;
                }
                match reply.bytes().await {
                    Ok(body) if body.len() <= self.config.max_response_size => {
                        response.result = body.to_vec();
                    }
                    Ok(body) => {
                        debug!(size = body.len(), "oracle response too large");
                        response.code = OracleResponseCode::ResponseTooLarge;
                    }
                    Err(error) => {
                        warn!(%error, "failed reading oracle response body");
                        response.code = OracleResponseCode::Error;
                    }
                }
            }
            403 => response.code = OracleResponseCode::Forbidden,
            404 => response.code = OracleResponseCode::NotFound,
            408 => response.code = OracleResponseCode::Timeout,
            status => {
                debug!(status, "oracle endpoint returned an error status");
                response.code = OracleResponseCode::Error;
            }
        }
    }

    async fn fetch_neofs(
        &self,
        request: &OracleRequest,
        attempts: u32,
        id: u64,
        response: &mut ResponseData,
    ) {
        let nodes = &self.config.neofs.nodes;
        if nodes.is_empty() {
            response.code = OracleResponseCode::Error;
            return;
        }
        let node = &nodes[(id as usize + attempts as usize) % nodes.len()];
        let fetched = tokio::time::timeout(
            self.config.neofs.timeout,
            self.neofs.fetch(&request.url, node),
        )
        .await;
        match fetched {
            Ok(Ok(body)) if body.len() <= self.config.max_response_size => {
                response.result = body;
            }
            Ok(Ok(_)) => response.code = OracleResponseCode::ResponseTooLarge,
            Ok(Err(error)) => {
                warn!(%error, "neofs fetch failed");
                response.code = OracleResponseCode::Error;
            }
            Err(_) => response.code = OracleResponseCode::Timeout,
        }
    }

    fn content_type_allowed(&self, headers: &reqwest::header::HeaderMap) -> bool {
        if self.config.allowed_content_types.is_empty() {
            return true;
        }
        let Some(value) = headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        else {
            return false;
        };
        let media_type = value.split(';').next().unwrap_or("").trim();
        self.config
            .allowed_content_types
            .iter()
            .any(|allowed| allowed == media_type)
    }

    // ---- transaction assembly --------------------------------------------

    /// The script every response transaction runs: `Oracle.finish()`.
    fn response_script() -> Vec<u8> {
        let oracle_hash = native_hash("OracleContract");
        let mut builder = ScriptBuilder::new();
        builder.emit(helios_vm::OpCode::NEWARRAY0);
        builder.emit_push_int(CallFlags::ALL.bits() as i64);
        builder.emit_push_string("finish");
        builder.emit_push_bytes(oracle_hash.as_bytes());
        builder.emit_syscall(SYSTEM_CONTRACT_CALL);
        builder.into_bytes()
    }

    /// Builds one candidate response transaction.
    fn create_response_tx(
        &self,
        request: &OracleRequest,
        valid_until_block: u32,
        response: &ResponseData,
    ) -> Result<Transaction> {
        let nodes = self.ledger.oracle_nodes();
        if nodes.is_empty() {
            return Err(Error::Fetch("no designated oracle nodes".into()));
        }
        let m = validators_threshold(nodes.len());
        let script = create_multisig_redeem_script(m, &nodes)?;
        let account = helios_core::UInt160::from_script(&script);

        let mut tx = Transaction::new(
            Self::response_script(),
            vec![Signer::new(account, WitnessScope::NONE)],
        );
        tx.nonce = response.id as u32;
        tx.system_fee = request.gas_for_response;
        tx.network_fee = 1_000_000 + (m as i64) * 1_000_000;
        tx.valid_until_block = valid_until_block;
        tx.attributes = vec![TransactionAttribute::OracleResponse {
            id: response.id,
            code: response.code,
            result: response.result.clone(),
        }];
        Ok(tx)
    }

    fn pool(&self, tx: Transaction) {
        let hash = tx.hash();
        if let Err(error) = (self.on_transaction)(tx) {
            warn!(%hash, error, "cannot pool oracle response transaction");
        }
    }

    /// Processes one request end to end.
    pub async fn process_request(&self, id: u64, request: OracleRequest) -> Result<()> {
        if self.removed.lock().contains(&id) {
            return Err(Error::Expired(id));
        }
        let Some(entry) = self.entry(id, true) else {
            return Ok(());
        };
        let attempts = entry.lock().attempts;

        let response = self.fetch(&request, attempts, id).await;
        debug!(id, code = ?response.code, "oracle request processed");

        // Primary is valid from the request height; backup must outlive the
        // current height whatever happens.
        let current_height = self.ledger.height();
        let increment = self.ledger.settings().max_valid_until_block_increment;
        let request_height = self
            .ledger
            .transaction_height(&request.original_tx_id)
            .unwrap_or(current_height);
        let primary_vub = request_height + increment;
        let mut backup_vub = primary_vub;
        while backup_vub <= current_height {
            backup_vub += increment;
        }

        let tx = self.create_response_tx(&request, primary_vub, &response)?;
        let backup_response = ResponseData {
            id,
            code: OracleResponseCode::ConsensusUnreachable,
            result: Vec::new(),
        };
        let backup_tx = self.create_response_tx(&request, backup_vub, &backup_response)?;

        let magic = self.ledger.settings().magic();
        let tx_signature = self.key.sign(&tx.sign_data(magic))?.to_vec();
        let backup_signature = self.key.sign(&backup_tx.sign_data(magic))?.to_vec();
        let nodes = self.ledger.oracle_nodes();

        let ready = {
            let mut entry = entry.lock();
            entry.request = Some(request);
            entry.tx = Some(tx);
            entry.backup_tx = Some(backup_tx);
            entry.add_response(&self.key.public_key(), tx_signature.clone(), false);
            entry.add_response(&self.key.public_key(), backup_signature, true);
            let ready = match entry.finalize(&nodes, false)? {
                Some(finished) if !entry.is_sent => {
                    entry.is_sent = true;
                    Some(finished)
                }
                _ => None,
            };
            entry.last_touch = Instant::now();
            entry.attempts += 1;
            ready
        };

        self.broadcaster
            .read()
            .send_response(&self.key.public_key(), &response, &tx_signature);
        if let Some(finished) = ready {
            self.pool(finished);
        }
        Ok(())
    }

    /// Retry path: the primary attempt is abandoned for the backup.
    fn process_failed(&self, id: u64) {
        let Some(entry) = self.entry(id, false) else {
            // Answered by the other oracle nodes already.
            return;
        };
        let nodes = self.ledger.oracle_nodes();
        let (resend, ready, signature) = {
            let mut entry = entry.lock();
            if entry.is_sent {
                // Sent but not yet persisted: pool it again.
                (entry.tx.clone(), None, None)
            } else {
                let ready = match entry.finalize(&nodes, true) {
                    Ok(Some(finished)) => {
                        entry.is_sent = true;
                        Some(finished)
                    }
                    _ => None,
                };
                entry.last_touch = Instant::now();
                entry.attempts += 1;
                let signature = entry.backup_signature(&self.key.public_key()).cloned();
                (None, ready, signature)
            }
        };
        if let Some(tx) = resend {
            self.pool(tx);
            return;
        }
        if let Some(signature) = signature {
            let response = ResponseData {
                id,
                code: OracleResponseCode::ConsensusUnreachable,
                result: Vec::new(),
            };
            self.broadcaster
                .read()
                .send_response(&self.key.public_key(), &response, &signature);
        }
        if let Some(finished) = ready {
            self.pool(finished);
        }
    }

    /// Records a signature received from another oracle node.
    ///
    /// When the local candidate is already built the signature is verified
    /// against it; signatures arriving before the candidate are kept and
    /// trusted to the designated-key check only, as the assembled witness is
    /// re-verified by the mempool anyway.
    pub fn add_remote_signature(
        &self,
        key: ECPoint,
        id: u64,
        signature: Vec<u8>,
        backup: bool,
    ) -> Result<()> {
        let nodes = self.ledger.oracle_nodes();
        if !nodes.contains(&key) {
            return Err(Error::Fetch("signature from a non-oracle key".into()));
        }
        let magic = self.ledger.settings().magic();
        let Some(entry) = self.entry(id, true) else {
            return Ok(());
        };
        let ready = {
            let mut entry = entry.lock();
            let candidate = if backup { &entry.backup_tx } else { &entry.tx };
            if let Some(tx) = candidate {
                let data = tx.sign_data(magic);
                if !helios_crypto::Secp256r1::verify(&data, &signature, &key)? {
                    return Err(Error::Fetch("bad oracle response signature".into()));
                }
            }
            entry.add_response(&key, signature, backup);
            match entry.finalize(&nodes, backup)? {
                Some(finished) if !entry.is_sent => {
                    entry.is_sent = true;
                    Some(finished)
                }
                _ => None,
            }
        };
        if let Some(finished) = ready {
            self.pool(finished);
        }
        Ok(())
    }
}
