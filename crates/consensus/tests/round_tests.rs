//! Single-validator consensus rounds against a real chain.

use std::sync::Arc;

use parking_lot::Mutex;

use helios_config::ProtocolSettings;
use helios_crypto::KeyPair;
use helios_ledger::Blockchain;
use helios_persistence::MemoryStore;

use helios_consensus::{
    ConsensusConfig, ConsensusEvent, ConsensusService, ExtensiblePayload, PayloadRelay,
};

/// Captures relayed payloads for inspection.
struct CapturingRelay {
    payloads: Mutex<Vec<ExtensiblePayload>>,
}

impl CapturingRelay {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(Vec::new()),
        })
    }
}

impl PayloadRelay for CapturingRelay {
    fn relay(&self, payload: ExtensiblePayload) {
        self.payloads.lock().push(payload);
    }
}

fn single_validator_net() -> (Arc<Blockchain>, KeyPair, Arc<ProtocolSettings>) {
    let key = KeyPair::generate();
    let mut settings = ProtocolSettings::private();
    settings.standby_committee = vec![key.public_key().to_string()];
    let settings = Arc::new(settings);
    let chain = Arc::new(
        Blockchain::new(Arc::new(MemoryStore::new()), Arc::clone(&settings)).unwrap(),
    );
    (chain, key, settings)
}

#[test]
fn test_single_validator_round_commits_a_block() {
    let (chain, key, _) = single_validator_net();
    let relay = CapturingRelay::new();
    let (mut service, _events) = ConsensusService::new(
        Arc::clone(&chain),
        Some(key),
        relay.clone(),
        ConsensusConfig::default(),
    )
    .unwrap();

    assert_eq!(chain.height(), 0);
    // With n = 1 the quorum is 1: one timer tick proposes, self-prepares,
    // self-commits and lands the block.
    service.handle(ConsensusEvent::Timer).unwrap();
    assert_eq!(chain.height(), 1);

    // PrepareRequest and Commit both went out.
    let sent = relay.payloads.lock();
    assert!(sent.len() >= 2);

    // The fresh context targets the next height.
    assert_eq!(service.context().block_index, 2);
}

#[test]
fn test_consecutive_rounds_advance_the_chain() {
    let (chain, key, _) = single_validator_net();
    let relay = CapturingRelay::new();
    let (mut service, _events) = ConsensusService::new(
        Arc::clone(&chain),
        Some(key),
        relay,
        ConsensusConfig::default(),
    )
    .unwrap();

    for expected in 1..=3u32 {
        service.handle(ConsensusEvent::Timer).unwrap();
        assert_eq!(chain.height(), expected);
    }
}

#[test]
fn test_watch_only_node_never_signs() {
    let (chain, key, _) = single_validator_net();
    let relay = CapturingRelay::new();
    let config = ConsensusConfig {
        watch_only: true,
        ..ConsensusConfig::default()
    };
    let (mut service, _events) =
        ConsensusService::new(Arc::clone(&chain), Some(key), relay.clone(), config).unwrap();

    service.handle(ConsensusEvent::Timer).unwrap();
    assert_eq!(chain.height(), 0, "watch-only nodes never produce blocks");
    assert!(relay.payloads.lock().is_empty());
}

#[test]
fn test_tampered_payload_is_rejected() {
    let (chain, key, _) = single_validator_net();
    let relay = CapturingRelay::new();
    let (mut service, _events) = ConsensusService::new(
        Arc::clone(&chain),
        Some(key),
        relay.clone(),
        ConsensusConfig::default(),
    )
    .unwrap();

    // Drive one round to capture a well-formed payload shape.
    service.handle(ConsensusEvent::Timer).unwrap();
    let mut payload = relay.payloads.lock().first().cloned().unwrap();

    // Tamper with the data; the witness no longer matches.
    payload.data[0] ^= 0xFF;
    let before = chain.height();
    let _ = service.handle(ConsensusEvent::Payload(payload));
    assert_eq!(chain.height(), before);
}
