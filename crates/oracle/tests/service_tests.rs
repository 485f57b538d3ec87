//! Oracle aggregation scenarios that run without network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use helios_config::ProtocolSettings;
use helios_core::{OracleResponseCode, Transaction, TransactionAttribute, UInt256};
use helios_crypto::{ECPoint, KeyPair};

use helios_contract::native::oracle::OracleRequest;
use helios_oracle::{
    Broadcaster, NoNeoFs, NullBroadcaster, OracleConfig, OracleLedger, OracleService,
    ResponseData,
};

struct MockLedger {
    nodes: Vec<ECPoint>,
    settings: Arc<ProtocolSettings>,
}

impl OracleLedger for MockLedger {
    fn height(&self) -> u32 {
        100
    }

    fn transaction_height(&self, _hash: &UInt256) -> Option<u32> {
        Some(90)
    }

    fn oracle_nodes(&self) -> Vec<ECPoint> {
        self.nodes.clone()
    }

    fn settings(&self) -> Arc<ProtocolSettings> {
        Arc::clone(&self.settings)
    }
}

struct CapturingBroadcaster {
    sent: Mutex<Vec<ResponseData>>,
}

impl Broadcaster for CapturingBroadcaster {
    fn send_response(&self, _key: &ECPoint, response: &ResponseData, _tx_signature: &[u8]) {
        self.sent.lock().push(response.clone());
    }
    fn run(&self) {}
    fn shutdown(&self) {}
}

fn request(url: &str, filter: Option<&str>) -> OracleRequest {
    OracleRequest {
        original_tx_id: UInt256::hash_of(b"origin"),
        gas_for_response: 1_0000_0000,
        url: url.to_string(),
        filter: filter.map(str::to_string),
        callback_contract: helios_core::UInt160::from_script(b"callback"),
        callback_method: "onOracleResponse".to_string(),
        user_data: Vec::new(),
    }
}

struct Setup {
    service: Arc<OracleService>,
    keys: Vec<KeyPair>,
    pooled: Arc<Mutex<Vec<Transaction>>>,
    pool_calls: Arc<AtomicUsize>,
    broadcaster: Arc<CapturingBroadcaster>,
}

/// A 4-node oracle set (threshold 3) where this process holds `keys[0]`.
fn setup() -> Setup {
    let keys: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
    let nodes: Vec<ECPoint> = keys.iter().map(KeyPair::public_key).collect();
    let ledger = Arc::new(MockLedger {
        nodes,
        settings: Arc::new(ProtocolSettings::private()),
    });
    let pooled = Arc::new(Mutex::new(Vec::new()));
    let pool_calls = Arc::new(AtomicUsize::new(0));
    let broadcaster = Arc::new(CapturingBroadcaster {
        sent: Mutex::new(Vec::new()),
    });

    let pooled_in_cb = Arc::clone(&pooled);
    let calls_in_cb = Arc::clone(&pool_calls);
    let service = OracleService::new(
        OracleConfig::default(),
        keys[0].clone(),
        ledger,
        broadcaster.clone(),
        Arc::new(NoNeoFs),
        Arc::new(move |tx| {
            calls_in_cb.fetch_add(1, Ordering::SeqCst);
            pooled_in_cb.lock().push(tx);
            Ok(())
        }),
    )
    .unwrap();
    Setup {
        service: Arc::new(service),
        keys,
        pooled,
        pool_calls,
        broadcaster,
    }
}

#[tokio::test]
async fn test_unsupported_scheme_yields_protocol_not_supported() {
    let context = setup();
    context
        .service
        .process_request(1, request("ftp://example/x", None))
        .await
        .unwrap();

    // The local signature was broadcast with the computed code.
    let sent = context.broadcaster.sent.lock();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].code, OracleResponseCode::ProtocolNotSupported);
    assert!(sent[0].result.is_empty());
    // One of four signatures is below the threshold: nothing pooled yet.
    assert_eq!(context.pool_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_threshold_signatures_pool_exactly_once() {
    let context = setup();
    context
        .service
        .process_request(5, request("ftp://example/x", None))
        .await
        .unwrap();

    let magic = ProtocolSettings::private().magic();
    {
        let sent = context.broadcaster.sent.lock();
        assert_eq!(sent[0].id, 5);
    }

    // The other nodes compute the same candidate independently and sign it.
    let reconstructed = reconstruct_primary(&context, 5, request("ftp://example/x", None));
    let sign_data = reconstructed.sign_data(magic);

    let sig1 = context.keys[1].sign(&sign_data).unwrap().to_vec();
    context
        .service
        .add_remote_signature(context.keys[1].public_key(), 5, sig1, false)
        .unwrap();
    assert_eq!(context.pool_calls.load(Ordering::SeqCst), 0);

    let sig2 = context.keys[2].sign(&sign_data).unwrap().to_vec();
    context
        .service
        .add_remote_signature(context.keys[2].public_key(), 5, sig2, false)
        .unwrap();
    // Threshold of 3 reached: pooled exactly once.
    assert_eq!(context.pool_calls.load(Ordering::SeqCst), 1);

    // A late fourth signature must not pool again.
    let sig3 = context.keys[3].sign(&sign_data).unwrap().to_vec();
    context
        .service
        .add_remote_signature(context.keys[3].public_key(), 5, sig3, false)
        .unwrap();
    assert_eq!(context.pool_calls.load(Ordering::SeqCst), 1);

    let pooled = context.pooled.lock();
    assert_eq!(pooled.len(), 1);
    let attribute = pooled[0].oracle_response().unwrap();
    match attribute {
        TransactionAttribute::OracleResponse { id, code, .. } => {
            assert_eq!(*id, 5);
            assert_eq!(*code, OracleResponseCode::ProtocolNotSupported);
        }
        _ => panic!("expected an oracle response attribute"),
    }
    assert_eq!(pooled[0].witnesses.len(), 1);
}

#[tokio::test]
async fn test_signature_from_unknown_key_rejected() {
    let context = setup();
    context
        .service
        .process_request(9, request("ftp://example/x", None))
        .await
        .unwrap();
    let stranger = KeyPair::generate();
    let result =
        context
            .service
            .add_remote_signature(stranger.public_key(), 9, vec![0u8; 64], false);
    assert!(result.is_err());
}

/// Rebuilds the primary candidate transaction the service derives for a
/// request, using the same ledger constants as [`MockLedger`].
fn reconstruct_primary(context: &Setup, id: u64, request: OracleRequest) -> Transaction {
    use helios_contract::{create_multisig_redeem_script, validators_threshold};
    use helios_core::{Signer, WitnessScope};

    let nodes: Vec<ECPoint> = context.keys.iter().map(KeyPair::public_key).collect();
    let m = validators_threshold(nodes.len());
    let script = create_multisig_redeem_script(m, &nodes).unwrap();
    let account = helios_core::UInt160::from_script(&script);
    let settings = ProtocolSettings::private();

    // request height 90 + increment, as MockLedger reports.
    let valid_until_block = 90 + settings.max_valid_until_block_increment;

    let mut tx = Transaction::new(
        oracle_response_script(),
        vec![Signer::new(account, WitnessScope::NONE)],
    );
    tx.nonce = id as u32;
    tx.system_fee = request.gas_for_response;
    tx.network_fee = 1_000_000 + (m as i64) * 1_000_000;
    tx.valid_until_block = valid_until_block;
    tx.attributes = vec![TransactionAttribute::OracleResponse {
        id,
        code: OracleResponseCode::ProtocolNotSupported,
        result: Vec::new(),
    }];
    tx
}

/// The canonical `Oracle.finish` invocation script.
fn oracle_response_script() -> Vec<u8> {
    use helios_contract::interop::ids::SYSTEM_CONTRACT_CALL;
    use helios_contract::native::native_hash;
    use helios_vm::{CallFlags, OpCode, ScriptBuilder};

    let mut builder = ScriptBuilder::new();
    builder.emit(OpCode::NEWARRAY0);
    builder.emit_push_int(CallFlags::ALL.bits() as i64);
    builder.emit_push_string("finish");
    builder.emit_push_bytes(native_hash("OracleContract").as_bytes());
    builder.emit_syscall(SYSTEM_CONTRACT_CALL);
    builder.into_bytes()
}

#[tokio::test]
async fn test_remove_requests_clears_entries() {
    let context = setup();
    context
        .service
        .process_request(11, request("ftp://example/x", None))
        .await
        .unwrap();
    assert_eq!(context.service.pending(), 1);
    context.service.remove_requests(&[11]);
    assert_eq!(context.service.pending(), 0);
}

#[test]
fn test_null_broadcaster_is_inert() {
    let broadcaster = NullBroadcaster;
    broadcaster.run();
    broadcaster.send_response(
        &KeyPair::generate().public_key(),
        &ResponseData {
            id: 0,
            code: OracleResponseCode::Success,
            result: Vec::new(),
        },
        &[],
    );
    broadcaster.shutdown();
}
