//! Block import pipeline scenarios.

use std::sync::Arc;

use helios_config::ProtocolSettings;
use helios_core::{
    compute_merkle_root, Block, Header, Signer, Transaction, UInt160, Witness, WitnessScope,
};
use helios_crypto::KeyPair;
use helios_persistence::{MemoryStore, Store};
use helios_vm::{CallFlags, OpCode, ScriptBuilder, VMState};

use helios_contract::{
    create_multisig_redeem_script, interop, native, validators_address,
};
use helios_ledger::Blockchain;

/// A single-validator network whose key we hold.
struct TestNet {
    chain: Blockchain,
    key: KeyPair,
    settings: Arc<ProtocolSettings>,
}

impl TestNet {
    fn new() -> Self {
        Self::over_store(Arc::new(MemoryStore::new()))
    }

    fn over_store(store: Arc<MemoryStore>) -> Self {
        let key = KeyPair::generate();
        let mut settings = ProtocolSettings::private();
        settings.standby_committee = vec![key.public_key().to_string()];
        let settings = Arc::new(settings);
        let chain = Blockchain::new(store, Arc::clone(&settings)).unwrap();
        Self {
            chain,
            key,
            settings,
        }
    }

    /// Builds and signs the next block.
    fn build_block(&self, transactions: Vec<Transaction>) -> Block {
        let hashes: Vec<_> = transactions.iter().map(Transaction::hash).collect();
        let next_consensus = validators_address(&[self.key.public_key()]).unwrap();
        let mut header = Header::new(
            0,
            self.chain.current_hash(),
            compute_merkle_root(&hashes),
            1_700_000_000_000 + self.chain.height() as u64,
            self.chain.height() + 1,
            0,
            next_consensus,
            Witness::default(),
        );
        let signature = self
            .key
            .sign(&header.sign_data(self.settings.magic()))
            .unwrap();
        let mut invocation = ScriptBuilder::new();
        invocation.emit_push_bytes(&signature);
        let verification =
            create_multisig_redeem_script(1, &[self.key.public_key()]).unwrap();
        header.witness = Witness::new(invocation.into_bytes(), verification);
        Block {
            header,
            transactions,
        }
    }

    fn committee_account(&self) -> UInt160 {
        validators_address(&[self.key.public_key()]).unwrap()
    }

    /// A transaction from the committee account calling GAS.transfer.
    fn transfer_tx(&self, to: UInt160, amount: i64) -> Transaction {
        let from = self.committee_account();
        let mut script = ScriptBuilder::new();
        script.emit_push_null();
        script.emit_push_int(amount);
        script.emit_push_bytes(to.as_bytes());
        script.emit_push_bytes(from.as_bytes());
        script.emit_push_int(4);
        script.emit(OpCode::PACK);
        script.emit_push_int(CallFlags::ALL.bits() as i64);
        script.emit_push_string("transfer");
        script.emit_push_bytes(native::native_hash("GasToken").as_bytes());
        script.emit_syscall(interop::ids::SYSTEM_CONTRACT_CALL);

        let mut tx = Transaction::new(
            script.into_bytes(),
            vec![Signer::new(from, WitnessScope::CALLED_BY_ENTRY)],
        );
        tx.nonce = 7;
        tx.system_fee = 2_0000_0000;
        tx.network_fee = 1_000_000;
        tx.valid_until_block = self.chain.height() + 100;
        let signature = self.key.sign(&tx.sign_data(self.settings.magic())).unwrap();
        let mut invocation = ScriptBuilder::new();
        invocation.emit_push_bytes(&signature);
        tx.witnesses = vec![Witness::new(
            invocation.into_bytes(),
            create_multisig_redeem_script(1, &[self.key.public_key()]).unwrap(),
        )];
        tx
    }
}

#[test]
fn test_genesis_is_imported_on_open() {
    let net = TestNet::new();
    assert_eq!(net.chain.height(), 0);
    assert!(!net.chain.current_hash().is_zero());
    // Natives are deployed.
    let snapshot = net.chain.snapshot();
    for native in native::registry().all() {
        assert!(
            native::management::get_contract(&snapshot, &native.hash()).is_some(),
            "{} missing after genesis",
            native.name()
        );
    }
}

#[test]
fn test_empty_block_import_advances_tip() {
    let net = TestNet::new();
    let block = net.build_block(Vec::new());
    let hash = block.hash();
    net.chain.add_block(block).unwrap();
    assert_eq!(net.chain.height(), 1);
    assert_eq!(net.chain.current_hash(), hash);
    // The block reads back.
    let read = net.chain.block_at(1).unwrap();
    assert_eq!(read.hash(), hash);
}

#[test]
fn test_block_with_bad_prev_hash_rejected() {
    let net = TestNet::new();
    let mut block = net.build_block(Vec::new());
    block.header.prev_hash = helios_core::UInt256::hash_of(b"bogus");
    assert!(net.chain.add_block(block).is_err());
    assert_eq!(net.chain.height(), 0);
}

#[test]
fn test_block_with_bad_witness_rejected() {
    let net = TestNet::new();
    let mut block = net.build_block(Vec::new());
    // A witness from a key that is not the validator.
    let wrong = KeyPair::generate();
    let signature = wrong
        .sign(&block.header.sign_data(net.settings.magic()))
        .unwrap();
    let mut invocation = ScriptBuilder::new();
    invocation.emit_push_bytes(&signature);
    block.header.witness = Witness::new(
        invocation.into_bytes(),
        create_multisig_redeem_script(1, &[wrong.public_key()]).unwrap(),
    );
    assert!(net.chain.add_block(block).is_err());
}

#[test]
fn test_transfer_transaction_executes_and_commits() {
    let net = TestNet::new();
    let recipient = UInt160::from_script(b"recipient");
    let tx = net.transfer_tx(recipient, 5_0000_0000);
    net.chain.pool_transaction(tx.clone()).unwrap();

    let block = net.build_block(vec![tx.clone()]);
    let executed = net.chain.add_block(block).unwrap();
    assert_eq!(executed.len(), 1);
    assert_eq!(executed[0].vm_state, VMState::Halt);
    assert!(executed[0]
        .notifications
        .iter()
        .any(|n| n.event_name == "Transfer"));

    let snapshot = net.chain.snapshot();
    assert_eq!(
        native::gas::balance_of(&snapshot, &recipient),
        5_0000_0000
    );
    // Included transaction left the pool.
    assert!(!net.chain.mempool().lock().contains(&tx.hash()));
    // And is traceable through the ledger.
    let (stored, height) = net.chain.transaction(&tx.hash()).unwrap();
    assert_eq!(stored.hash(), tx.hash());
    assert_eq!(height, 1);
}

#[test]
fn test_faulting_transaction_keeps_fee_burn_but_no_state() {
    let net = TestNet::new();
    let recipient = UInt160::from_script(b"recipient");
    let committee = net.committee_account();

    // A script that always throws.
    let mut script = ScriptBuilder::new();
    script.emit_push_string("boom");
    script.emit(OpCode::THROW);
    let mut tx = Transaction::new(
        script.into_bytes(),
        vec![Signer::new(committee, WitnessScope::CALLED_BY_ENTRY)],
    );
    tx.system_fee = 1_0000_0000;
    tx.network_fee = 1_000_000;
    tx.valid_until_block = 100;
    let signature = net.key.sign(&tx.sign_data(net.settings.magic())).unwrap();
    let mut invocation = ScriptBuilder::new();
    invocation.emit_push_bytes(&signature);
    tx.witnesses = vec![Witness::new(
        invocation.into_bytes(),
        create_multisig_redeem_script(1, &[net.key.public_key()]).unwrap(),
    )];

    let before = {
        let snapshot = net.chain.snapshot();
        native::gas::balance_of(&snapshot, &committee)
    };
    let block = net.build_block(vec![tx]);
    let executed = net.chain.add_block(block).unwrap();
    assert_eq!(executed[0].vm_state, VMState::Fault);
    assert!(executed[0].exception.is_some());

    let snapshot = net.chain.snapshot();
    // Fees were burned even though execution failed.
    assert_eq!(
        native::gas::balance_of(&snapshot, &committee),
        before - 1_0000_0000 - 1_000_000
    );
    assert_eq!(native::gas::balance_of(&snapshot, &recipient), 0);
}

#[test]
fn test_import_is_deterministic_across_nodes() {
    let store_a = Arc::new(MemoryStore::new());
    let store_b = Arc::new(MemoryStore::new());

    // Same validator key on both nodes.
    let key = KeyPair::generate();
    let mut settings = ProtocolSettings::private();
    settings.standby_committee = vec![key.public_key().to_string()];
    let settings = Arc::new(settings);

    let chain_a = Blockchain::new(Arc::clone(&store_a) as Arc<dyn Store>, Arc::clone(&settings))
        .unwrap();
    let chain_b = Blockchain::new(Arc::clone(&store_b) as Arc<dyn Store>, Arc::clone(&settings))
        .unwrap();
    assert_eq!(chain_a.current_hash(), chain_b.current_hash());

    // One block built once, imported by both.
    let hashes: Vec<_> = Vec::new();
    let next_consensus = validators_address(&[key.public_key()]).unwrap();
    let mut header = Header::new(
        0,
        chain_a.current_hash(),
        compute_merkle_root(&hashes),
        1_700_000_000_000,
        1,
        0,
        next_consensus,
        Witness::default(),
    );
    let signature = key.sign(&header.sign_data(settings.magic())).unwrap();
    let mut invocation = ScriptBuilder::new();
    invocation.emit_push_bytes(&signature);
    header.witness = Witness::new(
        invocation.into_bytes(),
        create_multisig_redeem_script(1, &[key.public_key()]).unwrap(),
    );
    let block = Block {
        header,
        transactions: Vec::new(),
    };

    chain_a.add_block(block.clone()).unwrap();
    chain_b.add_block(block).unwrap();

    assert_eq!(chain_a.current_hash(), chain_b.current_hash());
    assert_eq!(store_a.seek(&[]), store_b.seek(&[]));
}

#[test]
fn test_expired_transaction_rejected_by_pool() {
    let net = TestNet::new();
    let mut tx = net.transfer_tx(UInt160::from_script(b"r"), 1);
    tx.valid_until_block = 0;
    tx.witnesses.clear();
    assert!(net.chain.pool_transaction(tx).is_err());
}

#[test]
fn test_verify_transaction_checks_dao_isolation() {
    // A rejected block must leave no storage behind.
    let net = TestNet::new();
    let dump_before = {
        let snapshot = net.chain.snapshot();
        snapshot.find(native::ledger::ID, b"")
    };
    let mut block = net.build_block(Vec::new());
    block.header.prev_hash = helios_core::UInt256::hash_of(b"wrong");
    let _ = net.chain.add_block(block);
    let snapshot = net.chain.snapshot();
    assert_eq!(snapshot.find(native::ledger::ID, b""), dump_before);
}
