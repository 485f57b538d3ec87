//! Native contract scenarios: policy gating, deployment lifecycle, tokens.

use std::sync::Arc;

use helios_config::ProtocolSettings;
use helios_core::{Signer, Transaction, UInt160, WitnessScope};
use helios_crypto::KeyPair;
use helios_persistence::{DataCache, MemoryStore, Store};
use helios_vm::{CallFlags, OpCode, ScriptBuilder, StackItem, VMState};

use helios_contract::application_engine::{ApplicationEngine, ScriptContainer, TriggerType};
use helios_contract::contract_state::create_contract_hash;
use helios_contract::manifest::abi::{ContractMethod, ParameterType};
use helios_contract::manifest::ContractManifest;
use helios_contract::native;
use helios_contract::nef::NefFile;
use helios_contract::{committee_address, interop};

/// A network whose committee is a single generated key.
struct TestChain {
    store: MemoryStore,
    settings: Arc<ProtocolSettings>,
    committee_key: KeyPair,
}

impl TestChain {
    fn new() -> Self {
        let committee_key = KeyPair::generate();
        let mut settings = ProtocolSettings::private();
        settings.standby_committee = vec![committee_key.public_key().to_string()];
        let settings = Arc::new(settings);

        let store = MemoryStore::new();
        {
            let mut dao = DataCache::new(&store);
            let mut engine = ApplicationEngine::new(
                TriggerType::OnPersist,
                None,
                DataCache::wrap(&dao),
                None,
                Arc::clone(&settings),
                -1,
            );
            native::initialize_all(&mut engine).unwrap();
            let dirty = engine.into_snapshot().into_dirty();
            dao.apply(dirty);
            store.write_batch(dao.into_batch().unwrap());
        }
        Self {
            store,
            settings,
            committee_key,
        }
    }

    fn committee_account(&self) -> UInt160 {
        committee_address(&[self.committee_key.public_key()]).unwrap()
    }

    /// An Application engine whose container is signed (by scope) from
    /// `account`.
    fn engine_signed_by(&self, account: UInt160) -> ApplicationEngine<'_> {
        let tx = Transaction::new(
            vec![OpCode::RET.as_byte()],
            vec![Signer::global(account)],
        );
        ApplicationEngine::new(
            TriggerType::Application,
            Some(ScriptContainer::Transaction(Arc::new(tx))),
            DataCache::new(&self.store),
            None,
            Arc::clone(&self.settings),
            -1,
        )
    }

    fn commit(&self, engine: ApplicationEngine<'_>) {
        let mut dao = DataCache::new(&self.store);
        dao.apply(engine.into_snapshot().into_dirty());
        self.store.write_batch(dao.into_batch().unwrap());
    }
}

fn policy() -> &'static dyn native::NativeContract {
    native::registry().by_id(native::policy::ID).unwrap()
}

fn management() -> &'static dyn native::NativeContract {
    native::registry().by_id(native::management::ID).unwrap()
}

#[test]
fn test_policy_setter_with_committee_witness() {
    let chain = TestChain::new();
    let mut engine = chain.engine_signed_by(chain.committee_account());

    policy()
        .invoke(&mut engine, "setExecFeeFactor", vec![StackItem::from_int(44)])
        .unwrap();
    let factor = policy()
        .invoke(&mut engine, "getExecFeeFactor", vec![])
        .unwrap();
    assert_eq!(factor.to_int().unwrap(), 44.into());

    // Persisted and visible to a fresh snapshot.
    chain.commit(engine);
    let snapshot = DataCache::new(&chain.store);
    assert_eq!(native::policy::exec_fee_factor(&snapshot), 44);
}

#[test]
fn test_policy_setter_without_committee_witness_fails() {
    let chain = TestChain::new();
    let outsider = UInt160::from_script(b"outsider");
    let mut engine = chain.engine_signed_by(outsider);

    let result =
        policy().invoke(&mut engine, "setExecFeeFactor", vec![StackItem::from_int(55)]);
    assert!(result.is_err());

    // Storage unchanged.
    assert_eq!(
        native::policy::exec_fee_factor(engine.snapshot()),
        native::policy::DEFAULT_EXEC_FEE_FACTOR as i64
    );
}

#[test]
fn test_block_account_round_trip() {
    let chain = TestChain::new();
    let mut engine = chain.engine_signed_by(chain.committee_account());
    let victim = UInt160::from_script(b"victim");

    let first = policy()
        .invoke(
            &mut engine,
            "blockAccount",
            vec![StackItem::from_bytes(victim.to_vec())],
        )
        .unwrap();
    assert!(first.to_bool().unwrap());
    assert!(native::policy::is_blocked(engine.snapshot(), &victim));

    let again = policy()
        .invoke(
            &mut engine,
            "blockAccount",
            vec![StackItem::from_bytes(victim.to_vec())],
        )
        .unwrap();
    assert!(!again.to_bool().unwrap());

    policy()
        .invoke(
            &mut engine,
            "unblockAccount",
            vec![StackItem::from_bytes(victim.to_vec())],
        )
        .unwrap();
    assert!(!native::policy::is_blocked(engine.snapshot(), &victim));
}

/// A deployable contract exporting `main` (returns 7) and `die`
/// (destroys itself through ContractManagement).
fn deployable_contract() -> (NefFile, ContractManifest) {
    let mut builder = ScriptBuilder::new();
    // main: push 7, return.
    let main_offset = builder.len() as u32;
    builder.emit_push_int(7);
    builder.emit(OpCode::RET);
    // die: call ContractManagement.destroy().
    let die_offset = builder.len() as u32;
    builder.emit(OpCode::NEWARRAY0);
    builder.emit_push_int(CallFlags::ALL.bits() as i64);
    builder.emit_push_string("destroy");
    builder.emit_push_bytes(native::native_hash("ContractManagement").as_bytes());
    builder.emit_syscall(interop::ids::SYSTEM_CONTRACT_CALL);
    builder.emit(OpCode::DROP);
    builder.emit(OpCode::RET);

    let nef = NefFile::new("helios-test", builder.into_bytes()).unwrap();
    let mut manifest = ContractManifest::new("Example");
    manifest.abi.methods = vec![
        ContractMethod {
            name: "main".into(),
            parameters: vec![],
            return_type: ParameterType::Integer,
            offset: main_offset,
            safe: true,
        },
        ContractMethod {
            name: "die".into(),
            parameters: vec![],
            return_type: ParameterType::Void,
            offset: die_offset,
            safe: false,
        },
    ];
    (nef, manifest)
}

#[test]
fn test_contract_deploy_call_destroy_lifecycle() {
    let chain = TestChain::new();
    let sender = UInt160::from_script(b"deployer");
    let (nef, manifest) = deployable_contract();
    let expected_hash = create_contract_hash(&sender, nef.checksum, "Example");

    // Deploy from a transaction signed by the sender.
    let mut engine = chain.engine_signed_by(sender);
    let deployed = management()
        .invoke(
            &mut engine,
            "deploy",
            vec![
                StackItem::from_bytes(helios_io::to_bytes(&nef).unwrap()),
                StackItem::from_bytes(manifest.to_json().unwrap()),
            ],
        )
        .unwrap();
    let StackItem::Array(fields) = &deployed else {
        panic!("deploy should return the contract state");
    };
    let id = fields.borrow()[0].to_int().unwrap();
    assert!(id > 0.into());
    assert_eq!(
        fields.borrow()[2].to_bytes().unwrap(),
        expected_hash.to_vec()
    );
    let state = native::management::get_contract(engine.snapshot(), &expected_hash)
        .expect("contract must exist after deploy");
    assert_eq!(state.update_counter, 0);
    chain.commit(engine);

    // Call main through the full dispatch machinery.
    let mut engine = chain.engine_signed_by(sender);
    let mut script = ScriptBuilder::new();
    script.emit(OpCode::NEWARRAY0);
    script.emit_push_int(CallFlags::ALL.bits() as i64);
    script.emit_push_string("main");
    script.emit_push_bytes(expected_hash.as_bytes());
    script.emit_syscall(interop::ids::SYSTEM_CONTRACT_CALL);
    engine
        .load_script(script.into_bytes(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Halt);
    assert_eq!(engine.pop_result().unwrap().to_int().unwrap(), 7.into());

    // Destroy through the contract's own `die` method.
    let mut engine = chain.engine_signed_by(sender);
    let mut script = ScriptBuilder::new();
    script.emit(OpCode::NEWARRAY0);
    script.emit_push_int(CallFlags::ALL.bits() as i64);
    script.emit_push_string("die");
    script.emit_push_bytes(expected_hash.as_bytes());
    script.emit_syscall(interop::ids::SYSTEM_CONTRACT_CALL);
    engine
        .load_script(script.into_bytes(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Halt);
    assert!(
        native::management::get_contract(engine.snapshot(), &expected_hash).is_none(),
        "destroyed contract must read back as absent"
    );
    chain.commit(engine);

    let snapshot = DataCache::new(&chain.store);
    assert!(native::management::get_contract(&snapshot, &expected_hash).is_none());
}

/// A contract whose `upgrade` method re-submits its own manifest through
/// ContractManagement.update.
fn upgradeable_contract() -> (NefFile, ContractManifest) {
    let mut manifest = ContractManifest::new("Mutable");
    manifest.abi.methods = vec![
        ContractMethod {
            name: "main".into(),
            parameters: vec![],
            return_type: ParameterType::Integer,
            offset: 0,
            safe: true,
        },
        ContractMethod {
            name: "upgrade".into(),
            parameters: vec![],
            return_type: ParameterType::Void,
            offset: 3,
            safe: false,
        },
    ];
    let manifest_json = manifest.to_json().unwrap();

    let mut builder = ScriptBuilder::new();
    // main at 0: PUSH1, RET (2 bytes) plus a NOP to land upgrade at 3.
    builder.emit_push_int(1);
    builder.emit(OpCode::RET);
    builder.emit(OpCode::NOP);
    // upgrade at 3: Management.update(null, manifest_json).
    builder.emit_push_bytes(&manifest_json);
    builder.emit_push_null();
    builder.emit_push_int(2);
    builder.emit(OpCode::PACK);
    builder.emit_push_int(CallFlags::ALL.bits() as i64);
    builder.emit_push_string("update");
    builder.emit_push_bytes(native::native_hash("ContractManagement").as_bytes());
    builder.emit_syscall(interop::ids::SYSTEM_CONTRACT_CALL);
    builder.emit(OpCode::DROP);
    builder.emit(OpCode::RET);

    let nef = NefFile::new("helios-test", builder.into_bytes()).unwrap();
    (nef, manifest)
}

#[test]
fn test_contract_update_increments_counter() {
    let chain = TestChain::new();
    let sender = UInt160::from_script(b"updater");
    let (nef, manifest) = upgradeable_contract();
    let hash = create_contract_hash(&sender, nef.checksum, "Mutable");

    let mut engine = chain.engine_signed_by(sender);
    management()
        .invoke(
            &mut engine,
            "deploy",
            vec![
                StackItem::from_bytes(helios_io::to_bytes(&nef).unwrap()),
                StackItem::from_bytes(manifest.to_json().unwrap()),
            ],
        )
        .unwrap();
    chain.commit(engine);

    let mut engine = chain.engine_signed_by(sender);
    let mut script = ScriptBuilder::new();
    script.emit(OpCode::NEWARRAY0);
    script.emit_push_int(CallFlags::ALL.bits() as i64);
    script.emit_push_string("upgrade");
    script.emit_push_bytes(hash.as_bytes());
    script.emit_syscall(interop::ids::SYSTEM_CONTRACT_CALL);
    engine
        .load_script(script.into_bytes(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Halt);

    let state = native::management::get_contract(engine.snapshot(), &hash).unwrap();
    assert_eq!(state.update_counter, 1);
    assert_eq!(state.hash, hash, "updates never change the address");
}

#[test]
fn test_gas_mint_burn_and_transfer() {
    let chain = TestChain::new();
    let committee = chain.committee_account();
    let recipient = UInt160::from_script(b"recipient");

    // Genesis distribution landed on the committee address.
    let snapshot = DataCache::new(&chain.store);
    let initial = native::gas::balance_of(&snapshot, &committee);
    assert_eq!(initial, chain.settings.initial_gas_distribution);

    let mut engine = chain.engine_signed_by(committee);
    let gas = native::registry().by_id(native::gas::ID).unwrap();
    let moved = gas
        .invoke(
            &mut engine,
            "transfer",
            vec![
                StackItem::from_bytes(committee.to_vec()),
                StackItem::from_bytes(recipient.to_vec()),
                StackItem::from_int(5_0000_0000i64),
                StackItem::Null,
            ],
        )
        .unwrap();
    assert!(moved.to_bool().unwrap());
    assert_eq!(
        native::gas::balance_of(engine.snapshot(), &recipient),
        5_0000_0000
    );

    // Without the sender's witness the transfer reports false.
    let mut engine = chain.engine_signed_by(recipient);
    let denied = gas
        .invoke(
            &mut engine,
            "transfer",
            vec![
                StackItem::from_bytes(committee.to_vec()),
                StackItem::from_bytes(recipient.to_vec()),
                StackItem::from_int(1),
                StackItem::Null,
            ],
        )
        .unwrap();
    assert!(!denied.to_bool().unwrap());
}

#[test]
fn test_designation_requires_committee_and_versions_by_height() {
    let chain = TestChain::new();
    let node = KeyPair::generate().public_key();

    let mut engine = chain.engine_signed_by(chain.committee_account());
    let role_management = native::registry().by_id(native::role::ID).unwrap();
    role_management
        .invoke(
            &mut engine,
            "designateAsRole",
            vec![
                StackItem::from_int(native::role::Role::Oracle as u8 as i64),
                StackItem::new_array(vec![StackItem::from_bytes(node.to_vec())]),
            ],
        )
        .unwrap();
    // Effective from the next block.
    let designated =
        native::role::designates(engine.snapshot(), native::role::Role::Oracle, 1);
    assert_eq!(designated, vec![node]);
    let before = native::role::designates(engine.snapshot(), native::role::Role::Oracle, 0);
    assert!(before.is_empty());

    // Non-committee designation faults.
    let mut engine = chain.engine_signed_by(UInt160::from_script(b"outsider"));
    let denied = role_management.invoke(
        &mut engine,
        "designateAsRole",
        vec![
            StackItem::from_int(native::role::Role::Oracle as u8 as i64),
            StackItem::new_array(vec![StackItem::from_bytes(node.to_vec())]),
        ],
    );
    assert!(denied.is_err());
}
