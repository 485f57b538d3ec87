//! Application engine execution scenarios.

use std::sync::Arc;

use helios_config::ProtocolSettings;
use helios_core::{Signer, Transaction, UInt160, WitnessScope};
use helios_persistence::{DataCache, MemoryStore};
use helios_vm::{CallFlags, OpCode, ScriptBuilder, VMState};

use helios_contract::application_engine::{ApplicationEngine, ScriptContainer, TriggerType};
use helios_contract::native;

fn settings() -> Arc<ProtocolSettings> {
    Arc::new(ProtocolSettings::private())
}

fn engine_with_limit<'a>(
    store: &'a MemoryStore,
    container: Option<ScriptContainer>,
    gas_limit: i64,
) -> ApplicationEngine<'a> {
    ApplicationEngine::new(
        TriggerType::Application,
        container,
        DataCache::new(store),
        None,
        settings(),
        gas_limit,
    )
}

fn arithmetic_script() -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(10);
    builder.emit_push_int(20);
    builder.emit(OpCode::ADD);
    builder.emit(OpCode::RET);
    builder.into_bytes()
}

/// Price of the arithmetic script under the default execution fee factor:
/// two pushes at 1 unit and ADD at 8 units, RET free.
fn arithmetic_price() -> i64 {
    (1 + 1 + 8) * native::policy::DEFAULT_EXEC_FEE_FACTOR as i64
}

#[test]
fn test_simple_arithmetic_halts_with_gas_accounted() {
    let store = MemoryStore::new();
    let mut engine = engine_with_limit(&store, None, 1000);
    engine
        .load_script(arithmetic_script(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Halt);
    assert_eq!(engine.gas_consumed(), arithmetic_price());
    let result = engine.pop_result().unwrap();
    assert_eq!(result.to_int().unwrap(), 30.into());
}

#[test]
fn test_gas_exhaustion_faults_with_reason() {
    let store = MemoryStore::new();
    // One unit short of the ADD instruction's price.
    let mut engine = engine_with_limit(&store, None, arithmetic_price() - 1);
    engine
        .load_script(arithmetic_script(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
    assert_eq!(
        engine.fault_reason().as_deref(),
        Some("gas limit exceeded")
    );
}

#[test]
fn test_execution_is_deterministic() {
    let run = || {
        let store = MemoryStore::new();
        let mut engine = engine_with_limit(&store, None, 1000);
        engine
            .load_script(arithmetic_script(), CallFlags::ALL)
            .unwrap();
        engine.execute();
        let result = engine.pop_result().unwrap().to_bytes().unwrap();
        (result, engine.gas_consumed())
    };
    assert_eq!(run(), run());
}

#[test]
fn test_syscall_without_flags_faults() {
    let store = MemoryStore::new();
    let mut builder = ScriptBuilder::new();
    // Storage.GetContext demands ReadStates.
    builder.emit_syscall(helios_contract::interop::ids::SYSTEM_STORAGE_GET_CONTEXT);
    let mut engine = engine_with_limit(&store, None, 10_000_000);
    engine
        .load_script(builder.into_bytes(), CallFlags::ALLOW_NOTIFY)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
}

#[test]
fn test_unknown_syscall_faults() {
    let store = MemoryStore::new();
    let mut builder = ScriptBuilder::new();
    builder.emit_syscall(0xDEAD_BEEF);
    let mut engine = engine_with_limit(&store, None, 10_000_000);
    engine
        .load_script(builder.into_bytes(), CallFlags::ALL)
        .unwrap();
    assert_eq!(engine.execute(), VMState::Fault);
}

fn tx_with_signer(signer: Signer) -> ScriptContainer {
    let tx = Transaction::new(vec![OpCode::RET.as_byte()], vec![signer]);
    ScriptContainer::Transaction(Arc::new(tx))
}

#[test]
fn test_check_witness_scope_none_is_false() {
    let store = MemoryStore::new();
    let account = UInt160::from_script(b"account");
    let container = tx_with_signer(Signer::new(account, WitnessScope::NONE));
    let engine = engine_with_limit(&store, Some(container), 0);
    assert!(!engine.check_witness(&account).unwrap());
}

#[test]
fn test_check_witness_scope_global_is_true() {
    let store = MemoryStore::new();
    let account = UInt160::from_script(b"account");
    let container = tx_with_signer(Signer::global(account));
    let engine = engine_with_limit(&store, Some(container), 0);
    assert!(engine.check_witness(&account).unwrap());
}

#[test]
fn test_check_witness_unknown_signer_is_false() {
    let store = MemoryStore::new();
    let account = UInt160::from_script(b"account");
    let container = tx_with_signer(Signer::global(account));
    let engine = engine_with_limit(&store, Some(container), 0);
    assert!(!engine
        .check_witness(&UInt160::from_script(b"other"))
        .unwrap());
}

#[test]
fn test_custom_contracts_scope_gates_on_executing_script() {
    let store = MemoryStore::new();
    let account = UInt160::from_script(b"account");
    let script = arithmetic_script();
    let allowed = UInt160::from_script(&script);

    let mut signer = Signer::new(account, WitnessScope::CUSTOM_CONTRACTS);
    signer.allowed_contracts = vec![allowed];
    let container = tx_with_signer(signer);

    let mut engine = engine_with_limit(&store, Some(container), 1000);
    engine.load_script(script, CallFlags::ALL).unwrap();
    // The executing script is on the allow-list.
    assert!(engine.check_witness(&account).unwrap());

    // A different signer with an unrelated allow-list is rejected.
    let mut other = Signer::new(account, WitnessScope::CUSTOM_CONTRACTS);
    other.allowed_contracts = vec![UInt160::zero()];
    let container = tx_with_signer(other);
    let mut engine = engine_with_limit(&store, Some(container), 1000);
    engine
        .load_script(arithmetic_script(), CallFlags::ALL)
        .unwrap();
    assert!(!engine.check_witness(&account).unwrap());
}
