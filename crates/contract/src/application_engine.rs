//! The application engine: gas metering, syscall dispatch and the ambient
//! state of one top-level script execution.

use std::rc::Rc;
use std::sync::Arc;

use helios_config::ProtocolSettings;
use helios_core::{Block, Header, Transaction, UInt160, WitnessScope};
use helios_persistence::{DataCache, StorageItem, StorageKey};
use helios_vm::stack_item::serializer::serialize_item;
use helios_vm::{
    CallFlags, ExecutionContext, ExecutionEngine, ExecutionEngineLimits, OpCode, Script,
    StackItem, VMState, VmError,
};

use crate::interop;
use crate::manifest::ParameterType;
use crate::native::{self, NativeRegistry};
use crate::{Error, Result};

/// Why the VM was invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TriggerType {
    /// Native bookkeeping before a block's transactions.
    OnPersist = 0x01,
    /// Native bookkeeping after a block's transactions.
    PostPersist = 0x02,
    /// Witness verification.
    Verification = 0x20,
    /// Ordinary transaction execution.
    Application = 0x40,
}

/// The object whose execution this engine hosts.
#[derive(Debug, Clone)]
pub enum ScriptContainer {
    /// A transaction.
    Transaction(Arc<Transaction>),
    /// A block header (witness verification).
    Header(Arc<Header>),
}

impl ScriptContainer {
    /// Data witnesses sign: network magic followed by the container hash.
    pub fn sign_data(&self, network_magic: u32) -> Vec<u8> {
        match self {
            ScriptContainer::Transaction(tx) => tx.sign_data(network_magic),
            ScriptContainer::Header(header) => header.sign_data(network_magic),
        }
    }

    /// The wrapped transaction, when there is one.
    pub fn as_transaction(&self) -> Option<&Transaction> {
        match self {
            ScriptContainer::Transaction(tx) => Some(tx),
            ScriptContainer::Header(_) => None,
        }
    }
}

/// One `System.Runtime.Notify` emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationEvent {
    /// The contract that emitted it.
    pub script_hash: UInt160,
    /// Event name.
    pub event_name: String,
    /// Canonically serialized state array; empty when unserializable.
    pub state: Vec<u8>,
}

/// One `System.Runtime.Log` emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// The contract that emitted it.
    pub script_hash: UInt160,
    /// The message.
    pub message: String,
}

/// Hosts one top-level script execution: wraps the VM engine with gas
/// accounting, the DAO snapshot, the syscall registry and native dispatch.
pub struct ApplicationEngine<'a> {
    trigger: TriggerType,
    engine: ExecutionEngine,
    snapshot: DataCache<'a>,
    settings: Arc<ProtocolSettings>,
    gas_limit: i64,
    gas_consumed: i64,
    exec_fee_factor: i64,
    storage_price: i64,
    container: Option<ScriptContainer>,
    persisting_block: Option<Arc<Block>>,
    notifications: Vec<NotificationEvent>,
    logs: Vec<LogEvent>,
    natives: &'static NativeRegistry,
}

impl<'a> ApplicationEngine<'a> {
    /// Creates an engine over `snapshot` with `gas_limit` datoshi to spend.
    pub fn new(
        trigger: TriggerType,
        container: Option<ScriptContainer>,
        snapshot: DataCache<'a>,
        persisting_block: Option<Arc<Block>>,
        settings: Arc<ProtocolSettings>,
        gas_limit: i64,
    ) -> Self {
        let exec_fee_factor = native::policy::exec_fee_factor(&snapshot);
        let storage_price = native::policy::storage_price(&snapshot);
        Self {
            trigger,
            engine: ExecutionEngine::new(ExecutionEngineLimits::default()),
            snapshot,
            settings,
            gas_limit,
            gas_consumed: 0,
            exec_fee_factor,
            storage_price,
            container,
            persisting_block,
            notifications: Vec::new(),
            logs: Vec::new(),
            natives: native::registry(),
        }
    }

    /// The trigger this engine runs under.
    pub fn trigger(&self) -> TriggerType {
        self.trigger
    }

    /// Network settings.
    pub fn settings(&self) -> &ProtocolSettings {
        &self.settings
    }

    /// The container being executed, if any.
    pub fn container(&self) -> Option<&ScriptContainer> {
        self.container.as_ref()
    }

    /// The block being persisted, during OnPersist/PostPersist/Application.
    pub fn persisting_block(&self) -> Option<&Block> {
        self.persisting_block.as_deref()
    }

    /// Height the currently-persisting block will have, or the snapshot
    /// height plus one when no block is attached.
    pub fn persisting_index(&self) -> u32 {
        match &self.persisting_block {
            Some(block) => block.index(),
            None => native::ledger::current_index(&self.snapshot)
                .map(|index| index + 1)
                .unwrap_or(0),
        }
    }

    /// The native contract registry.
    pub fn natives(&self) -> &'static NativeRegistry {
        self.natives
    }

    /// The underlying VM engine.
    pub fn vm(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// The underlying VM engine, mutable. Interop handlers use this for
    /// stack access.
    pub fn vm_mut(&mut self) -> &mut ExecutionEngine {
        &mut self.engine
    }

    /// The DAO snapshot.
    pub fn snapshot(&self) -> &DataCache<'a> {
        &self.snapshot
    }

    /// The DAO snapshot, mutable.
    pub fn snapshot_mut(&mut self) -> &mut DataCache<'a> {
        &mut self.snapshot
    }

    /// Consumes the engine, handing back its snapshot for commit.
    pub fn into_snapshot(self) -> DataCache<'a> {
        self.snapshot
    }

    /// Gas spent so far, in datoshi.
    pub fn gas_consumed(&self) -> i64 {
        self.gas_consumed
    }

    /// Gas remaining before the limit, in datoshi.
    pub fn gas_left(&self) -> i64 {
        self.gas_limit - self.gas_consumed
    }

    /// The execution fee factor in force.
    pub fn exec_fee_factor(&self) -> i64 {
        self.exec_fee_factor
    }

    /// Per-byte storage price in force.
    pub fn storage_price(&self) -> i64 {
        self.storage_price
    }

    /// Collected notifications in emission order.
    pub fn notifications(&self) -> &[NotificationEvent] {
        &self.notifications
    }

    /// Collected log lines in emission order.
    pub fn logs(&self) -> &[LogEvent] {
        &self.logs
    }

    /// Final state of the engine.
    pub fn state(&self) -> VMState {
        self.engine.state()
    }

    /// The fault reason, after a FAULT.
    pub fn fault_reason(&self) -> Option<String> {
        self.engine.fault_error().map(|e| e.to_string())
    }

    /// Charges `amount` datoshi, faulting past the limit.
    pub fn add_gas(&mut self, amount: i64) -> Result<()> {
        self.gas_consumed = self.gas_consumed.saturating_add(amount);
        if self.gas_limit >= 0 && self.gas_consumed > self.gas_limit {
            return Err(Error::Vm(VmError::GasExhausted));
        }
        Ok(())
    }

    /// Hash of the currently executing script.
    pub fn current_script_hash(&self) -> Option<UInt160> {
        self.engine
            .current_context()
            .and_then(|c| c.script_hash())
            .map(UInt160::from_array)
    }

    /// Hash of the script that called the current one.
    pub fn calling_script_hash(&self) -> Option<UInt160> {
        let stack = self.engine.invocation_stack();
        if stack.len() < 2 {
            return None;
        }
        stack[stack.len() - 2]
            .script_hash()
            .map(UInt160::from_array)
    }

    /// Hash of the entry script.
    pub fn entry_script_hash(&self) -> Option<UInt160> {
        self.engine
            .entry_context()
            .and_then(|c| c.script_hash())
            .map(UInt160::from_array)
    }

    /// Call flags of the current context.
    pub fn current_call_flags(&self) -> CallFlags {
        self.engine
            .current_context()
            .map(|c| c.call_flags())
            .unwrap_or(CallFlags::ALL)
    }

    /// Loads the entry script with the given flags.
    pub fn load_script(&mut self, script: Vec<u8>, flags: CallFlags) -> Result<()> {
        let hash = UInt160::from_script(&script);
        let mut context = ExecutionContext::new(
            Rc::new(Script::new(script)),
            -1,
            self.engine.reference_counter(),
        );
        context.set_script_hash(*hash.as_bytes());
        context.set_call_flags(flags);
        self.engine.load_context(context)?;
        Ok(())
    }

    /// Runs to completion, translating errors into a FAULT.
    pub fn execute(&mut self) -> VMState {
        loop {
            match self.step() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(error) => {
                    let vm_error = match error {
                        Error::Vm(e) => e,
                        other => VmError::InvalidOperation(other.fault_reason()),
                    };
                    self.engine.fault(vm_error);
                    break;
                }
            }
        }
        self.engine.state()
    }

    /// Executes one instruction with gas metering. Returns false once the
    /// engine reached a final state.
    fn step(&mut self) -> Result<bool> {
        match self.engine.state() {
            VMState::Halt | VMState::Fault => return Ok(false),
            _ => {}
        }
        match self.engine.peek_instruction()? {
            None => {
                // Implicit RET at end-of-script carries no price.
                self.engine.execute_next()?;
            }
            Some(instruction) => {
                self.add_gas(instruction.opcode.price() * self.exec_fee_factor)?;
                if instruction.opcode == OpCode::SYSCALL {
                    let id = instruction.operand_u32()?;
                    // Move past the SYSCALL before dispatch so contexts the
                    // handler loads return to the right place.
                    let context = self
                        .engine
                        .current_context_mut()
                        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
                    let next = context.instruction_pointer() + instruction.encoded_len;
                    context.set_instruction_pointer(next)?;
                    self.dispatch_syscall(id)?;
                } else {
                    self.engine.execute_next()?;
                }
            }
        }
        Ok(!matches!(
            self.engine.state(),
            VMState::Halt | VMState::Fault
        ))
    }

    fn dispatch_syscall(&mut self, id: u32) -> Result<()> {
        let descriptor = interop::lookup(id).ok_or_else(|| {
            Error::Vm(VmError::SyscallFailed(id, "unknown syscall".into()))
        })?;
        let flags = self.current_call_flags();
        if !flags.contains(descriptor.required_flags) {
            return Err(Error::Vm(VmError::MissingCallFlags(format!(
                "{} requires {:?}",
                descriptor.name, descriptor.required_flags
            ))));
        }
        self.add_gas(descriptor.price * self.exec_fee_factor)?;
        (descriptor.handler)(self)
    }

    /// Pops the top of the result stack after a HALT.
    pub fn pop_result(&mut self) -> Result<StackItem> {
        let stack = Rc::clone(self.engine.result_stack());
        let item = stack.borrow_mut().pop()?;
        Ok(item)
    }

    /// Number of items on the result stack.
    pub fn result_count(&self) -> usize {
        self.engine.result_stack().borrow().len()
    }

    // ---- storage access for interops and natives -------------------------

    /// Reads raw storage under a contract id.
    pub fn storage_get(&self, id: i32, key: &[u8]) -> Option<Vec<u8>> {
        self.snapshot
            .try_get(&StorageKey::new(id, key.to_vec()))
            .map(|item| item.value)
    }

    /// Writes raw storage under a contract id.
    pub fn storage_put(&mut self, id: i32, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.snapshot
            .put(StorageKey::new(id, key.to_vec()), StorageItem::new(value))?;
        Ok(())
    }

    /// Deletes raw storage under a contract id.
    pub fn storage_delete(&mut self, id: i32, key: &[u8]) -> Result<()> {
        self.snapshot.delete(StorageKey::new(id, key.to_vec()))?;
        Ok(())
    }

    /// Deterministic prefix scan under a contract id.
    pub fn storage_find(&self, id: i32, prefix: &[u8]) -> Vec<(StorageKey, StorageItem)> {
        self.snapshot.find(id, prefix)
    }

    // ---- runtime services ------------------------------------------------

    /// Appends a notification from the current contract.
    pub fn notify(&mut self, event_name: String, state: Vec<StackItem>) -> Result<()> {
        let script_hash = self.current_script_hash().unwrap_or_default();
        let state_item = StackItem::new_array(state);
        let state = serialize_item(&state_item, self.engine.limits()).unwrap_or_default();
        self.notifications.push(NotificationEvent {
            script_hash,
            event_name,
            state,
        });
        Ok(())
    }

    /// Appends a log line from the current contract.
    pub fn log(&mut self, message: String) -> Result<()> {
        let script_hash = self.current_script_hash().unwrap_or_default();
        self.logs.push(LogEvent {
            script_hash,
            message,
        });
        Ok(())
    }

    /// Evaluates `CheckWitness` for `hash` against the container's signers
    /// and their scopes.
    pub fn check_witness(&self, hash: &UInt160) -> Result<bool> {
        let Some(ScriptContainer::Transaction(tx)) = &self.container else {
            return Ok(false);
        };
        let Some(signer) = tx.signers.iter().find(|s| &s.account == hash) else {
            return Ok(false);
        };
        let scopes = signer.scopes;
        if scopes.is_empty() {
            return Ok(false);
        }
        if scopes.contains(WitnessScope::GLOBAL) {
            return Ok(true);
        }
        if scopes.contains(WitnessScope::CALLED_BY_ENTRY) {
            let entry = self.entry_script_hash();
            let current = self.current_script_hash();
            let calling = self.calling_script_hash();
            if current == entry || calling == entry {
                return Ok(true);
            }
        }
        if scopes.contains(WitnessScope::CUSTOM_CONTRACTS) {
            if let Some(current) = self.current_script_hash() {
                if signer.allowed_contracts.contains(&current) {
                    return Ok(true);
                }
            }
        }
        if scopes.contains(WitnessScope::CUSTOM_GROUPS) {
            if !self.current_call_flags().contains(CallFlags::READ_STATES) {
                return Err(Error::PermissionDenied(
                    "CustomGroups witness check requires ReadStates".into(),
                ));
            }
            if let Some(current) = self.current_script_hash() {
                if let Some(state) = native::management::get_contract(&self.snapshot, &current) {
                    let groups = state.manifest.group_keys();
                    if signer.allowed_groups.iter().any(|g| groups.contains(g)) {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// True when the committee's multi-signature witnessed the container.
    pub fn check_committee_witness(&self) -> Result<bool> {
        let committee = native::neo::committee_keys(&self.snapshot, &self.settings)?;
        let address = crate::contract::committee_address(&committee)?;
        self.check_witness(&address)
    }

    // ---- inter-contract calls --------------------------------------------

    /// `System.Contract.Call` semantics; `internal` additionally permits
    /// reserved method names such as `_deploy`.
    pub fn call_contract(
        &mut self,
        target: UInt160,
        method: &str,
        args: Vec<StackItem>,
        requested: CallFlags,
        internal: bool,
    ) -> Result<()> {
        if method.starts_with('_') && !internal {
            return Err(Error::PermissionDenied(format!(
                "reserved method {method} cannot be called directly"
            )));
        }
        let contract = native::management::get_contract(&self.snapshot, &target)
            .ok_or_else(|| Error::ContractNotFound(target.to_string()))?;

        if let Some(current) = self.current_script_hash() {
            if let Some(caller) = native::management::get_contract(&self.snapshot, &current) {
                let target_groups = contract.manifest.group_keys();
                if !caller.manifest.can_call(&target, &target_groups, method) {
                    return Err(Error::PermissionDenied(format!(
                        "{current} may not call {method} on {target}"
                    )));
                }
            }
        }

        let flags = self.current_call_flags() & requested;

        if contract.is_native() {
            let native = self
                .natives
                .by_hash(&target)
                .ok_or_else(|| Error::ContractNotFound(target.to_string()))?;
            if native.method(method, args.len()).is_none() {
                return Err(Error::MethodNotFound(format!(
                    "{}::{method}",
                    native.name()
                )));
            }
            let stub = Rc::new(Script::new(self.natives.stub_script()));
            let mut context =
                ExecutionContext::new(stub, 1, self.engine.reference_counter());
            context.set_script_hash(*target.as_bytes());
            context.set_call_flags(flags);
            {
                let stack = context.evaluation_stack();
                let mut stack = stack.borrow_mut();
                stack.push(StackItem::new_array(args));
                stack.push(StackItem::from_bytes(method.as_bytes().to_vec()));
            }
            self.engine.load_context(context)?;
            return Ok(());
        }

        let abi_method = contract
            .manifest
            .abi
            .get_method(method, args.len())
            .ok_or_else(|| Error::MethodNotFound(format!("{target}::{method}")))?;
        let flags = if abi_method.safe {
            flags & CallFlags::READ_ONLY
        } else {
            flags
        };
        let rvcount = if abi_method.return_type == ParameterType::Void {
            0
        } else {
            1
        };
        let script = Rc::new(Script::new(contract.script().to_vec()));
        let mut context =
            ExecutionContext::new(script, rvcount, self.engine.reference_counter());
        context.set_instruction_pointer(abi_method.offset as usize)?;
        context.set_script_hash(*target.as_bytes());
        context.set_call_flags(flags);
        {
            let stack = context.evaluation_stack();
            let mut stack = stack.borrow_mut();
            for arg in args.into_iter().rev() {
                stack.push(arg);
            }
        }
        self.engine.load_context(context)?;
        Ok(())
    }
}

/// Verifies one witness against sign data, running the verification script
/// in a Verification-trigger engine.
pub fn verify_witness(
    settings: &Arc<ProtocolSettings>,
    snapshot: DataCache<'_>,
    container: ScriptContainer,
    expected_hash: &UInt160,
    witness: &helios_core::Witness,
    gas_limit: i64,
) -> Result<bool> {
    if &witness.script_hash() != expected_hash {
        return Ok(false);
    }
    // Invocation scripts may only push.
    let mut position = 0;
    while position < witness.invocation_script.len() {
        let instruction =
            helios_vm::Instruction::decode(&witness.invocation_script, position)
                .map_err(Error::Vm)?;
        if instruction.opcode.as_byte() > OpCode::PUSH16.as_byte() {
            return Ok(false);
        }
        position += instruction.encoded_len;
    }

    let mut engine = ApplicationEngine::new(
        TriggerType::Verification,
        Some(container),
        snapshot,
        None,
        Arc::clone(settings),
        gas_limit,
    );
    engine.load_script(witness.verification_script.clone(), CallFlags::READ_ONLY)?;
    if !witness.invocation_script.is_empty() {
        let invocation = Rc::new(Script::new(witness.invocation_script.clone()));
        let context =
            ExecutionContext::new(invocation, -1, engine.vm().reference_counter());
        engine.vm_mut().load_context(context)?;
    }
    if engine.execute() != VMState::Halt {
        return Ok(false);
    }
    if engine.result_count() != 1 {
        return Ok(false);
    }
    let result = engine.pop_result()?;
    Ok(result.to_bool().unwrap_or(false))
}
