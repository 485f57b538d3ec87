//! Per-script execution frames.

use std::cell::RefCell;
use std::rc::Rc;

use crate::call_flags::CallFlags;
use crate::evaluation_stack::EvaluationStack;
use crate::exception_handling::TryContext;
use crate::reference_counter::ReferenceCounter;
use crate::script::Script;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

/// A fixed-size variable slot (statics, locals or arguments).
#[derive(Debug, Clone)]
pub struct Slot {
    items: Rc<RefCell<Vec<StackItem>>>,
}

impl Slot {
    /// Creates a slot of `count` entries, all Null.
    pub fn new(count: usize) -> Self {
        Self {
            items: Rc::new(RefCell::new(vec![StackItem::Null; count])),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    /// True when the slot has no entries.
    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    /// Reads entry `index`.
    pub fn get(&self, index: usize) -> VmResult<StackItem> {
        self.items
            .borrow()
            .get(index)
            .cloned()
            .ok_or_else(|| VmError::OutOfRange(format!("slot index {index} out of bounds")))
    }

    /// Writes entry `index`.
    pub fn set(&self, index: usize, item: StackItem) -> VmResult<()> {
        let mut items = self.items.borrow_mut();
        let entry = items
            .get_mut(index)
            .ok_or_else(|| VmError::OutOfRange(format!("slot index {index} out of bounds")))?;
        *entry = item;
        Ok(())
    }
}

/// One frame of the invocation stack.
///
/// Contexts created by CALL within the same script share the caller's
/// evaluation stack and static fields; contexts created for inter-contract
/// calls get an isolated stack, so a callee can never observe its caller's
/// operands.
#[derive(Debug)]
pub struct ExecutionContext {
    script: Rc<Script>,
    instruction_pointer: usize,
    evaluation_stack: Rc<RefCell<EvaluationStack>>,
    static_fields: Option<Slot>,
    local_variables: Option<Slot>,
    arguments: Option<Slot>,
    try_stack: Vec<TryContext>,
    rvcount: i32,
    call_flags: CallFlags,
    script_hash: Option<[u8; 20]>,
}

impl ExecutionContext {
    /// Creates a frame with a fresh evaluation stack.
    pub fn new(script: Rc<Script>, rvcount: i32, counter: &ReferenceCounter) -> Self {
        Self {
            script,
            instruction_pointer: 0,
            evaluation_stack: Rc::new(RefCell::new(EvaluationStack::new(counter.clone()))),
            static_fields: None,
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
            rvcount,
            call_flags: CallFlags::ALL,
            script_hash: None,
        }
    }

    /// Clones this frame for a same-script CALL: shares the evaluation stack
    /// and static fields, starts at `position` with fresh locals and an
    /// empty try stack.
    pub fn fork(&self, position: usize) -> Self {
        Self {
            script: Rc::clone(&self.script),
            instruction_pointer: position,
            evaluation_stack: Rc::clone(&self.evaluation_stack),
            static_fields: self.static_fields.clone(),
            local_variables: None,
            arguments: None,
            try_stack: Vec::new(),
            rvcount: -1,
            call_flags: self.call_flags,
            script_hash: self.script_hash,
        }
    }

    /// The script this frame executes.
    pub fn script(&self) -> &Rc<Script> {
        &self.script
    }

    /// Current instruction pointer.
    pub fn instruction_pointer(&self) -> usize {
        self.instruction_pointer
    }

    /// Moves the instruction pointer, validating bounds.
    ///
    /// Pointing exactly at end-of-script is allowed; execution there
    /// performs an implicit RET.
    pub fn set_instruction_pointer(&mut self, position: usize) -> VmResult<()> {
        if position > self.script.len() {
            return Err(VmError::InvalidScript(format!(
                "jump target {position} beyond script end {}",
                self.script.len()
            )));
        }
        self.instruction_pointer = position;
        Ok(())
    }

    /// Shared handle to this frame's evaluation stack.
    pub fn evaluation_stack(&self) -> &Rc<RefCell<EvaluationStack>> {
        &self.evaluation_stack
    }

    /// Declared return-value count; -1 means "all remaining".
    pub fn rvcount(&self) -> i32 {
        self.rvcount
    }

    /// The context's permission mask.
    pub fn call_flags(&self) -> CallFlags {
        self.call_flags
    }

    /// Restricts the permission mask.
    pub fn set_call_flags(&mut self, flags: CallFlags) {
        self.call_flags = flags;
    }

    /// The hash of the executing script, when the host assigned one.
    pub fn script_hash(&self) -> Option<[u8; 20]> {
        self.script_hash
    }

    /// Assigns the script hash.
    pub fn set_script_hash(&mut self, hash: [u8; 20]) {
        self.script_hash = Some(hash);
    }

    /// Static field slot, shared across forks of this invocation.
    pub fn static_fields(&self) -> Option<&Slot> {
        self.static_fields.as_ref()
    }

    /// Initializes the static field slot.
    pub fn init_static_fields(&mut self, count: usize) -> VmResult<()> {
        if self.static_fields.is_some() {
            return Err(VmError::invalid_operation(
                "static fields already initialized",
            ));
        }
        self.static_fields = Some(Slot::new(count));
        Ok(())
    }

    /// Local variable slot.
    pub fn local_variables(&self) -> Option<&Slot> {
        self.local_variables.as_ref()
    }

    /// Argument slot.
    pub fn arguments(&self) -> Option<&Slot> {
        self.arguments.as_ref()
    }

    /// Initializes locals and arguments; INITSLOT may run once per frame.
    pub fn init_slot(&mut self, locals: usize, arguments: Vec<StackItem>) -> VmResult<()> {
        if self.local_variables.is_some() || self.arguments.is_some() {
            return Err(VmError::invalid_operation("slot already initialized"));
        }
        if locals > 0 {
            self.local_variables = Some(Slot::new(locals));
        }
        if !arguments.is_empty() {
            let slot = Slot::new(arguments.len());
            for (index, item) in arguments.into_iter().enumerate() {
                slot.set(index, item)?;
            }
            self.arguments = Some(slot);
        }
        Ok(())
    }

    /// The try-frame stack.
    pub fn try_stack(&self) -> &[TryContext] {
        &self.try_stack
    }

    /// Pushes a try frame.
    pub fn push_try(&mut self, frame: TryContext, max_depth: usize) -> VmResult<()> {
        if self.try_stack.len() >= max_depth {
            return Err(VmError::invalid_operation("try nesting too deep"));
        }
        self.try_stack.push(frame);
        Ok(())
    }

    /// Mutable access to the innermost try frame.
    pub fn current_try_mut(&mut self) -> Option<&mut TryContext> {
        self.try_stack.last_mut()
    }

    /// Pops the innermost try frame.
    pub fn pop_try(&mut self) -> Option<TryContext> {
        self.try_stack.pop()
    }
}
