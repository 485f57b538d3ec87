//! The execution engine: a decode-dispatch loop over invocation frames.

use std::cell::RefCell;
use std::rc::Rc;

use crate::evaluation_stack::EvaluationStack;
use crate::exception_handling::TryState;
use crate::execution_context::ExecutionContext;
use crate::instruction::Instruction;
use crate::jump_table;
use crate::limits::ExecutionEngineLimits;
use crate::reference_counter::ReferenceCounter;
use crate::script::Script;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

/// Lifecycle states of one engine.
///
/// `Break` before the first step, `None` while running, `Halt`/`Fault`
/// final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VMState {
    /// Created but not yet stepped.
    Break,
    /// Executing.
    None,
    /// Finished successfully; results are on the result stack.
    Halt,
    /// Finished with an error; state mutations must be discarded.
    Fault,
}

/// Executes scripts until the invocation stack empties or a fault occurs.
///
/// The engine enforces structural limits only; gas accounting belongs to the
/// hosting application engine, which drives `execute_next` itself.
pub struct ExecutionEngine {
    state: VMState,
    limits: ExecutionEngineLimits,
    reference_counter: ReferenceCounter,
    invocation_stack: Vec<ExecutionContext>,
    result_stack: Rc<RefCell<EvaluationStack>>,
    /// Exception in flight while finally blocks unwind.
    pending_exception: Option<StackItem>,
    /// Why the engine faulted, when it did.
    fault_error: Option<VmError>,
    /// Set by jump/call handlers that already moved the instruction pointer.
    jumping: bool,
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new(ExecutionEngineLimits::default())
    }
}

impl ExecutionEngine {
    /// Creates an idle engine with the given limits.
    pub fn new(limits: ExecutionEngineLimits) -> Self {
        let reference_counter = ReferenceCounter::new();
        let result_stack = Rc::new(RefCell::new(EvaluationStack::new(
            reference_counter.clone(),
        )));
        Self {
            state: VMState::Break,
            limits,
            reference_counter,
            invocation_stack: Vec::new(),
            result_stack,
            pending_exception: None,
            fault_error: None,
            jumping: false,
        }
    }

    /// Current state.
    pub fn state(&self) -> VMState {
        self.state
    }

    /// The configured limits.
    pub fn limits(&self) -> &ExecutionEngineLimits {
        &self.limits
    }

    /// The shared stack-entry counter.
    pub fn reference_counter(&self) -> &ReferenceCounter {
        &self.reference_counter
    }

    /// Why the engine faulted, if it did.
    pub fn fault_error(&self) -> Option<&VmError> {
        self.fault_error.as_ref()
    }

    /// The invocation stack, bottom first.
    pub fn invocation_stack(&self) -> &[ExecutionContext] {
        &self.invocation_stack
    }

    /// The innermost frame.
    pub fn current_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.last()
    }

    /// The innermost frame, mutable.
    pub fn current_context_mut(&mut self) -> Option<&mut ExecutionContext> {
        self.invocation_stack.last_mut()
    }

    /// The outermost frame (the entry script).
    pub fn entry_context(&self) -> Option<&ExecutionContext> {
        self.invocation_stack.first()
    }

    /// The result stack, populated at HALT.
    pub fn result_stack(&self) -> &Rc<RefCell<EvaluationStack>> {
        &self.result_stack
    }

    /// The evaluation stack of the current frame.
    pub fn current_stack(&self) -> VmResult<Rc<RefCell<EvaluationStack>>> {
        self.current_context()
            .map(|c| Rc::clone(c.evaluation_stack()))
            .ok_or_else(|| VmError::invalid_operation("no execution context"))
    }

    /// Pushes onto the current frame's stack.
    pub fn push(&mut self, item: StackItem) -> VmResult<()> {
        let stack = self.current_stack()?;
        stack.borrow_mut().push(item);
        Ok(())
    }

    /// Pops from the current frame's stack.
    pub fn pop(&mut self) -> VmResult<StackItem> {
        let stack = self.current_stack()?;
        let item = stack.borrow_mut().pop()?;
        Ok(item)
    }

    /// Peeks into the current frame's stack.
    pub fn peek(&self, index: usize) -> VmResult<StackItem> {
        let stack = self.current_stack()?;
        let item = stack.borrow().peek(index)?.clone();
        Ok(item)
    }

    /// Loads the entry script.
    pub fn load_script(&mut self, script: Script, rvcount: i32) -> VmResult<()> {
        let context = ExecutionContext::new(Rc::new(script), rvcount, &self.reference_counter);
        self.load_context(context)
    }

    /// Pushes a prepared frame onto the invocation stack.
    pub fn load_context(&mut self, context: ExecutionContext) -> VmResult<()> {
        if self.invocation_stack.len() >= self.limits.max_invocation_stack_size {
            return Err(VmError::invalid_operation("invocation stack overflow"));
        }
        self.invocation_stack.push(context);
        Ok(())
    }

    /// Signals that the current instruction already set the next pointer.
    pub fn set_jumping(&mut self) {
        self.jumping = true;
    }

    /// Runs until HALT or FAULT and returns the final state.
    pub fn execute(&mut self) -> VMState {
        if self.state == VMState::Break {
            self.state = VMState::None;
        }
        while self.state == VMState::None {
            if let Err(error) = self.execute_next() {
                self.fault(error);
            }
        }
        self.state
    }

    /// Marks the engine faulted with `error` as the reason.
    pub fn fault(&mut self, error: VmError) {
        self.fault_error = Some(error);
        self.state = VMState::Fault;
    }

    /// Executes a single instruction.
    ///
    /// Returns the decoded instruction so hosts can meter gas; an implicit
    /// RET at end-of-script returns `None`.
    pub fn execute_next(&mut self) -> VmResult<Option<Instruction>> {
        if self.state == VMState::Break {
            self.state = VMState::None;
        }
        if self.state != VMState::None {
            return Ok(None);
        }
        let Some(context) = self.invocation_stack.last() else {
            self.state = VMState::Halt;
            return Ok(None);
        };

        if context.instruction_pointer() >= context.script().len() {
            self.unload_context()?;
            if self.invocation_stack.is_empty() {
                self.state = VMState::Halt;
            }
            return Ok(None);
        }

        let instruction = context
            .script()
            .instruction_at(context.instruction_pointer())?;

        let depth_before = self.invocation_stack.len();
        self.jumping = false;
        jump_table::execute(self, &instruction)?;

        // Advance the frame that executed the instruction: jumps moved it
        // already (jumping), RET removed it (stack shrank), CALL pushed a
        // callee above it.
        if !self.jumping && self.invocation_stack.len() >= depth_before {
            if let Some(context) = self.invocation_stack.get_mut(depth_before - 1) {
                let next = context.instruction_pointer() + instruction.encoded_len;
                context.set_instruction_pointer(next)?;
            }
        }
        self.jumping = false;

        if self.reference_counter.count() > self.limits.max_stack_size {
            return Err(VmError::StackOverflow(self.reference_counter.count()));
        }

        if self.invocation_stack.is_empty() {
            self.state = VMState::Halt;
        }
        Ok(Some(instruction))
    }

    /// Decodes (without executing) the instruction at the current pointer.
    ///
    /// Returns `None` when the pointer sits at end-of-script (implicit RET).
    pub fn peek_instruction(&self) -> VmResult<Option<Instruction>> {
        let context = self
            .current_context()
            .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
        if context.instruction_pointer() >= context.script().len() {
            return Ok(None);
        }
        Ok(Some(
            context
                .script()
                .instruction_at(context.instruction_pointer())?,
        ))
    }

    /// Pops the current frame, moving declared return values to the caller
    /// (or the result stack when the call chain empties).
    pub fn unload_context(&mut self) -> VmResult<()> {
        let context = self
            .invocation_stack
            .pop()
            .ok_or_else(|| VmError::invalid_operation("no context to unload"))?;

        if !context.try_stack().is_empty() {
            return Err(VmError::invalid_operation(
                "cannot leave a protected region via RET",
            ));
        }

        let source = context.evaluation_stack();
        let target = match self.invocation_stack.last() {
            Some(caller) => Rc::clone(caller.evaluation_stack()),
            None => Rc::clone(&self.result_stack),
        };

        if Rc::ptr_eq(source, &target) {
            return Ok(());
        }

        let rvcount = context.rvcount();
        let available = source.borrow().len();
        if rvcount >= 0 && available != rvcount as usize {
            return Err(VmError::invalid_operation(format!(
                "expected {rvcount} return values, found {available}"
            )));
        }

        // Move bottom-to-top so relative order is preserved on the target.
        let mut items = source.borrow_mut().drain_all();
        items.reverse();
        let mut target = target.borrow_mut();
        for item in items {
            target.push(item);
        }
        Ok(())
    }

    /// Routes a thrown exception to the nearest handler, running finally
    /// blocks along the unwinding path. Faults when nothing catches it.
    pub fn throw(&mut self, exception: StackItem) -> VmResult<()> {
        enum Unwind {
            Catch { offset: usize, depth: usize },
            Finally { offset: usize },
            PopTry,
            PopContext,
        }

        let mut exception = Some(exception);
        loop {
            let Some(context) = self.invocation_stack.last_mut() else {
                break;
            };
            let action = match context.current_try_mut() {
                Some(frame) if frame.can_catch() => {
                    frame.state = TryState::Catch;
                    match frame.catch_offset {
                        Some(offset) => Unwind::Catch {
                            offset,
                            depth: frame.stack_depth,
                        },
                        None => return Err(VmError::invalid_operation("catch without offset")),
                    }
                }
                Some(frame) if frame.needs_finally() => {
                    frame.state = TryState::Finally;
                    match frame.finally_offset {
                        Some(offset) => Unwind::Finally { offset },
                        None => return Err(VmError::invalid_operation("finally without offset")),
                    }
                }
                Some(_) => Unwind::PopTry,
                None => Unwind::PopContext,
            };
            match action {
                Unwind::Catch { offset, depth } => {
                    let stack = self.current_stack()?;
                    {
                        let mut stack = stack.borrow_mut();
                        while stack.len() > depth {
                            stack.pop()?;
                        }
                        match exception.take() {
                            Some(item) => stack.push(item),
                            None => {
                                return Err(VmError::invalid_operation("missing exception"))
                            }
                        }
                    }
                    if let Some(context) = self.invocation_stack.last_mut() {
                        context.set_instruction_pointer(offset)?;
                    }
                    self.jumping = true;
                    return Ok(());
                }
                Unwind::Finally { offset } => {
                    if let Some(context) = self.invocation_stack.last_mut() {
                        context.set_instruction_pointer(offset)?;
                    }
                    self.pending_exception = exception.take();
                    self.jumping = true;
                    return Ok(());
                }
                Unwind::PopTry => {
                    if let Some(context) = self.invocation_stack.last_mut() {
                        context.pop_try();
                    }
                }
                Unwind::PopContext => {
                    self.invocation_stack.pop();
                }
            }
        }

        let message = exception
            .as_ref()
            .and_then(|e| e.to_bytes().ok())
            .map(|bytes| {
                String::from_utf8_lossy(&bytes)
                    .chars()
                    .take(ExecutionEngineLimits::MAX_EXCEPTION_MESSAGE)
                    .collect::<String>()
            })
            .unwrap_or_else(|| "unhandled exception".into());
        Err(VmError::UncaughtException(message))
    }

    /// Called by ENDFINALLY: resumes a pending throw, or continues after the
    /// protected region.
    pub fn end_finally(&mut self) -> VmResult<()> {
        let context = self
            .current_context_mut()
            .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
        let frame = context
            .pop_try()
            .ok_or_else(|| VmError::invalid_operation("ENDFINALLY outside try"))?;
        if let Some(exception) = self.pending_exception.take() {
            return self.throw(exception);
        }
        let context = self
            .current_context_mut()
            .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
        context.set_instruction_pointer(frame.end_offset)?;
        self.set_jumping();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op_code::OpCode;
    use crate::script_builder::ScriptBuilder;

    fn run(script: Vec<u8>) -> ExecutionEngine {
        let mut engine = ExecutionEngine::default();
        engine.load_script(Script::new(script), -1).unwrap();
        engine.execute();
        engine
    }

    #[test]
    fn test_simple_arithmetic_halts_with_result() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(10);
        builder.emit_push_int(20);
        builder.emit(OpCode::ADD);
        builder.emit(OpCode::RET);
        let engine = run(builder.into_bytes());
        assert_eq!(engine.state(), VMState::Halt);
        let result = engine.result_stack().borrow().peek(0).unwrap().clone();
        assert_eq!(result.to_int().unwrap(), 30.into());
    }

    #[test]
    fn test_break_transitions_to_none_then_halt() {
        let engine = ExecutionEngine::default();
        assert_eq!(engine.state(), VMState::Break);
        let engine = run(vec![OpCode::RET.as_byte()]);
        assert_eq!(engine.state(), VMState::Halt);
    }

    #[test]
    fn test_division_by_zero_faults() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_int(1);
        builder.emit_push_int(0);
        builder.emit(OpCode::DIV);
        let engine = run(builder.into_bytes());
        assert_eq!(engine.state(), VMState::Fault);
        assert_eq!(engine.fault_error(), Some(&VmError::DivisionByZero));
    }

    #[test]
    fn test_uncaught_throw_faults() {
        let mut builder = ScriptBuilder::new();
        builder.emit_push_bytes(b"boom");
        builder.emit(OpCode::THROW);
        let engine = run(builder.into_bytes());
        assert_eq!(engine.state(), VMState::Fault);
        match engine.fault_error() {
            Some(VmError::UncaughtException(message)) => assert_eq!(message, "boom"),
            other => panic!("unexpected fault: {other:?}"),
        }
    }

    #[test]
    fn test_try_catch_recovers() {
        // try { throw "x" } catch { push 42 } → HALT with 42.
        let mut builder = ScriptBuilder::new();
        // TRY catch=+9 finally=0; THROW at +2.. catch block pushes 42.
        builder.emit_raw(&[OpCode::TRY.as_byte(), 9, 0]);
        builder.emit_push_bytes(b"x"); // 3 bytes: PUSHDATA1 1 'x'
        builder.emit(OpCode::THROW);
        builder.emit_raw(&[OpCode::JMP.as_byte(), 5]); // to the shared ENDTRY
        // catch: at offset 3+3+1+2 = 9
        builder.emit(OpCode::DROP); // drop exception object
        builder.emit_push_int(42);
        builder.emit_raw(&[OpCode::ENDTRY.as_byte(), 2]);
        builder.emit(OpCode::RET);
        let engine = run(builder.into_bytes());
        assert_eq!(engine.state(), VMState::Halt);
        let result = engine.result_stack().borrow().peek(0).unwrap().clone();
        assert_eq!(result.to_int().unwrap(), 42.into());
    }

    #[test]
    fn test_call_and_return() {
        // CALL +4; RET; target: PUSH7 RET
        let mut builder = ScriptBuilder::new();
        builder.emit_raw(&[OpCode::CALL.as_byte(), 3]);
        builder.emit(OpCode::RET);
        builder.emit_push_int(7);
        builder.emit(OpCode::RET);
        let engine = run(builder.into_bytes());
        assert_eq!(engine.state(), VMState::Halt);
        let result = engine.result_stack().borrow().peek(0).unwrap().clone();
        assert_eq!(result.to_int().unwrap(), 7.into());
    }
}
