//! The Helios stack-based virtual machine.
//!
//! Executes contract bytecode deterministically: a decode-dispatch loop over
//! typed stack items, with call-isolated evaluation contexts, try-catch
//! unwinding and pluggable syscall hosting. Gas accounting lives with the
//! host (the application engine); the VM proper only enforces structural
//! limits.

pub mod call_flags;
pub mod evaluation_stack;
pub mod exception_handling;
pub mod execution_context;
pub mod execution_engine;
pub mod instruction;
pub mod jump_table;
pub mod limits;
pub mod op_code;
pub mod reference_counter;
pub mod script;
pub mod script_builder;
pub mod stack_item;

pub use call_flags::CallFlags;
pub use evaluation_stack::EvaluationStack;
pub use exception_handling::{TryContext, TryState};
pub use execution_context::{ExecutionContext, Slot};
pub use execution_engine::{ExecutionEngine, VMState};
pub use instruction::Instruction;
pub use limits::ExecutionEngineLimits;
pub use op_code::OpCode;
pub use reference_counter::ReferenceCounter;
pub use script::Script;
pub use script_builder::ScriptBuilder;
pub use stack_item::{InteropObject, StackItem, StackItemType};

/// Errors that abort script execution.
///
/// Every variant surfaces to the caller as a FAULT with a reason string;
/// `Catchable` variants can additionally be intercepted by TRY handlers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("invalid opcode 0x{0:02x}")]
    InvalidOpcode(u8),

    #[error("invalid operand: {0}")]
    InvalidOperand(String),

    #[error("invalid script: {0}")]
    InvalidScript(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("invalid type: expected {expected}, got {actual}")]
    InvalidType { expected: String, actual: String },

    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow: {0} items exceed the limit")]
    StackOverflow(usize),

    #[error("integer exceeds {0}-byte ceiling")]
    IntegerOverflow(usize),

    #[error("division by zero")]
    DivisionByZero,

    #[error("item size {0} exceeds the limit")]
    ItemTooLarge(usize),

    #[error("out of range: {0}")]
    OutOfRange(String),

    #[error("maximum nesting depth exceeded")]
    NestingTooDeep,

    #[error("circular reference detected")]
    CircularReference,

    #[error("gas limit exceeded")]
    GasExhausted,

    #[error("uncaught exception: {0}")]
    UncaughtException(String),

    #[error("syscall 0x{0:08x} cannot be serviced: {1}")]
    SyscallFailed(u32, String),

    #[error("missing call flags {0}")]
    MissingCallFlags(String),
}

impl VmError {
    /// Convenience constructor used pervasively by the handlers.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        VmError::InvalidOperation(message.into())
    }

    /// Convenience constructor for type mismatches.
    pub fn invalid_type(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        VmError::InvalidType {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}

/// The result type for VM operations.
pub type VmResult<T> = std::result::Result<T, VmError>;
