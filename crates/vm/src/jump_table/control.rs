//! Flow-control handlers: jumps, calls, exceptions, syscalls.

use std::rc::Rc;

use crate::exception_handling::{TryContext, TryState};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

fn current_position(engine: &ExecutionEngine) -> VmResult<usize> {
    engine
        .current_context()
        .map(|c| c.instruction_pointer())
        .ok_or_else(|| VmError::invalid_operation("no execution context"))
}

fn relative_target(engine: &ExecutionEngine, offset: i32) -> VmResult<usize> {
    let position = current_position(engine)? as i64 + offset as i64;
    usize::try_from(position)
        .map_err(|_| VmError::InvalidScript(format!("jump target {position} out of bounds")))
}

fn jump_offset(instruction: &Instruction) -> VmResult<i32> {
    if instruction.operand.len() == 1 {
        Ok(instruction.operand_i8()? as i32)
    } else {
        instruction.operand_i32()
    }
}

pub fn jump(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    use OpCode::*;
    let taken = match instruction.opcode {
        JMP | JMPL => true,
        JMPIF | JMPIFL => engine.pop()?.to_bool()?,
        JMPIFNOT | JMPIFNOTL => !engine.pop()?.to_bool()?,
        JMPEQ | JMPEQL | JMPNE | JMPNEL => {
            let b = engine.pop()?;
            let a = engine.pop()?;
            let limits = engine.limits().clone();
            let equal = a.equals(&b, &limits)?;
            if matches!(instruction.opcode, JMPEQ | JMPEQL) {
                equal
            } else {
                !equal
            }
        }
        JMPGT | JMPGTL | JMPGE | JMPGEL | JMPLT | JMPLTL | JMPLE | JMPLEL => {
            let b = engine.pop()?.to_int()?;
            let a = engine.pop()?.to_int()?;
            match instruction.opcode {
                JMPGT | JMPGTL => a > b,
                JMPGE | JMPGEL => a >= b,
                JMPLT | JMPLTL => a < b,
                _ => a <= b,
            }
        }
        other => {
            return Err(VmError::invalid_operation(format!(
                "{other:?} is not a jump opcode"
            )))
        }
    };
    if taken {
        let target = relative_target(engine, jump_offset(instruction)?)?;
        let context = engine
            .current_context_mut()
            .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
        context.set_instruction_pointer(target)?;
        engine.set_jumping();
    }
    Ok(())
}

pub fn call(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = relative_target(engine, jump_offset(instruction)?)?;
    let context = engine
        .current_context()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    if target > context.script().len() {
        return Err(VmError::InvalidScript("call target out of bounds".into()));
    }
    let callee = context.fork(target);
    engine.load_context(callee)
}

pub fn push_address(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = relative_target(engine, instruction.operand_i32()?)?;
    let context = engine
        .current_context()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    if target > context.script().len() {
        return Err(VmError::InvalidScript("pointer target out of bounds".into()));
    }
    let script = Rc::clone(context.script());
    engine.push(StackItem::Pointer {
        script,
        position: target,
    })
}

pub fn call_address(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let pointer = engine.pop()?;
    let StackItem::Pointer { script, position } = pointer else {
        return Err(VmError::invalid_type("Pointer", pointer.type_name()));
    };
    let context = engine
        .current_context()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    if !Rc::ptr_eq(&script, context.script()) {
        return Err(VmError::invalid_operation(
            "CALLA pointer refers to a different script",
        ));
    }
    let callee = context.fork(position);
    engine.load_context(callee)
}

pub fn abort(_engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    Err(VmError::invalid_operation("ABORT executed"))
}

pub fn abort_msg(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let message = engine.pop()?.to_bytes()?;
    Err(VmError::invalid_operation(format!(
        "ABORT: {}",
        String::from_utf8_lossy(&message)
    )))
}

pub fn assert_op(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    if engine.pop()?.to_bool()? {
        Ok(())
    } else {
        Err(VmError::invalid_operation("ASSERT failed"))
    }
}

pub fn assert_msg(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let message = engine.pop()?.to_bytes()?;
    if engine.pop()?.to_bool()? {
        Ok(())
    } else {
        Err(VmError::invalid_operation(format!(
            "ASSERT failed: {}",
            String::from_utf8_lossy(&message)
        )))
    }
}

pub fn throw(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let exception = engine.pop()?;
    engine.throw(exception)
}

pub fn try_op(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let (catch_offset, finally_offset) = if instruction.opcode == OpCode::TRY {
        instruction.try_offsets_short()?
    } else {
        instruction.try_offsets_long()?
    };
    if catch_offset == 0 && finally_offset == 0 {
        return Err(VmError::InvalidScript(
            "TRY without catch or finally".into(),
        ));
    }
    let catch_abs = if catch_offset != 0 {
        Some(relative_target(engine, catch_offset)?)
    } else {
        None
    };
    let finally_abs = if finally_offset != 0 {
        Some(relative_target(engine, finally_offset)?)
    } else {
        None
    };
    let depth = engine.current_stack()?.borrow().len();
    let max_depth = engine.limits().max_try_nesting_depth;
    let context = engine
        .current_context_mut()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    context.push_try(TryContext::new(catch_abs, finally_abs, depth), max_depth)
}

pub fn end_try(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = relative_target(engine, jump_offset(instruction)?)?;
    let context = engine
        .current_context_mut()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    let frame = context
        .current_try_mut()
        .ok_or_else(|| VmError::invalid_operation("ENDTRY outside try"))?;
    if frame.state == TryState::Finally {
        return Err(VmError::invalid_operation("ENDTRY inside finally"));
    }
    if frame.needs_finally() {
        frame.state = TryState::Finally;
        frame.end_offset = target;
        let finally_offset = frame
            .finally_offset
            .ok_or_else(|| VmError::invalid_operation("finally without offset"))?;
        context.set_instruction_pointer(finally_offset)?;
    } else {
        context.pop_try();
        context.set_instruction_pointer(target)?;
    }
    engine.set_jumping();
    Ok(())
}

pub fn end_finally(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.end_finally()
}

pub fn ret(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.unload_context()
}

pub fn syscall(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let id = instruction.operand_u32()?;
    let _ = engine;
    Err(VmError::SyscallFailed(
        id,
        "no interop host attached to this engine".into(),
    ))
}
