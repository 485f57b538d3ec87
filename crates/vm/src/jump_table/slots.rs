//! Static, local and argument slot handlers.

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::{VmError, VmResult};

/// Slot index: encoded in the opcode for the compact forms, in the operand
/// for the generic form.
fn slot_index(instruction: &Instruction, base: OpCode, generic: OpCode) -> VmResult<usize> {
    if instruction.opcode == generic {
        Ok(instruction.operand_u8()? as usize)
    } else {
        Ok((instruction.opcode.as_byte() - base.as_byte()) as usize)
    }
}

pub fn init_static_slot(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let count = instruction.operand_u8()? as usize;
    if count == 0 {
        return Err(VmError::InvalidOperand("INITSSLOT with zero fields".into()));
    }
    let context = engine
        .current_context_mut()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    context.init_static_fields(count)
}

pub fn init_slot(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let locals = *instruction
        .operand
        .first()
        .ok_or_else(|| VmError::InvalidOperand("INITSLOT missing operand".into()))?
        as usize;
    let arguments = *instruction
        .operand
        .get(1)
        .ok_or_else(|| VmError::InvalidOperand("INITSLOT missing operand".into()))?
        as usize;
    if locals == 0 && arguments == 0 {
        return Err(VmError::InvalidOperand("INITSLOT with empty slots".into()));
    }
    let mut args = Vec::with_capacity(arguments);
    for _ in 0..arguments {
        args.push(engine.pop()?);
    }
    let context = engine
        .current_context_mut()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    context.init_slot(locals, args)
}

pub fn load_static(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::LDSFLD0, OpCode::LDSFLD)?;
    let context = engine
        .current_context()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    let slot = context
        .static_fields()
        .ok_or_else(|| VmError::invalid_operation("static fields not initialized"))?;
    let item = slot.get(index)?;
    engine.push(item)
}

pub fn store_static(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::STSFLD0, OpCode::STSFLD)?;
    let item = engine.pop()?;
    let context = engine
        .current_context()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    let slot = context
        .static_fields()
        .ok_or_else(|| VmError::invalid_operation("static fields not initialized"))?;
    slot.set(index, item)
}

pub fn load_local(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::LDLOC0, OpCode::LDLOC)?;
    let context = engine
        .current_context()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    let slot = context
        .local_variables()
        .ok_or_else(|| VmError::invalid_operation("local slot not initialized"))?;
    let item = slot.get(index)?;
    engine.push(item)
}

pub fn store_local(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::STLOC0, OpCode::STLOC)?;
    let item = engine.pop()?;
    let context = engine
        .current_context()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    let slot = context
        .local_variables()
        .ok_or_else(|| VmError::invalid_operation("local slot not initialized"))?;
    slot.set(index, item)
}

pub fn load_argument(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::LDARG0, OpCode::LDARG)?;
    let context = engine
        .current_context()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    let slot = context
        .arguments()
        .ok_or_else(|| VmError::invalid_operation("argument slot not initialized"))?;
    let item = slot.get(index)?;
    engine.push(item)
}

pub fn store_argument(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let index = slot_index(instruction, OpCode::STARG0, OpCode::STARG)?;
    let item = engine.pop()?;
    let context = engine
        .current_context()
        .ok_or_else(|| VmError::invalid_operation("no execution context"))?;
    let slot = context
        .arguments()
        .ok_or_else(|| VmError::invalid_operation("argument slot not initialized"))?;
    slot.set(index, item)
}
