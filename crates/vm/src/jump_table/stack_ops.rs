//! Constant pushes and stack manipulation.

use num_bigint::BigInt;

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

pub fn push_int(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let value = BigInt::from_signed_bytes_le(&instruction.operand);
    engine.push(StackItem::Integer(value))
}

pub fn push_small_int(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let value = instruction.opcode.as_byte() as i32 - OpCode::PUSH0.as_byte() as i32;
    engine.push(StackItem::from_int(value))
}

pub fn push_bool(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    engine.push(StackItem::Boolean(instruction.opcode == OpCode::PUSHT))
}

pub fn push_null(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.push(StackItem::Null)
}

pub fn push_data(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    if instruction.operand.len() > engine.limits().max_item_size {
        return Err(VmError::ItemTooLarge(instruction.operand.len()));
    }
    engine.push(StackItem::from_bytes(instruction.operand.clone()))
}

pub fn depth(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let depth = engine.current_stack()?.borrow().len();
    engine.push(StackItem::from_int(depth as i64))
}

pub fn drop_top(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.pop().map(|_| ())
}

pub fn nip(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let stack = engine.current_stack()?;
    let result = stack.borrow_mut().remove(1).map(|_| ());
    result
}

pub fn xdrop(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let index = engine.pop()?.to_usize()?;
    let stack = engine.current_stack()?;
    let result = stack.borrow_mut().remove(index).map(|_| ());
    result
}

pub fn clear(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let stack = engine.current_stack()?;
    stack.borrow_mut().clear();
    Ok(())
}

pub fn dup(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let top = engine.peek(0)?;
    engine.push(top)
}

pub fn over(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let item = engine.peek(1)?;
    engine.push(item)
}

pub fn pick(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let index = engine.pop()?.to_usize()?;
    let item = engine.peek(index)?;
    engine.push(item)
}

pub fn tuck(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let top = engine.peek(0)?;
    let stack = engine.current_stack()?;
    let result = stack.borrow_mut().insert(2, top);
    result
}

pub fn swap(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let stack = engine.current_stack()?;
    let mut stack = stack.borrow_mut();
    let a = stack.remove(1)?;
    stack.push(a);
    Ok(())
}

pub fn rot(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let stack = engine.current_stack()?;
    let mut stack = stack.borrow_mut();
    let third = stack.remove(2)?;
    stack.push(third);
    Ok(())
}

pub fn roll(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let index = engine.pop()?.to_usize()?;
    if index == 0 {
        return Ok(());
    }
    let stack = engine.current_stack()?;
    let mut stack = stack.borrow_mut();
    let item = stack.remove(index)?;
    stack.push(item);
    Ok(())
}

pub fn reverse_n(engine: &mut ExecutionEngine, count: usize) -> VmResult<()> {
    let stack = engine.current_stack()?;
    let result = stack.borrow_mut().reverse(count);
    result
}

pub fn reverse_top(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = engine.pop()?.to_usize()?;
    let stack = engine.current_stack()?;
    let result = stack.borrow_mut().reverse(count);
    result
}
