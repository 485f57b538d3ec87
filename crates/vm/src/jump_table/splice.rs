//! Buffer and byte-string splicing handlers.

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::stack_item::StackItem;
use crate::{VmError, VmResult};

pub fn new_buffer(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let length = engine.pop()?.to_usize()?;
    if length > engine.limits().max_item_size {
        return Err(VmError::ItemTooLarge(length));
    }
    engine.push(StackItem::new_buffer(vec![0u8; length]))
}

pub fn memcpy(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = engine.pop()?.to_usize()?;
    let source_index = engine.pop()?.to_usize()?;
    let source = engine.pop()?.to_bytes()?;
    let dest_index = engine.pop()?.to_usize()?;
    let dest = engine.pop()?;

    let StackItem::Buffer(buffer) = dest else {
        return Err(VmError::invalid_type("Buffer", dest.type_name()));
    };
    if source_index + count > source.len() {
        return Err(VmError::OutOfRange("source range out of bounds".into()));
    }
    let mut buffer = buffer.borrow_mut();
    if dest_index + count > buffer.len() {
        return Err(VmError::OutOfRange("destination range out of bounds".into()));
    }
    buffer[dest_index..dest_index + count]
        .copy_from_slice(&source[source_index..source_index + count]);
    Ok(())
}

pub fn cat(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let b = engine.pop()?.to_bytes()?;
    let a = engine.pop()?.to_bytes()?;
    let total = a.len() + b.len();
    if total > engine.limits().max_item_size {
        return Err(VmError::ItemTooLarge(total));
    }
    let mut joined = a;
    joined.extend_from_slice(&b);
    engine.push(StackItem::new_buffer(joined))
}

pub fn substr(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = engine.pop()?.to_usize()?;
    let index = engine.pop()?.to_usize()?;
    let data = engine.pop()?.to_bytes()?;
    if index + count > data.len() {
        return Err(VmError::OutOfRange("substring out of bounds".into()));
    }
    engine.push(StackItem::new_buffer(data[index..index + count].to_vec()))
}

pub fn left(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = engine.pop()?.to_usize()?;
    let data = engine.pop()?.to_bytes()?;
    if count > data.len() {
        return Err(VmError::OutOfRange("LEFT count out of bounds".into()));
    }
    engine.push(StackItem::new_buffer(data[..count].to_vec()))
}

pub fn right(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = engine.pop()?.to_usize()?;
    let data = engine.pop()?.to_bytes()?;
    if count > data.len() {
        return Err(VmError::OutOfRange("RIGHT count out of bounds".into()));
    }
    engine.push(StackItem::new_buffer(data[data.len() - count..].to_vec()))
}
