//! Type inspection and conversion handlers.

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::stack_item::{StackItem, StackItemType};
use crate::{VmError, VmResult};

pub fn is_null(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let item = engine.pop()?;
    engine.push(StackItem::Boolean(item.is_null()))
}

pub fn is_type(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = StackItemType::from_byte(instruction.operand_u8()?)?;
    if target == StackItemType::Any {
        return Err(VmError::InvalidOperand("ISTYPE Any is meaningless".into()));
    }
    let item = engine.pop()?;
    engine.push(StackItem::Boolean(item.item_type() == target))
}

pub fn convert(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = StackItemType::from_byte(instruction.operand_u8()?)?;
    let item = engine.pop()?;
    let converted = item.convert(target)?;
    engine.push(converted)
}
