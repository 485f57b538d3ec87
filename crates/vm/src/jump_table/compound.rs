//! Compound-type construction and access handlers.

use std::cell::RefCell;
use std::rc::Rc;

use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::stack_item::{OrderedMap, StackItem};
use crate::{VmError, VmResult};

fn checked_count(engine: &ExecutionEngine, count: usize) -> VmResult<usize> {
    if count > engine.limits().max_stack_size {
        return Err(VmError::OutOfRange(format!("compound size {count} too large")));
    }
    Ok(count)
}

pub fn pack_map(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = checked_count(engine, engine.peek(0)?.to_usize()?)?;
    engine.pop()?;
    let mut map = OrderedMap::new();
    for _ in 0..count {
        let key = engine.pop()?;
        let value = engine.pop()?;
        map.insert(key, value)?;
    }
    engine.push(StackItem::Map(Rc::new(RefCell::new(map))))
}

pub fn pack_struct(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = checked_count(engine, engine.peek(0)?.to_usize()?)?;
    engine.pop()?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(engine.pop()?);
    }
    engine.push(StackItem::new_struct(items))
}

pub fn pack(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = checked_count(engine, engine.peek(0)?.to_usize()?)?;
    engine.pop()?;
    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(engine.pop()?);
    }
    engine.push(StackItem::new_array(items))
}

pub fn unpack(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let compound = engine.pop()?;
    match &compound {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let items = items.borrow();
            for item in items.iter().rev() {
                engine.push(item.clone())?;
            }
            engine.push(StackItem::from_int(items.len() as i64))
        }
        StackItem::Map(map) => {
            let map = map.borrow();
            for (key, value) in map.iter().collect::<Vec<_>>().iter().rev() {
                engine.push(value.clone())?;
                engine.push(key.clone())?;
            }
            engine.push(StackItem::from_int(map.len() as i64))
        }
        other => Err(VmError::invalid_type("Array, Struct or Map", other.type_name())),
    }
}

pub fn new_array0(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.push(StackItem::new_array(Vec::new()))
}

pub fn new_array(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = checked_count(engine, engine.peek(0)?.to_usize()?)?;
    engine.pop()?;
    engine.push(StackItem::new_array(vec![StackItem::Null; count]))
}

pub fn new_struct0(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.push(StackItem::new_struct(Vec::new()))
}

pub fn new_struct(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let count = checked_count(engine, engine.peek(0)?.to_usize()?)?;
    engine.pop()?;
    engine.push(StackItem::new_struct(vec![StackItem::Null; count]))
}

pub fn new_map(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    engine.push(StackItem::new_map())
}

pub fn size(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let item = engine.pop()?;
    let size = match &item {
        StackItem::Array(items) | StackItem::Struct(items) => items.borrow().len(),
        StackItem::Map(map) => map.borrow().len(),
        StackItem::ByteString(b) => b.len(),
        StackItem::Buffer(b) => b.borrow().len(),
        other => {
            return Err(VmError::invalid_type(
                "a sized item",
                other.type_name(),
            ))
        }
    };
    engine.push(StackItem::from_int(size as i64))
}

pub fn has_key(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let key = engine.pop()?;
    let collection = engine.pop()?;
    let present = match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = key.to_usize()?;
            index < items.borrow().len()
        }
        StackItem::Map(map) => map.borrow().contains_key(&key)?,
        StackItem::ByteString(b) => key.to_usize()? < b.len(),
        StackItem::Buffer(b) => key.to_usize()? < b.borrow().len(),
        other => {
            return Err(VmError::invalid_type(
                "Array, Struct, Map or bytes",
                other.type_name(),
            ))
        }
    };
    engine.push(StackItem::Boolean(present))
}

pub fn keys(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    let StackItem::Map(map) = &collection else {
        return Err(VmError::invalid_type("Map", collection.type_name()));
    };
    let keys: Vec<StackItem> = map.borrow().keys().cloned().collect();
    engine.push(StackItem::new_array(keys))
}

pub fn values(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    let limits = engine.limits().clone();
    let values: Vec<StackItem> = match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => items.borrow().clone(),
        StackItem::Map(map) => map.borrow().values().cloned().collect(),
        other => {
            return Err(VmError::invalid_type(
                "Array, Struct or Map",
                other.type_name(),
            ))
        }
    };
    // Struct values are copied so holders cannot alias map/array internals.
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        if matches!(value, StackItem::Struct(_)) {
            out.push(value.deep_copy(&limits)?);
        } else {
            out.push(value);
        }
    }
    engine.push(StackItem::new_array(out))
}

pub fn pick_item(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let key = engine.pop()?;
    let collection = engine.pop()?;
    let picked = match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = key.to_usize()?;
            let items = items.borrow();
            items
                .get(index)
                .cloned()
                .ok_or_else(|| VmError::OutOfRange(format!("index {index} out of bounds")))?
        }
        StackItem::Map(map) => map
            .borrow()
            .get(&key)?
            .cloned()
            .ok_or_else(|| VmError::OutOfRange("missing map key".into()))?,
        StackItem::ByteString(bytes) => {
            let index = key.to_usize()?;
            let byte = bytes
                .get(index)
                .copied()
                .ok_or_else(|| VmError::OutOfRange(format!("index {index} out of bounds")))?;
            StackItem::from_int(byte as i64)
        }
        StackItem::Buffer(bytes) => {
            let index = key.to_usize()?;
            let bytes = bytes.borrow();
            let byte = bytes
                .get(index)
                .copied()
                .ok_or_else(|| VmError::OutOfRange(format!("index {index} out of bounds")))?;
            StackItem::from_int(byte as i64)
        }
        other => {
            return Err(VmError::invalid_type(
                "Array, Struct, Map or bytes",
                other.type_name(),
            ))
        }
    };
    engine.push(picked)
}

pub fn append(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let item = engine.pop()?;
    let collection = engine.pop()?;
    let limits = engine.limits().clone();
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            // Structs are appended by value.
            let item = if matches!(item, StackItem::Struct(_)) {
                item.deep_copy(&limits)?
            } else {
                item
            };
            items.borrow_mut().push(item);
            Ok(())
        }
        other => Err(VmError::invalid_type("Array or Struct", other.type_name())),
    }
}

pub fn set_item(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let value = engine.pop()?;
    let key = engine.pop()?;
    let collection = engine.pop()?;
    let limits = engine.limits().clone();
    let value = if matches!(value, StackItem::Struct(_)) {
        value.deep_copy(&limits)?
    } else {
        value
    };
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = key.to_usize()?;
            let mut items = items.borrow_mut();
            let slot = items
                .get_mut(index)
                .ok_or_else(|| VmError::OutOfRange(format!("index {index} out of bounds")))?;
            *slot = value;
            Ok(())
        }
        StackItem::Map(map) => {
            map.borrow_mut().insert(key, value)?;
            Ok(())
        }
        StackItem::Buffer(bytes) => {
            let index = key.to_usize()?;
            let byte = value.to_int()?;
            let byte = u8::try_from(byte)
                .map_err(|_| VmError::OutOfRange("byte value out of range".into()))?;
            let mut bytes = bytes.borrow_mut();
            let slot = bytes
                .get_mut(index)
                .ok_or_else(|| VmError::OutOfRange(format!("index {index} out of bounds")))?;
            *slot = byte;
            Ok(())
        }
        other => Err(VmError::invalid_type(
            "Array, Struct, Map or Buffer",
            other.type_name(),
        )),
    }
}

pub fn reverse_items(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            items.borrow_mut().reverse();
            Ok(())
        }
        StackItem::Buffer(bytes) => {
            bytes.borrow_mut().reverse();
            Ok(())
        }
        other => Err(VmError::invalid_type(
            "Array, Struct or Buffer",
            other.type_name(),
        )),
    }
}

pub fn remove(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let key = engine.pop()?;
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = key.to_usize()?;
            let mut items = items.borrow_mut();
            if index >= items.len() {
                return Err(VmError::OutOfRange(format!("index {index} out of bounds")));
            }
            items.remove(index);
            Ok(())
        }
        StackItem::Map(map) => {
            map.borrow_mut().remove(&key)?;
            Ok(())
        }
        other => Err(VmError::invalid_type(
            "Array, Struct or Map",
            other.type_name(),
        )),
    }
}

pub fn clear_items(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            items.borrow_mut().clear();
            Ok(())
        }
        StackItem::Map(map) => {
            map.borrow_mut().clear();
            Ok(())
        }
        other => Err(VmError::invalid_type(
            "Array, Struct or Map",
            other.type_name(),
        )),
    }
}

pub fn pop_item(engine: &mut ExecutionEngine, _instruction: &Instruction) -> VmResult<()> {
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let item = items
                .borrow_mut()
                .pop()
                .ok_or_else(|| VmError::OutOfRange("POPITEM on empty collection".into()))?;
            engine.push(item)
        }
        other => Err(VmError::invalid_type("Array or Struct", other.type_name())),
    }
}
