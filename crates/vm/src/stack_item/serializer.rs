//! Canonical binary serialization of stack items.
//!
//! Format: 1-byte type tag followed by a tag-specific body, lengths as
//! var-ints. Pointer and InteropInterface never serialize; cyclic compound
//! graphs fault instead of looping.

use helios_io::{BinaryWriter, MemoryReader};

use crate::limits::ExecutionEngineLimits;
use crate::stack_item::{OrderedMap, StackItem, StackItemType};
use crate::{VmError, VmResult};

/// Serializes `item` into its canonical byte form.
pub fn serialize_item(item: &StackItem, limits: &ExecutionEngineLimits) -> VmResult<Vec<u8>> {
    let mut writer = BinaryWriter::new();
    let mut visited: Vec<usize> = Vec::new();
    serialize_into(item, limits, &mut writer, &mut visited)?;
    let bytes = writer.into_bytes();
    if bytes.len() > limits.max_item_size {
        return Err(VmError::ItemTooLarge(bytes.len()));
    }
    Ok(bytes)
}

fn serialize_into(
    item: &StackItem,
    limits: &ExecutionEngineLimits,
    writer: &mut BinaryWriter,
    visited: &mut Vec<usize>,
) -> VmResult<()> {
    if visited.len() > limits.max_nesting_depth {
        return Err(VmError::NestingTooDeep);
    }
    let io = |e: helios_io::Error| VmError::invalid_operation(e.to_string());
    match item {
        StackItem::Null => writer.write_u8(StackItemType::Any as u8).map_err(io),
        StackItem::Boolean(b) => {
            writer.write_u8(StackItemType::Boolean as u8).map_err(io)?;
            writer.write_bool(*b).map_err(io)
        }
        StackItem::Integer(i) => {
            writer.write_u8(StackItemType::Integer as u8).map_err(io)?;
            writer
                .write_var_bytes(&StackItem::int_to_bytes(i))
                .map_err(io)
        }
        StackItem::ByteString(b) => {
            writer
                .write_u8(StackItemType::ByteString as u8)
                .map_err(io)?;
            writer.write_var_bytes(b).map_err(io)
        }
        StackItem::Buffer(b) => {
            writer.write_u8(StackItemType::Buffer as u8).map_err(io)?;
            writer.write_var_bytes(&b.borrow()).map_err(io)
        }
        StackItem::Array(_) | StackItem::Struct(_) | StackItem::Map(_) => {
            let id = item
                .reference_id()
                .ok_or_else(|| VmError::invalid_operation("compound without identity"))?;
            if visited.contains(&id) {
                return Err(VmError::CircularReference);
            }
            visited.push(id);
            match item {
                StackItem::Array(items) | StackItem::Struct(items) => {
                    writer.write_u8(item.item_type() as u8).map_err(io)?;
                    let items = items.borrow();
                    writer.write_var_int(items.len() as u64).map_err(io)?;
                    for child in items.iter() {
                        serialize_into(child, limits, writer, visited)?;
                    }
                }
                StackItem::Map(map) => {
                    writer.write_u8(StackItemType::Map as u8).map_err(io)?;
                    let map = map.borrow();
                    writer.write_var_int(map.len() as u64).map_err(io)?;
                    for (key, value) in map.iter() {
                        serialize_into(key, limits, writer, visited)?;
                        serialize_into(value, limits, writer, visited)?;
                    }
                }
                _ => unreachable!(),
            }
            visited.pop();
            Ok(())
        }
        StackItem::Pointer { .. } | StackItem::Interop(_) => Err(VmError::invalid_operation(
            format!("{} is not serializable", item.type_name()),
        )),
    }
}

/// Deserializes an item from its canonical byte form.
pub fn deserialize_item(data: &[u8], limits: &ExecutionEngineLimits) -> VmResult<StackItem> {
    if data.len() > limits.max_item_size {
        return Err(VmError::ItemTooLarge(data.len()));
    }
    let mut reader = MemoryReader::new(data);
    let item = deserialize_from(&mut reader, limits, 0)?;
    if reader.remaining() != 0 {
        return Err(VmError::invalid_operation("trailing serialized bytes"));
    }
    Ok(item)
}

fn deserialize_from(
    reader: &mut MemoryReader,
    limits: &ExecutionEngineLimits,
    depth: usize,
) -> VmResult<StackItem> {
    if depth > limits.max_nesting_depth {
        return Err(VmError::NestingTooDeep);
    }
    let io = |e: helios_io::Error| VmError::invalid_operation(e.to_string());
    let tag = StackItemType::from_byte(reader.read_u8().map_err(io)?)?;
    match tag {
        StackItemType::Any => Ok(StackItem::Null),
        StackItemType::Boolean => Ok(StackItem::Boolean(reader.read_bool().map_err(io)?)),
        StackItemType::Integer => {
            let bytes = reader
                .read_var_bytes(ExecutionEngineLimits::MAX_INTEGER_SIZE)
                .map_err(io)?;
            Ok(StackItem::Integer(StackItem::bytes_to_int(&bytes)))
        }
        StackItemType::ByteString => Ok(StackItem::ByteString(
            reader.read_var_bytes(limits.max_item_size).map_err(io)?,
        )),
        StackItemType::Buffer => Ok(StackItem::new_buffer(
            reader.read_var_bytes(limits.max_item_size).map_err(io)?,
        )),
        StackItemType::Array | StackItemType::Struct => {
            let count = reader
                .read_var_int(limits.max_stack_size as u64)
                .map_err(io)? as usize;
            let mut items = Vec::with_capacity(count.min(64));
            for _ in 0..count {
                items.push(deserialize_from(reader, limits, depth + 1)?);
            }
            Ok(if tag == StackItemType::Array {
                StackItem::new_array(items)
            } else {
                StackItem::new_struct(items)
            })
        }
        StackItemType::Map => {
            let count = reader
                .read_var_int(limits.max_stack_size as u64)
                .map_err(io)? as usize;
            let mut map = OrderedMap::new();
            for _ in 0..count {
                let key = deserialize_from(reader, limits, depth + 1)?;
                let value = deserialize_from(reader, limits, depth + 1)?;
                map.insert(key, value)?;
            }
            Ok(StackItem::Map(std::rc::Rc::new(std::cell::RefCell::new(
                map,
            ))))
        }
        StackItemType::Pointer | StackItemType::InteropInterface => Err(
            VmError::invalid_operation(format!("{tag:?} is not deserializable")),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigInt;

    fn limits() -> ExecutionEngineLimits {
        ExecutionEngineLimits::default()
    }

    #[test]
    fn test_round_trip_structural_equality() {
        let mut map = OrderedMap::new();
        map.insert(StackItem::from_bytes(b"k"), StackItem::from_int(-7))
            .unwrap();
        let item = StackItem::new_array(vec![
            StackItem::Null,
            StackItem::Boolean(true),
            StackItem::Integer(BigInt::from(1_234_567_890_i64)),
            StackItem::from_bytes(b"payload"),
            StackItem::new_struct(vec![StackItem::from_int(1)]),
            StackItem::Map(std::rc::Rc::new(std::cell::RefCell::new(map))),
        ]);
        let bytes = serialize_item(&item, &limits()).unwrap();
        let back = deserialize_item(&bytes, &limits()).unwrap();
        // Arrays are identity-equal; compare piecewise structurally.
        if let (StackItem::Array(a), StackItem::Array(b)) = (&item, &back) {
            let a = a.borrow();
            let b = b.borrow();
            assert_eq!(a.len(), b.len());
            assert!(a[4].equals(&b[4], &limits()).unwrap());
            assert!(a[2].equals(&b[2], &limits()).unwrap());
        } else {
            panic!("expected arrays");
        }
    }

    #[test]
    fn test_map_order_preserved() {
        let mut map = OrderedMap::new();
        for i in [5, 1, 3] {
            map.insert(StackItem::from_int(i), StackItem::from_int(i * i))
                .unwrap();
        }
        let item = StackItem::Map(std::rc::Rc::new(std::cell::RefCell::new(map)));
        let bytes = serialize_item(&item, &limits()).unwrap();
        let back = deserialize_item(&bytes, &limits()).unwrap();
        if let StackItem::Map(m) = back {
            let keys: Vec<BigInt> = m
                .borrow()
                .keys()
                .map(|k| k.to_int().unwrap())
                .collect();
            assert_eq!(keys, vec![5.into(), 1.into(), 3.into()]);
        } else {
            panic!("expected map");
        }
    }

    #[test]
    fn test_cycle_faults() {
        let outer = StackItem::new_array(vec![]);
        if let StackItem::Array(items) = &outer {
            items.borrow_mut().push(outer.clone());
        }
        assert_eq!(
            serialize_item(&outer, &limits()),
            Err(VmError::CircularReference)
        );
    }

    #[test]
    fn test_shared_but_acyclic_graph_serializes() {
        let shared = StackItem::new_struct(vec![StackItem::from_int(9)]);
        let outer = StackItem::new_array(vec![shared.clone(), shared]);
        assert!(serialize_item(&outer, &limits()).is_ok());
    }

    #[test]
    fn test_interop_not_serializable() {
        #[derive(Debug)]
        struct Host;
        impl crate::stack_item::InteropObject for Host {
            fn interface_type(&self) -> &'static str {
                "Host"
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
        }
        let item = StackItem::from_interop(std::rc::Rc::new(Host));
        assert!(serialize_item(&item, &limits()).is_err());
    }
}
