//! System.Storage.* syscall handlers.

use std::cell::Cell;
use std::rc::Rc;

use helios_vm::stack_item::serializer::deserialize_item;
use helios_vm::{InteropObject, StackItem, VmError};

use crate::application_engine::ApplicationEngine;
use crate::native;
use crate::{Error, Result};

/// Longest storage key accepted from scripts.
pub const MAX_STORAGE_KEY_SIZE: usize = 64;
/// Largest storage value accepted from scripts.
pub const MAX_STORAGE_VALUE_SIZE: usize = 0xFFFF;

/// A contract's view into its own storage namespace.
#[derive(Debug, Clone)]
pub struct StorageContext {
    /// The owning contract id.
    pub id: i32,
    /// Read-only views refuse Put/Delete.
    pub read_only: bool,
}

impl InteropObject for StorageContext {
    fn interface_type(&self) -> &'static str {
        "StorageContext"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

/// Options controlling what `Find` iterators yield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FindOptions(pub u8);

impl FindOptions {
    pub const NONE: u8 = 0;
    pub const KEYS_ONLY: u8 = 1 << 0;
    pub const REMOVE_PREFIX: u8 = 1 << 1;
    pub const VALUES_ONLY: u8 = 1 << 2;
    pub const DESERIALIZE_VALUES: u8 = 1 << 3;

    fn has(&self, flag: u8) -> bool {
        self.0 & flag != 0
    }
}

/// A deterministic snapshot iterator over a storage prefix.
#[derive(Debug)]
pub struct StorageIterator {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    prefix_len: usize,
    options: FindOptions,
    position: Cell<Option<usize>>,
}

impl StorageIterator {
    fn new(entries: Vec<(Vec<u8>, Vec<u8>)>, prefix_len: usize, options: FindOptions) -> Self {
        Self {
            entries,
            prefix_len,
            options,
            position: Cell::new(None),
        }
    }

    /// Advances; true while an element is available.
    pub fn next(&self) -> bool {
        let next = match self.position.get() {
            None => 0,
            Some(position) => position + 1,
        };
        self.position.set(Some(next));
        next < self.entries.len()
    }

    /// The current element shaped by the find options.
    pub fn value(&self) -> Result<StackItem> {
        let index = self
            .position
            .get()
            .filter(|&i| i < self.entries.len())
            .ok_or_else(|| {
                Error::Vm(VmError::invalid_operation("iterator has no current value"))
            })?;
        let (key, value) = &self.entries[index];
        let key_bytes = if self.options.has(FindOptions::REMOVE_PREFIX) {
            key[self.prefix_len..].to_vec()
        } else {
            key.clone()
        };
        let value_item = if self.options.has(FindOptions::DESERIALIZE_VALUES) {
            deserialize_item(value, &helios_vm::ExecutionEngineLimits::default())
                .map_err(Error::Vm)?
        } else {
            StackItem::from_bytes(value.clone())
        };
        if self.options.has(FindOptions::KEYS_ONLY) {
            return Ok(StackItem::from_bytes(key_bytes));
        }
        if self.options.has(FindOptions::VALUES_ONLY) {
            return Ok(value_item);
        }
        Ok(StackItem::new_struct(vec![
            StackItem::from_bytes(key_bytes),
            value_item,
        ]))
    }
}

impl InteropObject for StorageIterator {
    fn interface_type(&self) -> &'static str {
        "StorageIterator"
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn pop_context(engine: &mut ApplicationEngine<'_>) -> Result<StorageContext> {
    let item = engine.vm_mut().pop()?;
    let StackItem::Interop(object) = &item else {
        return Err(Error::Vm(VmError::invalid_type(
            "StorageContext",
            item.type_name(),
        )));
    };
    object
        .as_any()
        .downcast_ref::<StorageContext>()
        .cloned()
        .ok_or_else(|| {
            Error::Vm(VmError::invalid_type(
                "StorageContext",
                object.interface_type(),
            ))
        })
}

fn current_contract_id(engine: &ApplicationEngine<'_>) -> Result<i32> {
    let current = engine
        .current_script_hash()
        .ok_or_else(|| Error::Vm(VmError::invalid_operation("no executing script")))?;
    if let Some(native) = engine.natives().by_hash(&current) {
        return Ok(native.id());
    }
    native::management::get_contract(engine.snapshot(), &current)
        .map(|c| c.id)
        .ok_or_else(|| Error::ContractNotFound(current.to_string()))
}

pub fn get_context(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let id = current_contract_id(engine)?;
    engine
        .vm_mut()
        .push(StackItem::from_interop(Rc::new(StorageContext {
            id,
            read_only: false,
        })))?;
    Ok(())
}

pub fn get_read_only_context(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let id = current_contract_id(engine)?;
    engine
        .vm_mut()
        .push(StackItem::from_interop(Rc::new(StorageContext {
            id,
            read_only: true,
        })))?;
    Ok(())
}

pub fn as_read_only(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let context = pop_context(engine)?;
    engine
        .vm_mut()
        .push(StackItem::from_interop(Rc::new(StorageContext {
            id: context.id,
            read_only: true,
        })))?;
    Ok(())
}

pub fn get(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let context = pop_context(engine)?;
    let key = engine.vm_mut().pop()?.to_bytes()?;
    let item = match engine.storage_get(context.id, &key) {
        Some(value) => StackItem::from_bytes(value),
        None => StackItem::Null,
    };
    engine.vm_mut().push(item)?;
    Ok(())
}

pub fn put(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let context = pop_context(engine)?;
    if context.read_only {
        return Err(Error::PermissionDenied(
            "cannot write through a read-only storage context".into(),
        ));
    }
    let key = engine.vm_mut().pop()?.to_bytes()?;
    if key.len() > MAX_STORAGE_KEY_SIZE {
        return Err(Error::InvalidArgument(format!(
            "storage key of {} bytes exceeds the limit",
            key.len()
        )));
    }
    let value = engine.vm_mut().pop()?.to_bytes()?;
    if value.len() > MAX_STORAGE_VALUE_SIZE {
        return Err(Error::InvalidArgument(format!(
            "storage value of {} bytes exceeds the limit",
            value.len()
        )));
    }
    let fee = (key.len() + value.len()) as i64 * engine.storage_price();
    engine.add_gas(fee)?;
    engine.storage_put(context.id, &key, value)
}

pub fn delete(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let context = pop_context(engine)?;
    if context.read_only {
        return Err(Error::PermissionDenied(
            "cannot delete through a read-only storage context".into(),
        ));
    }
    let key = engine.vm_mut().pop()?.to_bytes()?;
    engine.storage_delete(context.id, &key)
}

pub fn find(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let context = pop_context(engine)?;
    let prefix = engine.vm_mut().pop()?.to_bytes()?;
    use num_traits::ToPrimitive;
    let options = engine
        .vm_mut()
        .pop()?
        .to_int()?
        .to_u8()
        .map(FindOptions)
        .ok_or_else(|| Error::InvalidArgument("find options out of range".into()))?;
    let entries: Vec<(Vec<u8>, Vec<u8>)> = engine
        .storage_find(context.id, &prefix)
        .into_iter()
        .map(|(key, item)| (key.key, item.value))
        .collect();
    let iterator = StorageIterator::new(entries, prefix.len(), options);
    engine
        .vm_mut()
        .push(StackItem::from_interop(Rc::new(iterator)))?;
    Ok(())
}
