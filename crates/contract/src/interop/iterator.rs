//! System.Iterator.* syscall handlers.

use helios_vm::{StackItem, VmError};

use crate::application_engine::ApplicationEngine;
use crate::interop::storage::StorageIterator;
use crate::{Error, Result};

fn pop_iterator(engine: &mut ApplicationEngine<'_>) -> Result<StackItem> {
    let item = engine.vm_mut().pop()?;
    match &item {
        StackItem::Interop(object) if object.as_any().is::<StorageIterator>() => Ok(item),
        other => Err(Error::Vm(VmError::invalid_type(
            "StorageIterator",
            other.type_name(),
        ))),
    }
}

pub fn next(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let item = pop_iterator(engine)?;
    let StackItem::Interop(object) = &item else {
        unreachable!("pop_iterator returned a non-interop item");
    };
    let iterator = object
        .as_any()
        .downcast_ref::<StorageIterator>()
        .ok_or_else(|| Error::Vm(VmError::invalid_operation("iterator type changed")))?;
    let advanced = iterator.next();
    engine.vm_mut().push(StackItem::Boolean(advanced))?;
    Ok(())
}

pub fn value(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let item = pop_iterator(engine)?;
    let StackItem::Interop(object) = &item else {
        unreachable!("pop_iterator returned a non-interop item");
    };
    let iterator = object
        .as_any()
        .downcast_ref::<StorageIterator>()
        .ok_or_else(|| Error::Vm(VmError::invalid_operation("iterator type changed")))?;
    let current = iterator.value()?;
    engine.vm_mut().push(current)?;
    Ok(())
}
