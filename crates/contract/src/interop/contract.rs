//! System.Contract.* syscall handlers.

use helios_core::UInt160;
use helios_vm::{CallFlags, StackItem, VmError};

use crate::application_engine::ApplicationEngine;
use crate::{Error, Result};

pub fn call(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let hash_bytes = engine.vm_mut().pop()?.to_bytes()?;
    let target = UInt160::from_bytes(&hash_bytes)?;
    let method_bytes = engine.vm_mut().pop()?.to_bytes()?;
    let method = String::from_utf8(method_bytes)
        .map_err(|_| Error::InvalidArgument("method name is not UTF-8".into()))?;
    let flag_bits = engine.vm_mut().pop()?.to_int()?;
    let flag_bits = u8::try_from(flag_bits)
        .map_err(|_| Error::InvalidArgument("call flags out of range".into()))?;
    let requested = CallFlags::from_bits(flag_bits)
        .ok_or_else(|| Error::InvalidArgument(format!("unknown call flags {flag_bits:#x}")))?;
    let args_item = engine.vm_mut().pop()?;
    let StackItem::Array(items) = &args_item else {
        return Err(Error::Vm(VmError::invalid_type(
            "Array",
            args_item.type_name(),
        )));
    };
    let args = items.borrow().clone();
    engine.call_contract(target, &method, args, requested, false)
}

pub fn call_native(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    use num_traits::Zero;
    let version = engine.vm_mut().pop()?.to_int()?;
    if !version.is_zero() {
        return Err(Error::Native(format!(
            "unsupported native call version {version}"
        )));
    }
    let method_bytes = engine.vm_mut().pop()?.to_bytes()?;
    let method = String::from_utf8(method_bytes)
        .map_err(|_| Error::InvalidArgument("method name is not UTF-8".into()))?;
    let args_item = engine.vm_mut().pop()?;
    let StackItem::Array(items) = &args_item else {
        return Err(Error::Vm(VmError::invalid_type(
            "Array",
            args_item.type_name(),
        )));
    };
    let args = items.borrow().clone();

    let current = engine
        .current_script_hash()
        .ok_or_else(|| Error::Vm(VmError::invalid_operation("no executing script")))?;
    let registry = engine.natives();
    let native = registry
        .by_hash(&current)
        .ok_or_else(|| Error::ContractNotFound(format!("{current} is not native")))?;
    let descriptor = native
        .method(&method, args.len())
        .ok_or_else(|| Error::MethodNotFound(format!("{}::{method}", native.name())))?;

    if !engine.current_call_flags().contains(descriptor.required_flags) {
        return Err(Error::Vm(VmError::MissingCallFlags(format!(
            "{}::{} requires {:?}",
            native.name(),
            method,
            descriptor.required_flags
        ))));
    }
    engine.add_gas(descriptor.price * engine.exec_fee_factor())?;

    // The handler may load further contexts (deploy hooks, callbacks), so
    // the result goes onto the stub frame's stack, not whatever frame is on
    // top once the handler returns.
    let stub_stack = engine.vm().current_stack()?;
    let result = native.invoke(engine, &method, args)?;
    stub_stack.borrow_mut().push(result);
    Ok(())
}

pub fn get_call_flags(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let bits = engine.current_call_flags().bits();
    engine.vm_mut().push(StackItem::from_int(bits as i64))?;
    Ok(())
}
