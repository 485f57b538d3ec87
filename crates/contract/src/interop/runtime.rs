//! System.Runtime.* syscall handlers.

use helios_core::UInt160;
use helios_crypto::ECPoint;
use helios_vm::{StackItem, VmError};

use crate::application_engine::{ApplicationEngine, ScriptContainer};
use crate::{Error, Result};

/// Longest permitted event name.
const MAX_EVENT_NAME: usize = 32;
/// Longest permitted log message.
const MAX_LOG_MESSAGE: usize = 1024;

pub fn platform(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    engine
        .vm_mut()
        .push(StackItem::from_bytes(b"NEO".to_vec()))?;
    Ok(())
}

pub fn get_network(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let magic = engine.settings().magic();
    engine.vm_mut().push(StackItem::from_int(magic as i64))?;
    Ok(())
}

pub fn get_trigger(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let trigger = engine.trigger() as u8;
    engine.vm_mut().push(StackItem::from_int(trigger as i64))?;
    Ok(())
}

pub fn get_time(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let timestamp = engine
        .persisting_block()
        .map(|b| b.header.timestamp)
        .ok_or_else(|| {
            Error::Vm(VmError::invalid_operation(
                "GetTime outside a persisting block",
            ))
        })?;
    engine
        .vm_mut()
        .push(StackItem::from_int(timestamp as i64))?;
    Ok(())
}

pub fn get_script_container(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let item = match engine.container() {
        Some(ScriptContainer::Transaction(tx)) => StackItem::new_array(vec![
            StackItem::from_bytes(tx.hash().to_vec()),
            StackItem::from_int(tx.version as i64),
            StackItem::from_int(tx.nonce as i64),
            StackItem::from_bytes(tx.sender().unwrap_or_default().to_vec()),
            StackItem::from_int(tx.system_fee),
            StackItem::from_int(tx.network_fee),
            StackItem::from_int(tx.valid_until_block as i64),
            StackItem::from_bytes(tx.script.clone()),
        ]),
        Some(ScriptContainer::Header(header)) => {
            StackItem::new_array(vec![StackItem::from_bytes(header.hash().to_vec())])
        }
        None => StackItem::Null,
    };
    engine.vm_mut().push(item)?;
    Ok(())
}

pub fn get_executing_script_hash(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let item = match engine.current_script_hash() {
        Some(hash) => StackItem::from_bytes(hash.to_vec()),
        None => StackItem::Null,
    };
    engine.vm_mut().push(item)?;
    Ok(())
}

pub fn get_calling_script_hash(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let item = match engine.calling_script_hash() {
        Some(hash) => StackItem::from_bytes(hash.to_vec()),
        None => StackItem::Null,
    };
    engine.vm_mut().push(item)?;
    Ok(())
}

pub fn get_entry_script_hash(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let item = match engine.entry_script_hash() {
        Some(hash) => StackItem::from_bytes(hash.to_vec()),
        None => StackItem::Null,
    };
    engine.vm_mut().push(item)?;
    Ok(())
}

pub fn check_witness(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let raw = engine.vm_mut().pop()?.to_bytes()?;
    let hash = match raw.len() {
        20 => UInt160::from_bytes(&raw)?,
        33 => {
            let key = ECPoint::from_bytes(&raw)?;
            crate::contract::signature_address(&key)
        }
        other => {
            return Err(Error::InvalidArgument(format!(
                "CheckWitness argument of {other} bytes"
            )))
        }
    };
    let witnessed = engine.check_witness(&hash)?;
    engine.vm_mut().push(StackItem::Boolean(witnessed))?;
    Ok(())
}

pub fn log(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let message = engine.vm_mut().pop()?.to_bytes()?;
    if message.len() > MAX_LOG_MESSAGE {
        return Err(Error::InvalidArgument(format!(
            "log message of {} bytes exceeds the limit",
            message.len()
        )));
    }
    let message = String::from_utf8(message)
        .map_err(|_| Error::InvalidArgument("log message is not UTF-8".into()))?;
    engine.log(message)
}

pub fn notify(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let name = engine.vm_mut().pop()?.to_bytes()?;
    if name.len() > MAX_EVENT_NAME {
        return Err(Error::InvalidArgument(format!(
            "event name of {} bytes exceeds the limit",
            name.len()
        )));
    }
    let name = String::from_utf8(name)
        .map_err(|_| Error::InvalidArgument("event name is not UTF-8".into()))?;
    let state = engine.vm_mut().pop()?;
    let StackItem::Array(items) = &state else {
        return Err(Error::InvalidArgument("notification state must be an array".into()));
    };
    let state = items.borrow().clone();
    engine.notify(name, state)
}

pub fn gas_left(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let left = engine.gas_left();
    engine.vm_mut().push(StackItem::from_int(left))?;
    Ok(())
}
