//! System.Crypto.* syscall handlers.

use num_traits::ToPrimitive;

use helios_crypto::{ECPoint, Secp256r1};
use helios_vm::{StackItem, VmError};

use crate::application_engine::ApplicationEngine;
use crate::{Error, Result};

/// Per-key price of multi-signature checking, in fee units.
const CHECK_MULTISIG_PRICE_PER_KEY: i64 = 1 << 15;

/// Most keys or signatures one check may involve.
const MAX_SIG_ELEMENTS: usize = 1024;

fn sign_data(engine: &ApplicationEngine<'_>) -> Result<Vec<u8>> {
    let magic = engine.settings().magic();
    engine
        .container()
        .map(|container| container.sign_data(magic))
        .ok_or_else(|| {
            Error::Vm(VmError::invalid_operation(
                "signature check without a script container",
            ))
        })
}

pub fn check_sig(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let key_bytes = engine.vm_mut().pop()?.to_bytes()?;
    let signature = engine.vm_mut().pop()?.to_bytes()?;
    let key = ECPoint::from_bytes(&key_bytes)?;
    let data = sign_data(engine)?;
    let valid = Secp256r1::verify(&data, &signature, &key).unwrap_or(false);
    engine.vm_mut().push(StackItem::Boolean(valid))?;
    Ok(())
}

/// Pops a signature-element group: either one Array of byte strings, or an
/// integer count followed by that many loose byte strings — the layout the
/// classic multisig verification script produces.
fn pop_sig_elements(engine: &mut ApplicationEngine<'_>) -> Result<Vec<Vec<u8>>> {
    let top = engine.vm_mut().pop()?;
    match &top {
        StackItem::Array(items) => items
            .borrow()
            .iter()
            .map(|i| i.to_bytes().map_err(Error::Vm))
            .collect(),
        StackItem::Integer(count) => {
            let count = count
                .to_usize()
                .filter(|&n| n > 0 && n <= MAX_SIG_ELEMENTS)
                .ok_or_else(|| {
                    Error::InvalidArgument("signature element count out of range".into())
                })?;
            let mut elements = Vec::with_capacity(count);
            for _ in 0..count {
                elements.push(engine.vm_mut().pop()?.to_bytes()?);
            }
            Ok(elements)
        }
        other => Err(Error::Vm(VmError::invalid_type(
            "Array or Integer",
            other.type_name(),
        ))),
    }
}

pub fn check_multisig(engine: &mut ApplicationEngine<'_>) -> Result<()> {
    let keys = pop_sig_elements(engine)?;
    let signatures = pop_sig_elements(engine)?;
    if keys.is_empty() || signatures.is_empty() || signatures.len() > keys.len() {
        return Err(Error::InvalidArgument(format!(
            "multisig shape {} of {} is invalid",
            signatures.len(),
            keys.len()
        )));
    }

    let fee = CHECK_MULTISIG_PRICE_PER_KEY * keys.len() as i64 * engine.exec_fee_factor();
    engine.add_gas(fee)?;

    let parsed: Vec<ECPoint> = keys
        .iter()
        .map(|k| ECPoint::from_bytes(k))
        .collect::<helios_crypto::Result<_>>()?;
    let data = sign_data(engine)?;

    // Each signature must match a later key than the previous one.
    let mut key_index = 0;
    let mut valid = true;
    for signature in &signatures {
        let mut matched = false;
        while key_index < parsed.len() {
            if Secp256r1::verify(&data, signature, &parsed[key_index]).unwrap_or(false) {
                matched = true;
                key_index += 1;
                break;
            }
            key_index += 1;
        }
        if !matched {
            valid = false;
            break;
        }
    }

    engine.vm_mut().push(StackItem::Boolean(valid))?;
    Ok(())
}
