//! Verification script construction and committee address derivation.

use helios_core::UInt160;
use helios_crypto::ECPoint;
use helios_vm::{OpCode, ScriptBuilder};

use crate::interop;
use crate::{Error, Result};

/// `m` for a committee of `n`: majority, `n - (n-1)/2`.
pub fn multisig_threshold(n: usize) -> usize {
    n - (n - 1) / 2
}

/// `m` for a validator set of `n`: BFT quorum, `n - (n-1)/3`.
pub fn validators_threshold(n: usize) -> usize {
    n - (n - 1) / 3
}

/// Single-signature verification script for one public key.
pub fn create_signature_redeem_script(key: &ECPoint) -> Vec<u8> {
    let mut builder = ScriptBuilder::new();
    builder.emit_push_bytes(key.as_bytes());
    builder.emit_syscall(interop::ids::SYSTEM_CRYPTO_CHECK_SIG);
    builder.into_bytes()
}

/// The account address of a single public key.
pub fn signature_address(key: &ECPoint) -> UInt160 {
    UInt160::from_script(&create_signature_redeem_script(key))
}

/// `m`-of-`n` multi-signature verification script.
///
/// Keys are sorted by their compressed encoding so every node derives the
/// same script for the same set.
pub fn create_multisig_redeem_script(m: usize, keys: &[ECPoint]) -> Result<Vec<u8>> {
    if m == 0 || m > keys.len() || keys.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "invalid multisig threshold {m} of {}",
            keys.len()
        )));
    }
    let mut sorted = keys.to_vec();
    sorted.sort();
    sorted.dedup();
    if sorted.len() != keys.len() {
        return Err(Error::InvalidArgument("duplicate multisig key".into()));
    }
    let mut builder = ScriptBuilder::new();
    builder.emit_push_int(m as i64);
    for key in &sorted {
        builder.emit_push_bytes(key.as_bytes());
    }
    builder.emit_push_int(sorted.len() as i64);
    builder.emit_syscall(interop::ids::SYSTEM_CRYPTO_CHECK_MULTISIG);
    Ok(builder.into_bytes())
}

/// The address gating committee-only operations: hash of the committee's
/// majority multi-signature script.
pub fn committee_address(committee: &[ECPoint]) -> Result<UInt160> {
    let script = create_multisig_redeem_script(multisig_threshold(committee.len()), committee)?;
    Ok(UInt160::from_script(&script))
}

/// The `next_consensus` address of a validator set: BFT-threshold multisig.
pub fn validators_address(validators: &[ECPoint]) -> Result<UInt160> {
    let script =
        create_multisig_redeem_script(validators_threshold(validators.len()), validators)?;
    Ok(UInt160::from_script(&script))
}

/// Parses a multisig verification script back into (m, keys).
pub fn parse_multisig_script(script: &[u8]) -> Option<(usize, Vec<ECPoint>)> {
    // Minimal shape: PUSH m, PUSHDATA1 33 key..., PUSH n, SYSCALL.
    let mut position = 0;
    let m = read_small_int(script, &mut position)?;
    let mut keys = Vec::new();
    while position < script.len() && script[position] == OpCode::PUSHDATA1.as_byte() {
        if script.len() < position + 2 + 33 || script[position + 1] != 33 {
            return None;
        }
        let key = ECPoint::from_bytes(&script[position + 2..position + 35]).ok()?;
        keys.push(key);
        position += 35;
    }
    let n = read_small_int(script, &mut position)?;
    if n != keys.len() || m == 0 || m > n {
        return None;
    }
    Some((m, keys))
}

fn read_small_int(script: &[u8], position: &mut usize) -> Option<usize> {
    let byte = *script.get(*position)?;
    if (OpCode::PUSH1.as_byte()..=OpCode::PUSH16.as_byte()).contains(&byte) {
        *position += 1;
        return Some((byte - OpCode::PUSH0.as_byte()) as usize);
    }
    if byte == OpCode::PUSHINT8.as_byte() {
        let value = *script.get(*position + 1)?;
        *position += 2;
        return Some(value as usize);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use helios_crypto::KeyPair;

    #[test]
    fn test_thresholds() {
        assert_eq!(multisig_threshold(1), 1);
        assert_eq!(multisig_threshold(7), 4);
        assert_eq!(multisig_threshold(21), 11);
        assert_eq!(validators_threshold(4), 3);
        assert_eq!(validators_threshold(7), 5);
    }

    #[test]
    fn test_multisig_script_is_key_order_independent() {
        let keys: Vec<ECPoint> = (0..3).map(|_| KeyPair::generate().public_key()).collect();
        let mut shuffled = keys.clone();
        shuffled.reverse();
        let a = create_multisig_redeem_script(2, &keys).unwrap();
        let b = create_multisig_redeem_script(2, &shuffled).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_parse_round_trip() {
        let keys: Vec<ECPoint> = (0..4).map(|_| KeyPair::generate().public_key()).collect();
        let script = create_multisig_redeem_script(3, &keys).unwrap();
        let (m, parsed) = parse_multisig_script(&script).unwrap();
        assert_eq!(m, 3);
        assert_eq!(parsed.len(), 4);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let keys: Vec<ECPoint> = (0..2).map(|_| KeyPair::generate().public_key()).collect();
        assert!(create_multisig_redeem_script(0, &keys).is_err());
        assert!(create_multisig_redeem_script(3, &keys).is_err());
    }
}
