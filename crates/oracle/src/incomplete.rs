//! Per-request signature collection state.

use std::collections::HashMap;
use std::time::Instant;

use helios_core::{Transaction, Witness};
use helios_crypto::ECPoint;
use helios_vm::ScriptBuilder;

use helios_contract::native::oracle::OracleRequest;
use helios_contract::{create_multisig_redeem_script, validators_threshold};

use crate::{Error, Result};

/// Collects signatures for one request's candidate response transactions.
///
/// Each oracle public key contributes at most one signature per candidate;
/// `is_sent` latches once the finished transaction left for the mempool so
/// it is pooled at most once.
#[derive(Debug)]
pub struct IncompleteTx {
    /// The on-chain request, once known.
    pub request: Option<OracleRequest>,
    /// The primary candidate carrying the real result.
    pub tx: Option<Transaction>,
    /// The ConsensusUnreachable fallback.
    pub backup_tx: Option<Transaction>,
    /// Signatures over the primary, by compressed public key.
    sigs: HashMap<Vec<u8>, Vec<u8>>,
    /// Signatures over the backup, by compressed public key.
    backup_sigs: HashMap<Vec<u8>, Vec<u8>>,
    /// Set once the ready transaction was handed to the pool.
    pub is_sent: bool,
    /// Processing attempts, drives NeoFS node rotation.
    pub attempts: u32,
    /// Last time this entry made progress.
    pub last_touch: Instant,
}

impl IncompleteTx {
    /// A fresh, empty entry.
    pub fn new() -> Self {
        Self {
            request: None,
            tx: None,
            backup_tx: None,
            sigs: HashMap::new(),
            backup_sigs: HashMap::new(),
            is_sent: false,
            attempts: 0,
            last_touch: Instant::now(),
        }
    }

    /// Records a signature for one candidate; repeated signatures from the
    /// same key are ignored.
    pub fn add_response(&mut self, key: &ECPoint, signature: Vec<u8>, backup: bool) {
        let target = if backup {
            &mut self.backup_sigs
        } else {
            &mut self.sigs
        };
        target.entry(key.to_vec()).or_insert(signature);
    }

    /// Signature already collected from `key`?
    pub fn has_signature(&self, key: &ECPoint, backup: bool) -> bool {
        let target = if backup { &self.backup_sigs } else { &self.sigs };
        target.contains_key(key.as_bytes().as_slice())
    }

    /// The backup signature this node produced, for re-broadcast.
    pub fn backup_signature(&self, key: &ECPoint) -> Option<&Vec<u8>> {
        self.backup_sigs.get(key.as_bytes().as_slice())
    }

    /// Signatures collected for the chosen candidate.
    pub fn signature_count(&self, backup: bool) -> usize {
        if backup {
            self.backup_sigs.len()
        } else {
            self.sigs.len()
        }
    }

    /// Attempts to assemble the chosen candidate's multi-signature witness.
    ///
    /// Returns the finished transaction once `m = n - (n-1)/3` of the
    /// designated keys signed it; the caller owns the `is_sent` latch.
    pub fn finalize(&self, oracle_nodes: &[ECPoint], backup: bool) -> Result<Option<Transaction>> {
        let (candidate, sigs) = if backup {
            (&self.backup_tx, &self.backup_sigs)
        } else {
            (&self.tx, &self.sigs)
        };
        let Some(tx) = candidate else {
            return Ok(None);
        };
        if oracle_nodes.is_empty() {
            return Err(Error::Fetch("no designated oracle nodes".into()));
        }
        let m = validators_threshold(oracle_nodes.len());

        // CheckMultisig wants signatures in the key order of the script,
        // which sorts keys ascending.
        let mut sorted = oracle_nodes.to_vec();
        sorted.sort();
        let mut builder = ScriptBuilder::new();
        let mut used = 0;
        for key in &sorted {
            if used >= m {
                break;
            }
            if let Some(signature) = sigs.get(key.as_bytes().as_slice()) {
                builder.emit_push_bytes(signature);
                used += 1;
            }
        }
        if used < m {
            return Ok(None);
        }

        let verification = create_multisig_redeem_script(m, oracle_nodes)?;
        let mut finished = tx.clone();
        finished.witnesses = vec![Witness::new(builder.into_bytes(), verification)];
        Ok(Some(finished))
    }
}

impl Default for IncompleteTx {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helios_core::{Signer, UInt160, WitnessScope};
    use helios_crypto::KeyPair;

    fn candidate() -> Transaction {
        Transaction::new(
            vec![0x40],
            vec![Signer::new(UInt160::zero(), WitnessScope::NONE)],
        )
    }

    #[test]
    fn test_signature_collection_dedupes_keys() {
        let key = KeyPair::generate();
        let mut entry = IncompleteTx::new();
        entry.add_response(&key.public_key(), vec![1; 64], false);
        entry.add_response(&key.public_key(), vec![2; 64], false);
        assert_eq!(entry.signature_count(false), 1);
        assert!(entry.has_signature(&key.public_key(), false));
        assert!(!entry.has_signature(&key.public_key(), true));
    }

    #[test]
    fn test_finalize_requires_threshold() {
        let keys: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
        let nodes: Vec<_> = keys.iter().map(KeyPair::public_key).collect();
        let mut entry = IncompleteTx::new();
        let tx = candidate();
        let magic = 0x1234;
        entry.tx = Some(tx.clone());

        // m = 4 - 1 = 3; two signatures are not enough.
        for key in keys.iter().take(2) {
            let sig = key.sign(&tx.sign_data(magic)).unwrap().to_vec();
            entry.add_response(&key.public_key(), sig, false);
        }
        assert!(entry.finalize(&nodes, false).unwrap().is_none());

        let sig = keys[2].sign(&tx.sign_data(magic)).unwrap().to_vec();
        entry.add_response(&keys[2].public_key(), sig, false);
        let finished = entry.finalize(&nodes, false).unwrap().unwrap();
        assert_eq!(finished.witnesses.len(), 1);
        assert!(!finished.witnesses[0].verification_script.is_empty());
    }

    #[test]
    fn test_backup_tracked_separately() {
        let keys: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
        let nodes: Vec<_> = keys.iter().map(KeyPair::public_key).collect();
        let mut entry = IncompleteTx::new();
        entry.backup_tx = Some(candidate());
        for key in keys.iter().take(3) {
            entry.add_response(&key.public_key(), vec![7; 64], true);
        }
        // Primary has no candidate at all.
        assert!(entry.finalize(&nodes, false).unwrap().is_none());
        assert!(entry.finalize(&nodes, true).unwrap().is_some());
    }
}
