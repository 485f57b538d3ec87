//! Per-round consensus state.

use std::collections::HashMap;

use helios_core::{Transaction, UInt256};
use helios_crypto::ECPoint;

/// Everything one dBFT round accumulates before a block can be committed.
#[derive(Debug)]
pub struct ConsensusContext {
    /// Height being decided.
    pub block_index: u32,
    /// Current view.
    pub view_number: u8,
    /// The validator set for this height, sorted.
    pub validators: Vec<ECPoint>,
    /// This node's position in `validators`; None for watch-only nodes.
    pub my_index: Option<usize>,
    /// Hash of the accepted PrepareRequest payload.
    pub preparation_hash: Option<UInt256>,
    /// The proposal parameters, once received or sent.
    pub proposal: Option<Proposal>,
    /// Validator index → whether a preparation (request or response) is in.
    pub preparations: HashMap<usize, UInt256>,
    /// Validator index → block signature.
    pub commits: HashMap<usize, Vec<u8>>,
    /// Validator index → requested view.
    pub view_changes: HashMap<usize, u8>,
}

/// The candidate block parameters carried by a PrepareRequest.
#[derive(Debug, Clone)]
pub struct Proposal {
    /// Proposed timestamp, milliseconds.
    pub timestamp: u64,
    /// Proposal entropy.
    pub nonce: u64,
    /// Proposed transactions, in order.
    pub transactions: Vec<Transaction>,
}

impl ConsensusContext {
    /// Starts a round at `block_index` with the given validator set.
    pub fn new(block_index: u32, validators: Vec<ECPoint>, my_key: Option<&ECPoint>) -> Self {
        let my_index = my_key.and_then(|key| validators.iter().position(|v| v == key));
        Self {
            block_index,
            view_number: 0,
            validators,
            my_index,
            preparation_hash: None,
            proposal: None,
            preparations: HashMap::new(),
            commits: HashMap::new(),
            view_changes: HashMap::new(),
        }
    }

    /// Number of validators.
    pub fn validator_count(&self) -> usize {
        self.validators.len()
    }

    /// Tolerated faults: `(n - 1) / 3`.
    pub fn faulty(&self) -> usize {
        (self.validator_count().saturating_sub(1)) / 3
    }

    /// Quorum: `n - f`.
    pub fn quorum(&self) -> usize {
        self.validator_count() - self.faulty()
    }

    /// The primary for the current view: `(index - view) mod n`.
    pub fn primary_index(&self) -> usize {
        let n = self.validator_count() as i64;
        let p = (self.block_index as i64 - self.view_number as i64).rem_euclid(n);
        p as usize
    }

    /// True when this node is the current primary.
    pub fn is_primary(&self) -> bool {
        self.my_index == Some(self.primary_index())
    }

    /// True when this node participates at all.
    pub fn is_validator(&self) -> bool {
        self.my_index.is_some()
    }

    /// True once enough preparations arrived to commit.
    pub fn preparations_complete(&self) -> bool {
        self.proposal.is_some() && self.preparations.len() >= self.quorum()
    }

    /// True once enough commits arrived to assemble the block.
    pub fn commits_complete(&self) -> bool {
        self.commits.len() >= self.quorum()
    }

    /// True once enough view-change requests point past the current view.
    pub fn view_change_ready(&self) -> bool {
        let next = self.view_number + 1;
        self.view_changes.values().filter(|&&v| v >= next).count() >= self.quorum()
    }

    /// Moves to the next view, discarding round progress.
    pub fn change_view(&mut self) {
        self.view_number += 1;
        self.preparation_hash = None;
        self.proposal = None;
        self.preparations.clear();
        self.commits.clear();
        self.view_changes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helios_crypto::KeyPair;

    fn validators(n: usize) -> Vec<ECPoint> {
        let mut keys: Vec<ECPoint> = (0..n).map(|_| KeyPair::generate().public_key()).collect();
        keys.sort();
        keys
    }

    #[test]
    fn test_quorum_sizes() {
        let ctx = ConsensusContext::new(1, validators(7), None);
        assert_eq!(ctx.faulty(), 2);
        assert_eq!(ctx.quorum(), 5);

        let ctx = ConsensusContext::new(1, validators(4), None);
        assert_eq!(ctx.faulty(), 1);
        assert_eq!(ctx.quorum(), 3);
    }

    #[test]
    fn test_primary_rotates_with_view() {
        let mut ctx = ConsensusContext::new(10, validators(7), None);
        let first = ctx.primary_index();
        ctx.change_view();
        let second = ctx.primary_index();
        assert_ne!(first, second);
        assert_eq!(first, (second + 1) % 7);
    }

    #[test]
    fn test_watch_only_has_no_index() {
        let ctx = ConsensusContext::new(1, validators(4), None);
        assert!(!ctx.is_validator());
        assert!(!ctx.is_primary());
    }

    #[test]
    fn test_change_view_resets_round() {
        let keys = validators(4);
        let mut ctx = ConsensusContext::new(5, keys, None);
        ctx.preparations.insert(0, UInt256::zero());
        ctx.commits.insert(0, vec![0; 64]);
        ctx.change_view();
        assert!(ctx.preparations.is_empty());
        assert!(ctx.commits.is_empty());
        assert_eq!(ctx.view_number, 1);
    }
}
