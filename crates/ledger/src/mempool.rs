//! The memory pool of verified, unconfirmed transactions.

use std::collections::HashMap;
use std::sync::Arc;

use helios_core::{Transaction, UInt256};
use helios_io::Serializable;

/// Default capacity of the pool.
pub const DEFAULT_CAPACITY: usize = 50_000;

/// Holds verified transactions ordered by fee density.
///
/// All access goes through a single lock held by the owner; reads return
/// consistent snapshots.
#[derive(Debug)]
pub struct Mempool {
    capacity: usize,
    transactions: HashMap<UInt256, Arc<Transaction>>,
}

impl Mempool {
    /// Creates a pool with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a pool with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            transactions: HashMap::new(),
        }
    }

    /// Number of pooled transactions.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// True when nothing is pooled.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// True when `hash` is pooled.
    pub fn contains(&self, hash: &UInt256) -> bool {
        self.transactions.contains_key(hash)
    }

    /// Fetches a pooled transaction.
    pub fn get(&self, hash: &UInt256) -> Option<Arc<Transaction>> {
        self.transactions.get(hash).cloned()
    }

    /// Fee density used for ordering: network fee per serialized byte.
    fn fee_density(tx: &Transaction) -> i64 {
        let size = tx.size().max(1) as i64;
        tx.network_fee / size
    }

    /// Adds an already-verified transaction. When full, the lowest-density
    /// transaction is evicted if the newcomer pays better.
    pub fn try_add(&mut self, tx: Arc<Transaction>) -> bool {
        let hash = tx.hash();
        if self.transactions.contains_key(&hash) {
            return false;
        }
        if self.transactions.len() >= self.capacity {
            let Some((&worst_hash, worst)) = self
                .transactions
                .iter()
                .min_by_key(|(_, t)| Self::fee_density(t))
            else {
                return false;
            };
            if Self::fee_density(&tx) <= Self::fee_density(worst) {
                return false;
            }
            self.transactions.remove(&worst_hash);
        }
        self.transactions.insert(hash, tx);
        true
    }

    /// Removes a transaction.
    pub fn remove(&mut self, hash: &UInt256) -> Option<Arc<Transaction>> {
        self.transactions.remove(hash)
    }

    /// Drops every transaction included in a persisted block.
    pub fn reconcile(&mut self, included: &[Transaction]) {
        for tx in included {
            self.transactions.remove(&tx.hash());
        }
    }

    /// Up to `count` transactions, best fee density first; ties break on
    /// hash so every node proposes the same order.
    pub fn take_sorted(&self, count: usize) -> Vec<Arc<Transaction>> {
        let mut pooled: Vec<Arc<Transaction>> = self.transactions.values().cloned().collect();
        pooled.sort_by(|a, b| {
            Self::fee_density(b)
                .cmp(&Self::fee_density(a))
                .then_with(|| a.hash().cmp(&b.hash()))
        });
        pooled.truncate(count);
        pooled
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use helios_core::{Signer, UInt160, WitnessScope};

    fn tx_with_fee(nonce: u32, network_fee: i64) -> Arc<Transaction> {
        let mut tx = Transaction::new(
            vec![0x40],
            vec![Signer::new(UInt160::zero(), WitnessScope::CALLED_BY_ENTRY)],
        );
        tx.nonce = nonce;
        tx.network_fee = network_fee;
        Arc::new(tx)
    }

    #[test]
    fn test_ordering_by_fee_density() {
        let mut pool = Mempool::new();
        pool.try_add(tx_with_fee(1, 100));
        pool.try_add(tx_with_fee(2, 300_000));
        pool.try_add(tx_with_fee(3, 200_000));
        let sorted = pool.take_sorted(10);
        assert_eq!(sorted[0].nonce, 2);
        assert_eq!(sorted[1].nonce, 3);
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut pool = Mempool::new();
        let tx = tx_with_fee(1, 10);
        assert!(pool.try_add(tx.clone()));
        assert!(!pool.try_add(tx));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_capacity_eviction_prefers_better_fees() {
        let mut pool = Mempool::with_capacity(2);
        pool.try_add(tx_with_fee(1, 1000));
        pool.try_add(tx_with_fee(2, 2000));
        // Worse than both: rejected.
        assert!(!pool.try_add(tx_with_fee(3, 500)));
        // Better: evicts the cheapest.
        assert!(pool.try_add(tx_with_fee(4, 3000)));
        assert_eq!(pool.len(), 2);
        assert!(!pool.contains(&tx_with_fee(1, 1000).hash()));
    }

    #[test]
    fn test_reconcile_removes_included() {
        let mut pool = Mempool::new();
        let tx = tx_with_fee(7, 10);
        pool.try_add(tx.clone());
        pool.reconcile(&[(*tx).clone()]);
        assert!(pool.is_empty());
    }
}
