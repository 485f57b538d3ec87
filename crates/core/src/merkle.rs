//! Merkle root computation over transaction hashes.

use helios_crypto::hash256;

use crate::UInt256;

/// Computes the merkle root of an ordered hash list.
///
/// An empty list yields the zero hash. Odd levels duplicate their last
/// element, the same rule the original chain applies.
pub fn compute_merkle_root(hashes: &[UInt256]) -> UInt256 {
    if hashes.is_empty() {
        return UInt256::zero();
    }
    let mut level: Vec<UInt256> = hashes.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            let last = level[level.len() - 1];
            level.push(last);
        }
        level = level
            .chunks(2)
            .map(|pair| {
                let mut data = [0u8; UInt256::SIZE * 2];
                data[..UInt256::SIZE].copy_from_slice(pair[0].as_bytes());
                data[UInt256::SIZE..].copy_from_slice(pair[1].as_bytes());
                UInt256::from_array(hash256(&data))
            })
            .collect();
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_is_zero() {
        assert_eq!(compute_merkle_root(&[]), UInt256::zero());
    }

    #[test]
    fn test_single_hash_is_its_own_root() {
        let h = UInt256::hash_of(b"only");
        assert_eq!(compute_merkle_root(&[h]), h);
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        let a = UInt256::hash_of(b"a");
        let b = UInt256::hash_of(b"b");
        let c = UInt256::hash_of(b"c");
        let root_three = compute_merkle_root(&[a, b, c]);
        let root_padded = compute_merkle_root(&[a, b, c, c]);
        assert_eq!(root_three, root_padded);
    }

    #[test]
    fn test_order_matters() {
        let a = UInt256::hash_of(b"a");
        let b = UInt256::hash_of(b"b");
        assert_ne!(compute_merkle_root(&[a, b]), compute_merkle_root(&[b, a]));
    }
}
