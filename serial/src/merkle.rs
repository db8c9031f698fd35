//! Transaction-tree root (§4.2): Merkle root over
//! `[hash(baseTx)] ++ transactionHashes`, Bytecoin-style — when the leaf
//! count isn't a power of two, the left prefix is reduced first by the
//! largest power of two not exceeding the count, then the tree halves
//! pairwise until one hash remains.

use sha3::{Digest, Keccak256};

fn hash_pair(a: &[u8; 32], b: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(a);
    hasher.update(b);
    hasher.finalize().into()
}

fn prev_power_of_two(n: usize) -> usize {
    let mut p = 1usize;
    while p * 2 <= n {
        p *= 2;
    }
    p
}

/// Returns `None` for an empty leaf set — the caller (the base
/// transaction hash is always present) should treat that as a logic
/// error, not a recoverable one.
#[must_use]
pub fn tree_hash(leaves: &[[u8; 32]]) -> Option<[u8; 32]> {
    match leaves.len() {
        0 => None,
        1 => Some(leaves[0]),
        2 => Some(hash_pair(&leaves[0], &leaves[1])),
        count => {
            let mut cnt = prev_power_of_two(count);
            let mut level = vec![[0u8; 32]; cnt];
            let overhang = 2 * cnt - count;
            level[..overhang].copy_from_slice(&leaves[..overhang]);

            let mut i = overhang;
            let mut j = overhang;
            while j < count {
                level[i] = hash_pair(&leaves[j], &leaves[j + 1]);
                i += 1;
                j += 2;
            }
            debug_assert_eq!(i, cnt);

            while cnt > 1 {
                cnt /= 2;
                let mut k = 0;
                for n in 0..cnt {
                    level[n] = hash_pair(&level[k], &level[k + 1]);
                    k += 2;
                }
            }
            Some(level[0])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn single_leaf_is_identity() {
        assert_eq!(tree_hash(&[leaf(1)]), Some(leaf(1)));
    }

    #[test]
    fn two_leaves_hash_directly() {
        let expected = hash_pair(&leaf(1), &leaf(2));
        assert_eq!(tree_hash(&[leaf(1), leaf(2)]), Some(expected));
    }

    #[test]
    fn power_of_two_leaves_build_a_balanced_tree() {
        let leaves: Vec<_> = (1..=4).map(leaf).collect();
        let l01 = hash_pair(&leaves[0], &leaves[1]);
        let l23 = hash_pair(&leaves[2], &leaves[3]);
        let expected = hash_pair(&l01, &l23);
        assert_eq!(tree_hash(&leaves), Some(expected));
    }

    #[test]
    fn non_power_of_two_reduces_the_left_prefix_first() {
        // 3 leaves: cnt = 2, overhang = 1. leaves[0] passes through
        // untouched; leaves[1] and leaves[2] combine into the second slot.
        let leaves: Vec<_> = (1..=3).map(leaf).collect();
        let combined = hash_pair(&leaves[1], &leaves[2]);
        let expected = hash_pair(&leaves[0], &combined);
        assert_eq!(tree_hash(&leaves), Some(expected));
    }

    #[test]
    fn empty_input_has_no_root() {
        assert_eq!(tree_hash(&[]), None);
    }
}
