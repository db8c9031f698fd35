//! Chain synchronization (§4.6 "Sync algorithm"): building the sparse
//! block-id list a peer sends in `REQUEST_CHAIN`, validating what comes
//! back in `RESPONSE_CHAIN_ENTRY`, and batching `REQUEST_GET_OBJECTS`
//! rounds at [`BLOCKS_SYNCHRONIZING_DEFAULT_COUNT`].
//!
//! This module only knows about block ids and heights, not about block
//! validation or storage — it is driven by a [`ChainView`] so it can be
//! exercised without a real [`cryptonote_chain::BlockchainCache`].

use crate::commands::{BlockId, ResponseChainEntry};
use crate::constants::BLOCKS_SYNCHRONIZING_DEFAULT_COUNT;
use crate::error::{ProtocolError, Result};

/// The slice of blockchain-cache state the sync algorithm needs to
/// consult. Implemented by `cryptonote_chain::BlockchainCache` in the
/// handler; a test double implements it directly against a `Vec`.
pub trait ChainView {
    fn top_height(&self) -> Option<u32>;
    fn hash_at(&self, height: u32) -> Option<BlockId>;
    fn height_of(&self, hash: &BlockId) -> Option<u32>;
}

/// Builds the sparse list of known block ids sent in `REQUEST_CHAIN`,
/// starting at the tip and stepping back with doubling gaps so a long
/// fork can still be found with a short list, always including genesis.
pub fn build_sparse_chain(view: &dyn ChainView) -> Vec<BlockId> {
    let Some(top) = view.top_height() else { return Vec::new() };

    let mut ids = Vec::new();
    let mut height = top;
    let mut step = 1u64;
    loop {
        if let Some(hash) = view.hash_at(height) {
            ids.push(hash);
        }
        if height == 0 {
            break;
        }
        let next = u64::from(height).saturating_sub(step);
        height = u32::try_from(next).unwrap_or(0);
        step = step.saturating_mul(2);
    }
    if ids.last() != view.hash_at(0).as_ref() {
        if let Some(genesis) = view.hash_at(0) {
            ids.push(genesis);
        }
    }
    ids
}

/// Result of reconciling a `RESPONSE_CHAIN_ENTRY` against local state:
/// the height both chains agree on, and the heights the peer has beyond
/// that point which still need fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReconciliation {
    pub common_ancestor_height: u32,
    pub needed_block_ids: Vec<BlockId>,
    pub peer_total_height: u32,
}

/// Validates `entry` against the local view and derives the range of
/// blocks still needed, per §4.6: the first id in the entry must be a
/// block the caller already knows about, and `start_height + len - 1`
/// must not exceed the peer's claimed total height.
pub fn reconcile_chain_entry(view: &dyn ChainView, entry: &ResponseChainEntry) -> Result<ChainReconciliation> {
    let Some(first_id) = entry.ids.first() else {
        return Err(ProtocolError::BadBlock("chain entry carries no ids".into()));
    };
    let common_ancestor_height = view
        .height_of(first_id)
        .ok_or_else(|| ProtocolError::BadBlock("chain entry's first id is not a known ancestor".into()))?;
    if common_ancestor_height != entry.start_height {
        return Err(ProtocolError::BadBlock("chain entry start height does not match the known ancestor".into()));
    }

    let claimed_end = entry
        .start_height
        .checked_add(entry.ids.len() as u32)
        .and_then(|v| v.checked_sub(1))
        .ok_or_else(|| ProtocolError::BadBlock("chain entry height range overflows".into()))?;
    if claimed_end > entry.total_height {
        return Err(ProtocolError::BadBlock("chain entry claims more height than the peer reports".into()));
    }

    let needed_block_ids = entry.ids.iter().skip(1).copied().collect();
    Ok(ChainReconciliation { common_ancestor_height, needed_block_ids, peer_total_height: entry.total_height })
}

/// Splits a needed-block-id list into `REQUEST_GET_OBJECTS` batches of
/// at most [`BLOCKS_SYNCHRONIZING_DEFAULT_COUNT`] ids each.
pub fn batch_for_get_objects(ids: &[BlockId]) -> Vec<Vec<BlockId>> {
    ids.chunks(BLOCKS_SYNCHRONIZING_DEFAULT_COUNT).map(<[BlockId]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeChain {
        hashes: Vec<BlockId>,
    }

    impl ChainView for FakeChain {
        fn top_height(&self) -> Option<u32> {
            if self.hashes.is_empty() {
                None
            } else {
                Some(self.hashes.len() as u32 - 1)
            }
        }
        fn hash_at(&self, height: u32) -> Option<BlockId> {
            self.hashes.get(height as usize).copied()
        }
        fn height_of(&self, hash: &BlockId) -> Option<u32> {
            self.hashes.iter().position(|h| h == hash).map(|i| i as u32)
        }
    }

    fn id(n: u8) -> BlockId {
        let mut out = [0u8; 32];
        out[0] = n;
        out
    }

    #[test]
    fn sparse_chain_always_ends_at_genesis() {
        let chain = FakeChain { hashes: (0..50).map(id).collect() };
        let ids = build_sparse_chain(&chain);
        assert_eq!(*ids.last().unwrap(), id(0));
        assert_eq!(ids[0], id(49));
    }

    #[test]
    fn empty_chain_has_no_sparse_ids() {
        let chain = FakeChain { hashes: Vec::new() };
        assert!(build_sparse_chain(&chain).is_empty());
    }

    #[test]
    fn reconcile_finds_common_ancestor_and_needed_ids() {
        let chain = FakeChain { hashes: (0..10).map(id).collect() };
        let entry = ResponseChainEntry { start_height: 5, total_height: 20, ids: vec![id(5), id(20), id(21)] };
        let reconciliation = reconcile_chain_entry(&chain, &entry).unwrap();
        assert_eq!(reconciliation.common_ancestor_height, 5);
        assert_eq!(reconciliation.needed_block_ids, vec![id(20), id(21)]);
        assert_eq!(reconciliation.peer_total_height, 20);
    }

    #[test]
    fn reconcile_rejects_an_unknown_first_id() {
        let chain = FakeChain { hashes: (0..10).map(id).collect() };
        let entry = ResponseChainEntry { start_height: 5, total_height: 20, ids: vec![id(99)] };
        assert!(reconcile_chain_entry(&chain, &entry).is_err());
    }

    #[test]
    fn reconcile_rejects_a_height_range_exceeding_claimed_total() {
        let chain = FakeChain { hashes: (0..10).map(id).collect() };
        let entry = ResponseChainEntry { start_height: 5, total_height: 6, ids: vec![id(5), id(6), id(7)] };
        assert!(reconcile_chain_entry(&chain, &entry).is_err());
    }

    #[test]
    fn batches_split_at_the_configured_count() {
        let ids: Vec<BlockId> = (0..300u32).map(|n| id((n % 256) as u8)).collect();
        let batches = batch_for_get_objects(&ids);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), BLOCKS_SYNCHRONIZING_DEFAULT_COUNT);
        assert_eq!(batches[2].len(), 300 - 2 * BLOCKS_SYNCHRONIZING_DEFAULT_COUNT);
    }
}
