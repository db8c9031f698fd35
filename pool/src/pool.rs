//! Transaction pool (§4.5): priority-ordered mempool with fusion-first
//! block template assembly, TTL expiry and recently-deleted suppression.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};

use parking_lot::ReentrantMutex;

use cryptonote_chain::{constants, extra, Amount, BlockchainCache, Input, Transaction};
use cryptonote_crypto::KeyImage;
use cryptonote_serial::io::Encode;

use crate::priority::PriorityKey;
use crate::types::{AddTxOutcome, BlockTemplate, PoolEntry, TxId};
use crate::Result;

fn payment_id_of(tx: &Transaction) -> Option<[u8; 32]> {
    extra::parse_extra(&tx.prefix.extra)
        .ok()
        .and_then(|fields| extra::find_payment_id(&fields))
}

fn key_images_of(tx: &Transaction) -> Vec<KeyImage> {
    tx.prefix
        .inputs
        .iter()
        .filter_map(|input| match input {
            Input::Key { key_image, .. } => Some(*key_image),
            _ => None,
        })
        .collect()
}

fn is_ready(entry: &PoolEntry, cache: &BlockchainCache) -> Result<bool> {
    for input in &entry.tx.prefix.inputs {
        if let Input::Key { key_image, .. } = input {
            if cache.check_if_spent(key_image)? {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

fn has_conflict(
    entry: &PoolEntry,
    used_images: &HashSet<KeyImage>,
    used_multisig: &HashSet<(Amount, u32)>,
) -> bool {
    entry.tx.prefix.inputs.iter().any(|input| match input {
        Input::Key { key_image, .. } => used_images.contains(key_image),
        Input::Multisig { amount, output_index, .. } => {
            used_multisig.contains(&(*amount, *output_index))
        }
        Input::Coinbase { .. } => false,
    })
}

fn record_inclusion(
    entry: &PoolEntry,
    id: TxId,
    included: &mut Vec<TxId>,
    used_images: &mut HashSet<KeyImage>,
    used_multisig: &mut HashSet<(Amount, u32)>,
    total_size: &mut usize,
    total_fee: &mut u64,
) {
    for input in &entry.tx.prefix.inputs {
        match input {
            Input::Key { key_image, .. } => {
                used_images.insert(*key_image);
            }
            Input::Multisig { amount, output_index, .. } => {
                used_multisig.insert((*amount, *output_index));
            }
            Input::Coinbase { .. } => {}
        }
    }
    included.push(id);
    *total_size += entry.blob_size;
    *total_fee = total_fee.saturating_add(entry.fee);
}

#[derive(Default)]
struct PoolState {
    entries: HashMap<TxId, PoolEntry>,
    priority: BTreeSet<PriorityKey>,
    by_payment_id: HashMap<[u8; 32], Vec<TxId>>,
    spent_key_images: HashMap<KeyImage, TxId>,
    recently_deleted: HashMap<TxId, u64>,
}

impl PoolState {
    fn insert(&mut self, id: TxId, entry: PoolEntry, key_images: &[KeyImage]) {
        let key = PriorityKey {
            fee: entry.fee,
            blob_size: entry.blob_size,
            receive_time: entry.receive_time,
            id,
        };
        self.priority.insert(key);
        for image in key_images {
            self.spent_key_images.insert(*image, id);
        }
        if let Some(payment_id) = payment_id_of(&entry.tx) {
            self.by_payment_id.entry(payment_id).or_default().push(id);
        }
        self.entries.insert(id, entry);
    }

    fn remove(&mut self, id: &TxId) -> Option<PoolEntry> {
        let entry = self.entries.remove(id)?;
        let key = PriorityKey {
            fee: entry.fee,
            blob_size: entry.blob_size,
            receive_time: entry.receive_time,
            id: *id,
        };
        self.priority.remove(&key);
        self.spent_key_images.retain(|_, owner| owner != id);
        if let Some(payment_id) = payment_id_of(&entry.tx) {
            if let Some(ids) = self.by_payment_id.get_mut(&payment_id) {
                ids.retain(|existing| existing != id);
            }
        }
        Some(entry)
    }
}

/// The mempool (§4.5): a single reentrant mutex guards every mutation
/// and read, matching the reference's single-recursive-mutex model (§5).
pub struct TransactionPool {
    state: ReentrantMutex<RefCell<PoolState>>,
}

impl Default for TransactionPool {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionPool {
    #[must_use]
    pub fn new() -> Self {
        TransactionPool {
            state: ReentrantMutex::new(RefCell::new(PoolState::default())),
        }
    }

    #[must_use]
    pub fn have_tx(&self, id: &TxId) -> bool {
        let guard = self.state.lock();
        guard.borrow().entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        let guard = self.state.lock();
        guard.borrow().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn transactions_by_payment_id(&self, payment_id: &[u8; 32]) -> Vec<TxId> {
        let guard = self.state.lock();
        guard.borrow().by_payment_id.get(payment_id).cloned().unwrap_or_default()
    }

    /// `addTx` (§4.5).
    pub fn add_tx(
        &self,
        tx: Transaction,
        kept_by_block: bool,
        receive_time: u64,
    ) -> Result<AddTxOutcome> {
        let id = tx.hash();
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        if state.recently_deleted.contains_key(&id) {
            return Ok(AddTxOutcome::default());
        }

        let supported_inputs = tx
            .prefix
            .inputs
            .iter()
            .all(|input| matches!(input, Input::Key { .. } | Input::Coinbase { .. }));
        if !supported_inputs || tx.prefix.sum_outputs() > tx.prefix.sum_inputs() {
            return Ok(AddTxOutcome { verification_failed: true, ..AddTxOutcome::default() });
        }

        let blob_size = tx.encode_to_vec().len();
        if blob_size > constants::CRYPTONOTE_MAX_TX_SIZE {
            return Ok(AddTxOutcome { verification_failed: true, ..AddTxOutcome::default() });
        }

        let fields = extra::parse_extra(&tx.prefix.extra)?;
        extra::validate_uniqueness(&fields)?;
        let ttl = extra::find_ttl(&fields);
        let fee = u64::try_from(tx.prefix.fee()).unwrap_or(u64::MAX);

        if let Some(ttl) = ttl {
            let too_far = receive_time
                .saturating_add(constants::CRYPTONOTE_MEMPOOL_TX_LIVETIME)
                .saturating_add(constants::CRYPTONOTE_BLOCK_FUTURE_TIME_LIMIT);
            if ttl < receive_time || ttl > too_far || fee != 0 {
                return Ok(AddTxOutcome { verification_failed: true, ..AddTxOutcome::default() });
            }
        }

        let key_images = key_images_of(&tx);
        if !kept_by_block {
            for image in &key_images {
                if state.spent_key_images.contains_key(image) {
                    return Ok(AddTxOutcome { verification_failed: true, ..AddTxOutcome::default() });
                }
            }
        }

        let should_relay = fee > 0 || tx.prefix.is_fusion_transaction() || ttl.is_some();

        let entry = PoolEntry {
            tx,
            blob_size,
            fee,
            kept_by_block,
            receive_time,
            max_used_block: None,
            last_failed_block: None,
            ttl,
        };
        state.insert(id, entry, &key_images);

        tracing::info!(id = %hex::encode(id), fee, blob_size, "added transaction to pool");
        Ok(AddTxOutcome { added_to_pool: true, should_relay, verification_failed: false })
    }

    /// `takeTx` (§4.5): atomically removes and returns.
    pub fn take_tx(&self, id: &TxId) -> Option<Transaction> {
        let guard = self.state.lock();
        guard.borrow_mut().remove(id).map(|entry| entry.tx)
    }

    /// `getDifference` (§4.5): diffs the pool's currently-ready
    /// transactions against the caller's known set.
    pub fn get_difference(
        &self,
        known_ids: &[TxId],
        cache: &BlockchainCache,
    ) -> Result<(Vec<TxId>, Vec<TxId>)> {
        let guard = self.state.lock();
        let state = guard.borrow();

        let mut ready = HashSet::new();
        for (id, entry) in &state.entries {
            if is_ready(entry, cache)? {
                ready.insert(*id);
            }
        }

        let known: HashSet<TxId> = known_ids.iter().copied().collect();
        let new_ids = ready.iter().copied().filter(|id| !known.contains(id)).collect();
        let deleted_ids = known_ids.iter().copied().filter(|id| !ready.contains(id)).collect();
        Ok((new_ids, deleted_ids))
    }

    /// `fillBlockTemplate` (§4.5): fusion transactions first, then
    /// fee-paying entries in priority order, respecting the block's
    /// internal double-spend guard.
    pub fn fill_block_template(
        &self,
        median_size: usize,
        max_cumulative_size: usize,
        cache: &BlockchainCache,
    ) -> Result<BlockTemplate> {
        let guard = self.state.lock();
        let state = guard.borrow();

        let mut included = Vec::new();
        let mut used_images = HashSet::new();
        let mut used_multisig = HashSet::new();
        let mut total_size = 0usize;
        let mut total_fee = 0u64;

        for key in state.priority.iter().filter(|key| key.fee == 0) {
            let entry = &state.entries[&key.id];
            if entry.blob_size > constants::FUSION_TX_MAX_SIZE {
                continue;
            }
            if has_conflict(entry, &used_images, &used_multisig) {
                continue;
            }
            if total_size + entry.blob_size > max_cumulative_size {
                continue;
            }
            if !is_ready(entry, cache)? {
                continue;
            }
            record_inclusion(
                entry,
                key.id,
                &mut included,
                &mut used_images,
                &mut used_multisig,
                &mut total_size,
                &mut total_fee,
            );
        }

        for key in state.priority.iter().filter(|key| key.fee > 0) {
            let entry = &state.entries[&key.id];
            if entry.ttl.is_some() {
                continue;
            }
            if has_conflict(entry, &used_images, &used_multisig) {
                continue;
            }
            let limit = if total_size < median_size {
                median_size
            } else {
                (median_size * 5 / 4)
                    .saturating_sub(constants::CRYPTONOTE_COINBASE_BLOB_RESERVED_SIZE)
            };
            if total_size + entry.blob_size > limit.min(max_cumulative_size) {
                continue;
            }
            if !is_ready(entry, cache)? {
                continue;
            }
            record_inclusion(
                entry,
                key.id,
                &mut included,
                &mut used_images,
                &mut used_multisig,
                &mut total_size,
                &mut total_fee,
            );
        }

        Ok(BlockTemplate { transactions: included, total_size, total_fee })
    }

    /// `onIdle` (§4.5): expires aged and TTL-past entries, moving them
    /// into the recently-deleted set for a further grace period.
    pub fn on_idle(&self, now: u64) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();

        let mut expired = Vec::new();
        for (id, entry) in &state.entries {
            let livetime = if entry.kept_by_block {
                constants::CRYPTONOTE_MEMPOOL_TX_FROM_ALT_BLOCK_LIVETIME
            } else {
                constants::CRYPTONOTE_MEMPOOL_TX_LIVETIME
            };
            let age = now.saturating_sub(entry.receive_time);
            let ttl_expired = entry.ttl.map_or(false, |ttl| now > ttl);
            if age > livetime || ttl_expired {
                expired.push(*id);
            }
        }

        let forget_after = constants::CRYPTONOTE_MEMPOOL_TX_LIVETIME
            * constants::CRYPTONOTE_NUMBER_OF_PERIODS_TO_FORGET_TX_DELETED_FROM_POOL;
        for id in expired {
            state.remove(&id);
            state.recently_deleted.insert(id, now + forget_after);
            tracing::info!(id = %hex::encode(id), "expired transaction from pool");
        }
        state.recently_deleted.retain(|_, expiry| *expiry > now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptonote_chain::{Output, TransactionPrefix, TxOutput};
    use cryptonote_crypto::PublicKey;
    use cryptonote_store::{Store, StoreConfig};

    fn temp_cache() -> (BlockchainCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(StoreConfig::new(dir.path())).unwrap();
        (BlockchainCache::new(store), dir)
    }

    fn key_tx(amount_in: u64, amount_out: u64, key_image: KeyImage) -> Transaction {
        Transaction {
            prefix: TransactionPrefix {
                version: 1,
                unlock_time: 0,
                inputs: vec![Input::Key {
                    amount: amount_in,
                    ring_offsets: vec![1],
                    key_image,
                }],
                outputs: vec![TxOutput {
                    amount: amount_out,
                    target: Output::Key { one_time_public_key: PublicKey::zero() },
                }],
                extra: vec![],
            },
            signatures: vec![vec![]],
        }
    }

    #[test]
    fn adding_then_taking_a_tx_returns_the_same_bytes() {
        let pool = TransactionPool::new();
        let tx = key_tx(100, 90, KeyImage::from_bytes([1u8; 32]));
        let id = tx.hash();
        let outcome = pool.add_tx(tx.clone(), false, 1_000).unwrap();
        assert!(outcome.added_to_pool);
        assert!(pool.have_tx(&id));

        let taken = pool.take_tx(&id).unwrap();
        assert_eq!(taken, tx);
        assert!(!pool.have_tx(&id));
    }

    #[test]
    fn double_spend_is_rejected_and_pool_is_unchanged() {
        let pool = TransactionPool::new();
        let image = KeyImage::from_bytes([2u8; 32]);
        let t1 = key_tx(100, 90, image);
        let t2 = key_tx(100, 95, image);

        let r1 = pool.add_tx(t1.clone(), false, 1_000).unwrap();
        assert!(r1.added_to_pool);

        let r2 = pool.add_tx(t2, false, 1_000).unwrap();
        assert!(r2.verification_failed);
        assert!(!r2.added_to_pool);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn fill_block_template_never_includes_conflicting_key_images() {
        let (cache, _dir) = temp_cache();
        let pool = TransactionPool::new();
        let image = KeyImage::from_bytes([3u8; 32]);
        // Same key image, kept_by_block bypasses the pool-side spend check
        // on the second insert so both land in the pool for this test.
        pool.add_tx(key_tx(100, 50, image), false, 1_000).unwrap();
        pool.add_tx(key_tx(100, 60, image), true, 1_000).unwrap();

        let template = pool.fill_block_template(100_000, 100_000, &cache).unwrap();
        assert_eq!(template.transactions.len(), 1);
    }

    #[test]
    fn on_idle_expires_past_ttl_transactions() {
        let pool = TransactionPool::new();
        let mut tx = key_tx(100, 100, KeyImage::from_bytes([4u8; 32]));
        tx.prefix.extra = {
            let mut extra = vec![cryptonote_chain::extra::TAG_TTL];
            extra.push(5); // varint(5): ttl at unix time 5
            extra
        };
        let id = tx.hash();
        let outcome = pool.add_tx(tx, false, 1).unwrap();
        assert!(outcome.added_to_pool);
        assert!(pool.have_tx(&id));

        pool.on_idle(10);
        assert!(!pool.have_tx(&id));
    }
}
