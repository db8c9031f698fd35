//! Cached indexing records kept alongside the canonical chain data (§3).

use cryptonote_crypto::{KeyImage, PublicKey};

pub type Height = u32;
pub type GlobalOutputIndex = u32;
pub type Amount = u64;

/// Locates an output within the chain by block/transaction/output
/// position, independent of its global per-amount index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedOutIndex {
    pub block_index: Height,
    pub transaction_index: u16,
    pub output_index: u16,
}

/// Everything needed to spend or validate spending of a key output,
/// keyed by `(amount, globalIndex)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyOutputInfo {
    pub public_key: PublicKey,
    pub transaction_hash: [u8; 32],
    pub unlock_time: u64,
    pub output_index: u16,
}

/// Per-indexed-block summary (§3 "Cached block info").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBlockInfo {
    pub hash: [u8; 32],
    pub timestamp: u64,
    pub cumulative_difficulty: u128,
    pub already_generated_coins: u64,
    pub already_generated_transactions: u64,
    pub block_size: usize,
}

/// Per-indexed-transaction summary (§3 "Cached transaction info").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedTransactionInfo {
    pub block_index: Height,
    pub transaction_index: u16,
    pub hash: [u8; 32],
    pub unlock_time: u64,
    /// `(amount, globalIndex)` pairs, one per key output, in output order.
    pub global_indexes: Vec<(Amount, GlobalOutputIndex)>,
    /// The payment id this transaction's `extra` carried, if any, kept so
    /// `split` can undo the payment-id index entry without re-decoding
    /// the raw transaction.
    pub payment_id: Option<[u8; 32]>,
}

/// The set of key images a candidate block's transactions spend, checked
/// for internal duplicates and against the cache's spent set before the
/// block is pushed (§4.4 `pushBlock` preconditions).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidatorState {
    pub spent_key_images: Vec<KeyImage>,
}

impl ValidatorState {
    #[must_use]
    pub fn contains(&self, image: &KeyImage) -> bool {
        self.spent_key_images.iter().any(|i| i == image)
    }

    /// `true` if `image` appears more than once within this validator
    /// state (a block trying to double-spend against itself).
    #[must_use]
    pub fn has_internal_duplicate(&self, image: &KeyImage) -> bool {
        self.spent_key_images.iter().filter(|i| *i == image).count() > 1
    }
}

/// Everything `split` needs to restore a popped block (§4.4).
#[derive(Debug, Clone)]
pub struct PushedBlockInfo {
    pub raw_block: Vec<u8>,
    pub validator_state: ValidatorState,
    pub block_size: usize,
    pub generated_coins: u64,
    pub block_difficulty: u64,
    pub cached_transactions: Vec<CachedTransactionInfo>,
}
