//! Pool-local record types (§4.5).

use cryptonote_chain::{Height, Transaction};

pub type TxId = [u8; 32];

/// Per-transaction bookkeeping the pool keeps alongside the transaction
/// itself (`addTx`'s postcondition in §4.5).
#[derive(Debug, Clone)]
pub struct PoolEntry {
    pub tx: Transaction,
    pub blob_size: usize,
    pub fee: u64,
    pub kept_by_block: bool,
    pub receive_time: u64,
    pub max_used_block: Option<Height>,
    pub last_failed_block: Option<Height>,
    pub ttl: Option<u64>,
}

/// Result of `addTx`: whether the transaction entered the pool, whether
/// it should be relayed, and whether verification failed outright.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddTxOutcome {
    pub added_to_pool: bool,
    pub should_relay: bool,
    pub verification_failed: bool,
}

/// Result of `fillBlockTemplate`.
#[derive(Debug, Clone, Default)]
pub struct BlockTemplate {
    pub transactions: Vec<TxId>,
    pub total_size: usize,
    pub total_fee: u64,
}
