//! The seam between the protocol handler and the blockchain/pool state
//! it drives, mirroring the reference implementation's `ICore`
//! interface: the handler only ever calls through this trait, never
//! touching [`BlockchainCache`]/[`TransactionPool`] directly.

use std::sync::{Arc, Mutex};

use cryptonote_chain::{AddBlockResult, BlockchainCache};
use cryptonote_pool::TransactionPool;
use cryptonote_serial::io::{decode_complete, Encode};

use crate::commands::{BlockId, RawBlock, TxId};
use crate::error::Result;
use crate::sync::ChainView;

pub trait Core: Send + Sync {
    fn top_height(&self) -> u32;
    fn top_block_hash(&self) -> BlockId;
    fn block_hash_at(&self, height: u32) -> Option<BlockId>;
    fn height_of(&self, id: &BlockId) -> Option<u32>;

    /// Fetches raw blocks (with their transactions) by id, returning
    /// `(found, missed)`.
    fn get_blocks(&self, ids: &[BlockId]) -> (Vec<RawBlock>, Vec<BlockId>);

    /// Decodes, validates and applies one block received from a peer.
    fn add_block(&self, block: RawBlock) -> Result<AddBlockResult>;

    /// Hands a gossiped or relayed transaction blob to the pool.
    /// Returns `true` if it was newly accepted.
    fn add_transaction_to_pool(&self, raw_tx: &[u8]) -> Result<bool>;

    /// Diffs the pool's ready set against `known_ids`, returning
    /// `(new_tx_blobs, deleted_ids)`.
    fn get_pool_changes(&self, known_ids: &[TxId]) -> Result<(Vec<Vec<u8>>, Vec<TxId>)>;

    /// Fetches transaction blobs by id, returning `(found, missed)`.
    fn get_transactions(&self, ids: &[TxId]) -> (Vec<Vec<u8>>, Vec<TxId>);

    fn pool_transaction_hashes(&self) -> Vec<TxId>;
}

/// The concrete [`Core`] the node binary wires up: a shared blockchain
/// cache (the store itself serializes concurrent access, but mutation
/// methods like `push_block`/`split` need `&mut`, hence the mutex) and
/// a transaction pool, which is already internally synchronized.
pub struct NodeCore {
    chain: Arc<Mutex<BlockchainCache>>,
    pool: Arc<TransactionPool>,
}

impl NodeCore {
    #[must_use]
    pub fn new(chain: Arc<Mutex<BlockchainCache>>, pool: Arc<TransactionPool>) -> Self {
        NodeCore { chain, pool }
    }
}

impl Core for NodeCore {
    fn top_height(&self) -> u32 {
        self.chain.lock().unwrap().top_index().map_or(0, |h| h + 1)
    }

    fn top_block_hash(&self) -> BlockId {
        self.chain.lock().unwrap().top_hash()
    }

    fn block_hash_at(&self, height: u32) -> Option<BlockId> {
        self.chain.lock().unwrap().cached_block_info(height).ok().flatten().map(|info| info.hash)
    }

    fn height_of(&self, id: &BlockId) -> Option<u32> {
        self.chain.lock().unwrap().height_by_hash(id).ok().flatten()
    }

    fn get_blocks(&self, ids: &[BlockId]) -> (Vec<RawBlock>, Vec<BlockId>) {
        let chain = self.chain.lock().unwrap();
        let mut found = Vec::new();
        let mut missed = Vec::new();
        for id in ids {
            let Some(height) = chain.height_by_hash(id).ok().flatten() else {
                missed.push(*id);
                continue;
            };
            match chain.raw_block_at(height).ok().flatten() {
                Some(raw_block) => {
                    let transactions = chain.raw_transactions_at(height).unwrap_or_default();
                    found.push(RawBlock { block: raw_block, transactions });
                }
                None => missed.push(*id),
            }
        }
        (found, missed)
    }

    fn add_block(&self, block: RawBlock) -> Result<AddBlockResult> {
        let mut chain = self.chain.lock().unwrap();
        Ok(chain.add_raw_block(block.block, block.transactions)?)
    }

    fn add_transaction_to_pool(&self, raw_tx: &[u8]) -> Result<bool> {
        let tx: cryptonote_chain::Transaction = decode_complete(raw_tx).map_err(cryptonote_chain::ChainError::from)?;
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let outcome = self.pool.add_tx(tx, false, now)?;
        Ok(outcome.added_to_pool)
    }

    fn get_pool_changes(&self, known_ids: &[TxId]) -> Result<(Vec<Vec<u8>>, Vec<TxId>)> {
        let chain = self.chain.lock().unwrap();
        let (new_ids, deleted_ids) = self.pool.get_difference(known_ids, &chain)?;
        drop(chain);
        let mut new_blobs = Vec::with_capacity(new_ids.len());
        for id in new_ids {
            if let Some(tx) = self.pool.take_tx(&id) {
                new_blobs.push(tx.encode_to_vec());
                let _ = self.pool.add_tx(tx, true, 0);
            }
        }
        Ok((new_blobs, deleted_ids))
    }

    fn get_transactions(&self, ids: &[TxId]) -> (Vec<Vec<u8>>, Vec<TxId>) {
        let mut found = Vec::new();
        let mut missed = Vec::new();
        for id in ids {
            match self.pool.take_tx(id) {
                Some(tx) => {
                    found.push(tx.encode_to_vec());
                    let _ = self.pool.add_tx(tx, true, 0);
                }
                None => missed.push(*id),
            }
        }
        (found, missed)
    }

    fn pool_transaction_hashes(&self) -> Vec<TxId> {
        let chain = self.chain.lock().unwrap();
        self.pool.get_difference(&[], &chain).map(|(new_ids, _)| new_ids).unwrap_or_default()
    }
}

/// Adapts [`Core`] to the narrower view [`crate::sync`] needs, so the
/// sparse-chain and chain-entry-reconciliation logic stays decoupled
/// from the rest of the protocol handler's surface.
pub struct CoreChainView<'a>(pub &'a dyn Core);

impl ChainView for CoreChainView<'_> {
    fn top_height(&self) -> Option<u32> {
        let current_height = self.0.top_height();
        if current_height == 0 {
            None
        } else {
            Some(current_height - 1)
        }
    }

    fn hash_at(&self, height: u32) -> Option<BlockId> {
        self.0.block_hash_at(height)
    }

    fn height_of(&self, hash: &BlockId) -> Option<u32> {
        self.0.height_of(hash)
    }
}
