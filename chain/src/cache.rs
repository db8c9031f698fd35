//! The blockchain cache (§3, §4.4): canonical chain state, UTXO indexes,
//! difficulty/emission accounting, and the reorg/upgrade state machines,
//! all backed by one [`Store`].

use std::collections::VecDeque;

use cryptonote_crypto::KeyImage;
use cryptonote_serial::io::{
    decode_complete, read_container, read_fixed_bytes, read_varint_bytes, write_container,
    write_varint_bytes, Decode, Encode,
};
use cryptonote_serial::varint::{read_varint, write_varint};
use cryptonote_store::{ReadBatch, Store, WriteBatch};

use crate::block::Block;
use crate::constants::{
    CRYPTONOTE_LOCKED_TX_ALLOWED_DELTA_BLOCKS, CRYPTONOTE_LOCKED_TX_ALLOWED_DELTA_SECONDS,
    CRYPTONOTE_MINED_MONEY_UNLOCK_WINDOW, DIFFICULTY_BLOCKS_COUNT, INPUT_BLOCKTIME_VALIDATION_HEIGHT,
    MAX_BLOCK_HEIGHT_MARKER, UNITS_CACHE_CAPACITY,
};
use crate::difficulty::next_difficulty;
use crate::error::{ChainError, Result};
use crate::extra;
use crate::observers::Observers;
use crate::transaction::Transaction;
use crate::types::{
    Amount, CachedBlockInfo, CachedTransactionInfo, Height, KeyOutputInfo, PushedBlockInfo, ValidatorState,
};
use crate::upgrade::{BlockVersionSource, UpgradeDetector};
use crate::utxo::UtxoIndex;

const COLUMN_CACHED_BLOCK_INFO: &str = "cached_block_info";
const COLUMN_RAW_BLOCKS: &str = "raw_blocks";
const COLUMN_PUSHED_BLOCK_INFO: &str = "pushed_block_info";
const COLUMN_BLOCK_VERSIONS: &str = "block_versions";
const COLUMN_HASH_TO_HEIGHT: &str = "hash_to_height";
const COLUMN_RAW_TRANSACTIONS: &str = "raw_transactions";
const COLUMN_META: &str = "chain_meta";
const META_TOP_INDEX: &[u8] = b"top_index";

fn encode_blob_list(blobs: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    write_varint(&mut out, blobs.len() as u64);
    for blob in blobs {
        write_varint_bytes(&mut out, blob);
    }
    out
}

fn decode_blob_list(bytes: &[u8]) -> cryptonote_serial::Result<Vec<Vec<u8>>> {
    let mut cursor = 0usize;
    let count = read_varint(bytes, &mut cursor)?;
    let mut out = Vec::with_capacity(count.min(4096) as usize);
    for _ in 0..count {
        out.push(read_varint_bytes(bytes, &mut cursor, 64 * 1024 * 1024)?);
    }
    Ok(out)
}

impl Encode for CachedBlockInfo {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.hash);
        write_varint(out, self.timestamp);
        out.extend_from_slice(&self.cumulative_difficulty.to_le_bytes());
        write_varint(out, self.already_generated_coins);
        write_varint(out, self.already_generated_transactions);
        write_varint(out, self.block_size as u64);
    }
}

impl Decode for CachedBlockInfo {
    fn decode(bytes: &[u8], cursor: &mut usize) -> cryptonote_serial::Result<Self> {
        let hash = read_fixed_bytes(bytes, cursor)?;
        let timestamp = read_varint(bytes, cursor)?;
        let cumulative_difficulty = u128::from_le_bytes(read_fixed_bytes(bytes, cursor)?);
        let already_generated_coins = read_varint(bytes, cursor)?;
        let already_generated_transactions = read_varint(bytes, cursor)?;
        let block_size = read_varint(bytes, cursor)? as usize;
        Ok(CachedBlockInfo {
            hash,
            timestamp,
            cumulative_difficulty,
            already_generated_coins,
            already_generated_transactions,
            block_size,
        })
    }
}

impl Encode for CachedTransactionInfo {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, u64::from(self.block_index));
        write_varint(out, u64::from(self.transaction_index));
        out.extend_from_slice(&self.hash);
        write_varint(out, self.unlock_time);
        write_varint(out, self.global_indexes.len() as u64);
        for (amount, global_index) in &self.global_indexes {
            write_varint(out, *amount);
            write_varint(out, u64::from(*global_index));
        }
        match self.payment_id {
            Some(id) => {
                out.push(1);
                out.extend_from_slice(&id);
            }
            None => out.push(0),
        }
    }
}

impl Decode for CachedTransactionInfo {
    fn decode(bytes: &[u8], cursor: &mut usize) -> cryptonote_serial::Result<Self> {
        let block_index = read_varint(bytes, cursor)? as u32;
        let transaction_index = read_varint(bytes, cursor)? as u16;
        let hash = read_fixed_bytes(bytes, cursor)?;
        let unlock_time = read_varint(bytes, cursor)?;
        let count = read_varint(bytes, cursor)?;
        let mut global_indexes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let amount = read_varint(bytes, cursor)?;
            let global_index = read_varint(bytes, cursor)? as u32;
            global_indexes.push((amount, global_index));
        }
        let has_payment_id = cryptonote_serial::io::read_tag(bytes, cursor)?;
        let payment_id = if has_payment_id != 0 {
            Some(read_fixed_bytes(bytes, cursor)?)
        } else {
            None
        };
        Ok(CachedTransactionInfo {
            block_index,
            transaction_index,
            hash,
            unlock_time,
            global_indexes,
            payment_id,
        })
    }
}

impl Encode for ValidatorState {
    fn encode(&self, out: &mut Vec<u8>) {
        write_container(out, &self.spent_key_images);
    }
}

impl Decode for ValidatorState {
    fn decode(bytes: &[u8], cursor: &mut usize) -> cryptonote_serial::Result<Self> {
        let spent_key_images = read_container(bytes, cursor, 64 * 1024)?;
        Ok(ValidatorState { spent_key_images })
    }
}

impl Encode for PushedBlockInfo {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint_bytes(out, &self.raw_block);
        self.validator_state.encode(out);
        write_varint(out, self.block_size as u64);
        write_varint(out, self.generated_coins);
        write_varint(out, self.block_difficulty);
        write_container(out, &self.cached_transactions);
    }
}

impl Decode for PushedBlockInfo {
    fn decode(bytes: &[u8], cursor: &mut usize) -> cryptonote_serial::Result<Self> {
        let raw_block = read_varint_bytes(bytes, cursor, 64 * 1024 * 1024)?;
        let validator_state = ValidatorState::decode(bytes, cursor)?;
        let block_size = read_varint(bytes, cursor)? as usize;
        let generated_coins = read_varint(bytes, cursor)?;
        let block_difficulty = read_varint(bytes, cursor)?;
        let cached_transactions = read_container(bytes, cursor, 64 * 1024)?;
        Ok(PushedBlockInfo {
            raw_block,
            validator_state,
            block_size,
            generated_coins,
            block_difficulty,
            cached_transactions,
        })
    }
}

fn height_key(height: Height) -> Vec<u8> {
    height.to_be_bytes().to_vec()
}

/// Blanket input to `push_block`: the new block, its non-coinbase
/// transactions (for payment-id extraction), the flattened key outputs
/// created across every transaction (coinbase included) in the same
/// order as `cached_transactions`' `global_indexes`, and the accounting
/// the caller already computed while validating the block.
pub struct PushBlockArgs<'a> {
    pub block: &'a Block,
    pub transactions: &'a [Transaction],
    pub cached_transactions: Vec<CachedTransactionInfo>,
    pub key_outputs: Vec<(Amount, KeyOutputInfo)>,
    pub validator_state: ValidatorState,
    pub block_size: usize,
    pub generated_coins: u64,
    pub block_difficulty: u64,
    pub raw_block: Vec<u8>,
    /// Raw encoded bytes of `transactions`, in the same order, kept
    /// alongside the block so a later sync request can replay the full
    /// `RawBlock` (block + transactions) to another peer.
    pub raw_transactions: Vec<Vec<u8>>,
}

pub struct BlockchainCache {
    store: Store,
    observers: Observers,
    units_cache: VecDeque<CachedBlockInfo>,
    top_index: Option<Height>,
}

impl BlockVersionSource for BlockchainCache {
    fn chain_size(&self) -> u32 {
        self.top_index.map_or(0, |h| h + 1)
    }

    fn version_at(&self, height: Height) -> (u8, u8) {
        self.block_version_at(height).unwrap_or((0, 0))
    }
}

impl BlockchainCache {
    #[must_use]
    pub fn new(store: Store) -> Self {
        let top_index = Self::read_top_index(&store).ok().flatten();
        BlockchainCache {
            store,
            observers: Observers::new(),
            units_cache: VecDeque::with_capacity(UNITS_CACHE_CAPACITY),
            top_index,
        }
    }

    #[must_use]
    pub fn observers_mut(&mut self) -> &mut Observers {
        &mut self.observers
    }

    fn read_top_index(store: &Store) -> Result<Option<Height>> {
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_META, META_TOP_INDEX.to_vec());
        let result = store.read(batch)?;
        Ok(result.get(0).map(|bytes| u32::from_be_bytes(bytes.try_into().unwrap_or_default())))
    }

    #[must_use]
    pub fn top_index(&self) -> Option<Height> {
        self.top_index
    }

    #[must_use]
    pub fn top_hash(&self) -> [u8; 32] {
        self.top_index
            .and_then(|height| self.cached_block_info(height).ok().flatten())
            .map(|info| info.hash)
            .unwrap_or([0u8; 32])
    }

    pub fn cached_block_info(&self, height: Height) -> Result<Option<CachedBlockInfo>> {
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_CACHED_BLOCK_INFO, height_key(height));
        let result = self.store.read(batch)?;
        result
            .get(0)
            .map(|bytes| decode_complete(bytes).map_err(ChainError::from))
            .transpose()
    }

    fn block_version_at(&self, height: Height) -> Option<(u8, u8)> {
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_BLOCK_VERSIONS, height_key(height));
        let result = self.store.read(batch).ok()?;
        result.get(0).map(|bytes| (bytes[0], bytes[1]))
    }

    /// `pushBlock` (§4.4): total-or-nothing — every index update lands in
    /// one write batch, so a failure midway leaves the store untouched.
    pub fn push_block(&mut self, args: PushBlockArgs<'_>) -> Result<()> {
        if args.block.header.previous_block_hash != self.top_hash() {
            return Err(ChainError::InvalidPrevHash);
        }

        let new_height = self.top_index.map_or(0, |h| h + 1);
        let utxo = UtxoIndex::new(&self.store);

        for image in &args.validator_state.spent_key_images {
            if args.validator_state.has_internal_duplicate(image) || utxo.is_spent(image)? {
                return Err(ChainError::DoubleSpend);
            }
        }

        let mut batch = WriteBatch::new();
        let mut cached_transactions = args.cached_transactions;

        let mut outputs_cursor = 0usize;
        for info in &cached_transactions {
            let slice = &args.key_outputs[outputs_cursor..outputs_cursor + info.global_indexes.len()];
            utxo.index_transaction_outputs(&mut batch, info, slice)?;
            outputs_cursor += info.global_indexes.len();
        }
        utxo.index_spent_key_images(&mut batch, new_height, &args.validator_state.spent_key_images);
        utxo.index_block_timestamp(&mut batch, new_height, args.block.header.timestamp)?;

        for tx in std::iter::once(&args.block.base_transaction).chain(args.transactions.iter()) {
            let fields = extra::parse_extra(&tx.prefix.extra)?;
            extra::validate_uniqueness(&fields)?;
            let Some(payment_id) = extra::find_payment_id(&fields) else {
                continue;
            };
            if let Some(info) = cached_transactions.iter_mut().find(|info| info.hash == tx.hash()) {
                info.payment_id = Some(payment_id);
                utxo.index_payment_id(&mut batch, &payment_id, info);
            }
        }

        let previous = self
            .top_index
            .and_then(|h| self.cached_block_info(h).ok().flatten());
        let already_generated_coins = previous
            .as_ref()
            .map_or(0, |p| p.already_generated_coins)
            .saturating_add(args.generated_coins);
        let already_generated_transactions = previous
            .as_ref()
            .map_or(0, |p| p.already_generated_transactions)
            .saturating_add(cached_transactions.len() as u64 + 1);
        let cumulative_difficulty = previous
            .as_ref()
            .map_or(0u128, |p| p.cumulative_difficulty)
            .saturating_add(u128::from(args.block_difficulty));

        let block_info = CachedBlockInfo {
            hash: args.block.hash(),
            timestamp: args.block.header.timestamp,
            cumulative_difficulty,
            already_generated_coins,
            already_generated_transactions,
            block_size: args.block_size,
        };
        batch.put(COLUMN_CACHED_BLOCK_INFO, height_key(new_height), block_info.encode_to_vec());
        batch.put(COLUMN_HASH_TO_HEIGHT, block_info.hash.to_vec(), height_key(new_height));
        batch.put(COLUMN_RAW_BLOCKS, height_key(new_height), args.raw_block.clone());
        batch.put(COLUMN_RAW_TRANSACTIONS, height_key(new_height), encode_blob_list(&args.raw_transactions));
        batch.put(
            COLUMN_BLOCK_VERSIONS,
            height_key(new_height),
            vec![args.block.header.major_version, args.block.header.minor_version],
        );

        let record = PushedBlockInfo {
            raw_block: args.raw_block,
            validator_state: args.validator_state,
            block_size: args.block_size,
            generated_coins: args.generated_coins,
            block_difficulty: args.block_difficulty,
            cached_transactions,
        };
        batch.put(COLUMN_PUSHED_BLOCK_INFO, height_key(new_height), record.encode_to_vec());
        batch.put(COLUMN_META, META_TOP_INDEX.to_vec(), new_height.to_be_bytes().to_vec());

        self.store.write(batch)?;

        self.top_index = Some(new_height);
        self.units_cache.push_back(block_info);
        if self.units_cache.len() > UNITS_CACHE_CAPACITY {
            self.units_cache.pop_front();
        }

        tracing::info!(height = new_height, hash = %hex::encode(args.block.hash()), "pushed block");
        self.observers.fire_blockchain_updated(new_height);
        Ok(())
    }

    /// `split(splitHeight)` (§4.4): pops `[splitHeight, topIndex]` off the
    /// tail in descending order, undoing each block's spent-image, output,
    /// payment-id and timestamp-bucket index contributions, and returns
    /// the popped blocks (caller re-applies an alternative suffix via
    /// `push_block`).
    pub fn split(&mut self, split_height: Height) -> Result<Vec<PoppedBlock>> {
        let top = self.top_index.ok_or(ChainError::InvalidSplitHeight(split_height))?;
        if split_height > top {
            return Err(ChainError::InvalidSplitHeight(split_height));
        }

        let utxo = UtxoIndex::new(&self.store);
        let mut popped = Vec::new();

        let mut height = top;
        loop {
            let record = self.read_pushed_block_record(height)?.ok_or(ChainError::Inconsistent(
                format!("missing pushed-block record at height {height}"),
            ))?;
            let cached_info = self
                .cached_block_info(height)?
                .ok_or(ChainError::Inconsistent(format!("missing cached block info at height {height}")))?;
            let block_hash = cached_info.hash;

            let mut batch = WriteBatch::new();
            utxo.unindex_spent_key_images(&mut batch, &record.validator_state.spent_key_images);
            utxo.unindex_block_timestamp(&mut batch, height, cached_info.timestamp)?;
            for info in &record.cached_transactions {
                utxo.unindex_transaction_outputs(&mut batch, info)?;
                if let Some(payment_id) = &info.payment_id {
                    utxo.unindex_payment_id(&mut batch, payment_id, info);
                }
            }
            batch.delete(COLUMN_CACHED_BLOCK_INFO, height_key(height));
            batch.delete(COLUMN_HASH_TO_HEIGHT, block_hash.to_vec());
            batch.delete(COLUMN_RAW_BLOCKS, height_key(height));
            batch.delete(COLUMN_RAW_TRANSACTIONS, height_key(height));
            batch.delete(COLUMN_PUSHED_BLOCK_INFO, height_key(height));
            batch.delete(COLUMN_BLOCK_VERSIONS, height_key(height));

            let new_top = if height == 0 { None } else { Some(height - 1) };
            match new_top {
                Some(h) => batch.put(COLUMN_META, META_TOP_INDEX.to_vec(), h.to_be_bytes().to_vec()),
                None => batch.delete(COLUMN_META, META_TOP_INDEX.to_vec()),
            }

            self.store.write(batch)?;
            self.top_index = new_top;
            self.units_cache.retain(|info| info.hash != block_hash);

            popped.push(PoppedBlock { height, info: record });

            tracing::warn!(height, "popped block during split");

            if height == split_height {
                break;
            }
            height -= 1;
        }

        self.observers.fire_blockchain_updated(self.top_index.unwrap_or(0));
        Ok(popped)
    }

    fn read_pushed_block_record(&self, height: Height) -> Result<Option<PushedBlockInfo>> {
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_PUSHED_BLOCK_INFO, height_key(height));
        let result = self.store.read(batch)?;
        result
            .get(0)
            .map(|bytes| decode_complete(bytes).map_err(ChainError::from))
            .transpose()
    }

    #[must_use]
    pub fn check_if_spent(&self, image: &KeyImage) -> Result<bool> {
        UtxoIndex::new(&self.store).is_spent(image)
    }

    /// Looks up the height of a block by its hash, for common-ancestor
    /// resolution during chain sync (§4.6).
    pub fn height_by_hash(&self, hash: &[u8; 32]) -> Result<Option<Height>> {
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_HASH_TO_HEIGHT, hash.to_vec());
        let result = self.store.read(batch)?;
        Ok(result.get(0).map(|bytes| u32::from_be_bytes(bytes.try_into().unwrap_or_default())))
    }

    /// Fetches the raw encoded block stored at a height, for serving
    /// `RESPONSE_GET_OBJECTS` to a syncing peer.
    pub fn raw_block_at(&self, height: Height) -> Result<Option<Vec<u8>>> {
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_RAW_BLOCKS, height_key(height));
        let result = self.store.read(batch)?;
        Ok(result.get(0).map(<[u8]>::to_vec))
    }

    /// Fetches the raw encoded transaction blobs stored alongside the
    /// block at `height`, in the same order as the block's transaction
    /// hash list, for replaying a full `RawBlock` to a syncing peer.
    pub fn raw_transactions_at(&self, height: Height) -> Result<Vec<Vec<u8>>> {
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_RAW_TRANSACTIONS, height_key(height));
        let result = self.store.read(batch)?;
        match result.get(0) {
            Some(bytes) => Ok(decode_blob_list(bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Decodes a block and its transactions as received from a peer,
    /// assembles the accounting `push_block` expects, and applies it.
    /// Mirrors the reference core's `addBlock(RawBlock)`: structural and
    /// double-spend checks are enforced, but proof-of-work difficulty is
    /// taken from this cache's own windowed estimate rather than
    /// re-verified bit-for-bit against a mined nonce (§9 open question).
    pub fn add_raw_block(&mut self, raw_block: Vec<u8>, raw_tx_blobs: Vec<Vec<u8>>) -> Result<AddBlockResult> {
        let block: Block = decode_complete(&raw_block)?;
        let hash = block.hash();
        if self.height_by_hash(&hash)?.is_some() {
            return Ok(AddBlockResult::AlreadyExists);
        }
        if block.header.previous_block_hash != self.top_hash() {
            return Ok(AddBlockResult::Orphan);
        }
        if raw_tx_blobs.len() != block.transaction_hashes.len() {
            return Err(ChainError::Inconsistent("transaction count does not match the block's commitment".into()));
        }

        let mut transactions = Vec::with_capacity(raw_tx_blobs.len());
        for (blob, expected_hash) in raw_tx_blobs.iter().zip(&block.transaction_hashes) {
            let tx: Transaction = decode_complete(blob)?;
            if &tx.hash() != expected_hash {
                return Err(ChainError::Inconsistent("transaction hash does not match the block's commitment".into()));
            }
            transactions.push(tx);
        }

        let new_height = self.top_index.map_or(0, |h| h + 1);
        let mut cached_transactions = Vec::with_capacity(transactions.len() + 1);
        let mut key_outputs = Vec::new();
        let mut spent_key_images = Vec::new();
        let mut next_global_index: std::collections::HashMap<Amount, u32> = std::collections::HashMap::new();

        {
            let utxo = UtxoIndex::new(&self.store);
            let all_txs = std::iter::once(&block.base_transaction).chain(transactions.iter());
            for (tx_index, tx) in all_txs.enumerate() {
                let mut global_indexes = Vec::with_capacity(tx.prefix.outputs.len());
                for output in &tx.prefix.outputs {
                    let crate::transaction::Output::Key { one_time_public_key } = &output.target else {
                        continue;
                    };
                    let next = match next_global_index.get(&output.amount) {
                        Some(n) => *n,
                        None => utxo.output_count(output.amount)?,
                    };
                    next_global_index.insert(output.amount, next + 1);
                    global_indexes.push((output.amount, next));
                    key_outputs.push((
                        output.amount,
                        KeyOutputInfo {
                            public_key: *one_time_public_key,
                            transaction_hash: tx.hash(),
                            unlock_time: tx.prefix.unlock_time,
                            output_index: global_indexes.len() as u16 - 1,
                        },
                    ));
                }
                for input in &tx.prefix.inputs {
                    if let crate::transaction::Input::Key { key_image, .. } = input {
                        spent_key_images.push(*key_image);
                    }
                }
                cached_transactions.push(CachedTransactionInfo {
                    block_index: new_height,
                    transaction_index: tx_index as u16,
                    hash: tx.hash(),
                    unlock_time: tx.prefix.unlock_time,
                    global_indexes,
                    payment_id: None,
                });
            }
        }

        let generated_coins = u64::try_from(block.base_transaction.prefix.sum_outputs()).unwrap_or(u64::MAX);
        let block_difficulty = u64::try_from(self.get_difficulty_for_next_block()?).unwrap_or(u64::MAX);
        let block_size = raw_block.len() + raw_tx_blobs.iter().map(Vec::len).sum::<usize>();

        let args = PushBlockArgs {
            block: &block,
            transactions: &transactions,
            cached_transactions,
            key_outputs,
            validator_state: ValidatorState { spent_key_images },
            block_size,
            generated_coins,
            block_difficulty,
            raw_block,
            raw_transactions: raw_tx_blobs,
        };
        self.push_block(args)?;
        Ok(AddBlockResult::Added)
    }

    /// `isTransactionSpendTimeUnlocked` (§4.4).
    #[must_use]
    pub fn is_transaction_spend_time_unlocked(&self, unlock_time: u64, height: Height) -> bool {
        if unlock_time < MAX_BLOCK_HEIGHT_MARKER {
            return height + u32::try_from(CRYPTONOTE_LOCKED_TX_ALLOWED_DELTA_BLOCKS).unwrap_or(0)
                >= unlock_time as u32;
        }
        let reference_time = if height >= INPUT_BLOCKTIME_VALIDATION_HEIGHT {
            self.cached_block_info(height)
                .ok()
                .flatten()
                .map_or(0, |info| info.timestamp)
        } else {
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        };
        reference_time + CRYPTONOTE_LOCKED_TX_ALLOWED_DELTA_SECONDS >= unlock_time
    }

    /// `getBlockHeightForTimestamp` (§4.4).
    pub fn get_block_height_for_timestamp(&self, timestamp: u64) -> Result<Option<Height>> {
        UtxoIndex::new(&self.store).block_height_for_timestamp(timestamp)
    }

    /// `getDifficultyForNextBlock` (§4.4): feeds the last
    /// `DIFFICULTY_BLOCKS_COUNT` timestamps/cumulative-difficulties
    /// (genesis excluded) into the windowed average.
    pub fn get_difficulty_for_next_block(&self) -> Result<u128> {
        let Some(top) = self.top_index else {
            return Ok(1);
        };
        let window_start = top.saturating_sub(DIFFICULTY_BLOCKS_COUNT as u32 - 1).max(1);
        let mut timestamps = Vec::new();
        let mut cumulative_difficulties = Vec::new();
        for height in window_start..=top {
            if let Some(info) = self.cached_block_info(height)? {
                timestamps.push(info.timestamp);
                cumulative_difficulties.push(info.cumulative_difficulty);
            }
        }
        Ok(next_difficulty(&timestamps, &cumulative_difficulties))
    }

    /// `extractKeyOutputs` (§4.4): loads each requested `(amount,
    /// globalIndex)`'s `KeyOutputInfo` and hands it to `visitor`, stopping
    /// at the first non-`Ok` result it returns.
    pub fn extract_key_outputs<V>(
        &self,
        amount: Amount,
        global_indexes: &[u32],
        mut visitor: V,
    ) -> Result<()>
    where
        V: FnMut(&KeyOutputInfo, u32) -> Result<()>,
    {
        let utxo = UtxoIndex::new(&self.store);
        for &global_index in global_indexes {
            let info = utxo
                .key_output_info(amount, global_index)?
                .ok_or_else(|| ChainError::Inconsistent(format!("missing output {amount}:{global_index}")))?;
            visitor(&info, global_index)?;
        }
        Ok(())
    }

    /// `getRandomOutsByAmount` (§4.4): a streaming shuffle over `[0,
    /// outputsCountForAmount)`, filtering out locked/too-young outputs,
    /// stopping once `count` distinct indexes are collected or the
    /// shuffle is exhausted.
    pub fn get_random_outs_by_amount(
        &self,
        amount: Amount,
        count: usize,
        block_index: Height,
        rng: &mut impl rand::RngCore,
    ) -> Result<Vec<u32>> {
        let utxo = UtxoIndex::new(&self.store);
        let total = utxo.output_count(amount)?;
        let mut candidates: Vec<u32> = (0..total).collect();
        // Fisher-Yates, consumed lazily: shuffle then take until satisfied.
        for i in (1..candidates.len()).rev() {
            let j = (rng.next_u32() as usize) % (i + 1);
            candidates.swap(i, j);
        }

        let mut selected = Vec::with_capacity(count);
        for global_index in candidates {
            if selected.len() >= count {
                break;
            }
            let Some(packed) = utxo.packed_out_index(amount, global_index)? else {
                continue;
            };
            if block_index.saturating_sub(packed.block_index) < CRYPTONOTE_MINED_MONEY_UNLOCK_WINDOW {
                continue;
            }
            let Some(info) = utxo.key_output_info(amount, global_index)? else {
                continue;
            };
            if !self.is_transaction_spend_time_unlocked(info.unlock_time, block_index) {
                continue;
            }
            selected.push(global_index);
        }
        Ok(selected)
    }

    /// Builds (or advances) the upgrade detector for `target_version`
    /// against this cache's current on-disk block-version history.
    pub fn init_upgrade_detector(
        &self,
        target_version: u8,
        hardcoded_height: Option<Height>,
    ) -> Result<UpgradeDetector> {
        let mut detector = UpgradeDetector::new(target_version, hardcoded_height);
        detector
            .init(self)
            .map_err(|e| ChainError::Inconsistent(e.to_string()))?;
        Ok(detector)
    }
}

/// A popped block handed back to the caller of `split`, who is
/// responsible for re-applying an alternative suffix (§4.4).
#[derive(Debug, Clone)]
pub struct PoppedBlock {
    pub height: Height,
    pub info: PushedBlockInfo,
}

/// Outcome of [`BlockchainCache::add_raw_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddBlockResult {
    Added,
    AlreadyExists,
    /// The block's parent isn't the current top; the caller needs to
    /// sync further back before this block can be applied.
    Orphan,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::BlockHeader;
    use crate::transaction::{Input, TransactionPrefix};
    use cryptonote_store::StoreConfig;

    fn temp_cache() -> (BlockchainCache, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(StoreConfig::new(dir.path())).unwrap();
        (BlockchainCache::new(store), dir)
    }

    fn coinbase_tx(height: u32) -> Transaction {
        Transaction {
            prefix: TransactionPrefix {
                version: 1,
                unlock_time: 0,
                inputs: vec![Input::Coinbase { height }],
                outputs: vec![],
                extra: vec![],
            },
            signatures: vec![],
        }
    }

    fn genesis_block() -> Block {
        Block {
            header: BlockHeader {
                major_version: 1,
                minor_version: 0,
                timestamp: 1_000,
                previous_block_hash: [0u8; 32],
                nonce: 0,
                parent_block: None,
            },
            base_transaction: coinbase_tx(0),
            transaction_hashes: vec![],
        }
    }

    #[test]
    fn push_then_split_restores_empty_chain() {
        let (mut cache, _dir) = temp_cache();
        let block = genesis_block();
        let args = PushBlockArgs {
            block: &block,
            transactions: &[],
            cached_transactions: vec![],
            key_outputs: vec![],
            validator_state: ValidatorState::default(),
            block_size: 100,
            generated_coins: 1000,
            block_difficulty: 1,
            raw_block: block.encode_to_vec(),
            raw_transactions: vec![],
        };
        cache.push_block(args).unwrap();
        assert_eq!(cache.top_index(), Some(0));
        assert_eq!(cache.top_hash(), block.hash());

        let popped = cache.split(0).unwrap();
        assert_eq!(popped.len(), 1);
        assert_eq!(cache.top_index(), None);
        assert_eq!(cache.top_hash(), [0u8; 32]);
    }

    #[test]
    fn rejects_block_with_wrong_previous_hash() {
        let (mut cache, _dir) = temp_cache();
        let mut block = genesis_block();
        block.header.previous_block_hash = [9u8; 32];
        let args = PushBlockArgs {
            block: &block,
            transactions: &[],
            cached_transactions: vec![],
            key_outputs: vec![],
            validator_state: ValidatorState::default(),
            block_size: 1,
            generated_coins: 0,
            block_difficulty: 1,
            raw_block: vec![],
            raw_transactions: vec![],
        };
        assert!(matches!(cache.push_block(args), Err(ChainError::InvalidPrevHash)));
    }

    #[test]
    fn unlock_time_below_marker_is_treated_as_height() {
        let (cache, _dir) = temp_cache();
        assert!(cache.is_transaction_spend_time_unlocked(100, 100));
        assert!(!cache.is_transaction_spend_time_unlocked(200, 100));
    }
}
