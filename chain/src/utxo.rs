//! Persistent UTXO indexes backing the blockchain cache (§3, §4.4):
//! per-amount output counts and lookups, the spent key-image set, and the
//! payment-id / timestamp secondary indexes used to answer queries
//! without a full scan.
//!
//! Keys are big-endian so lexicographic byte order (what the underlying
//! store sorts by) matches numeric order, which the range-style queries
//! (`get_block_height_for_timestamp`, global-index enumeration) rely on.

use cryptonote_crypto::KeyImage;
use cryptonote_serial::io::{decode_complete, Encode};
use cryptonote_store::{ReadBatch, Store, WriteBatch};

use crate::error::{ChainError, Result};
use crate::types::{Amount, CachedTransactionInfo, GlobalOutputIndex, Height, KeyOutputInfo, PackedOutIndex};

const COLUMN_AMOUNT_OUTPUT_COUNT: &str = "amount_output_count";
const COLUMN_PACKED_OUTPUTS: &str = "packed_outputs";
const COLUMN_KEY_OUTPUT_INFO: &str = "key_output_info";
const COLUMN_SPENT_KEY_IMAGES: &str = "spent_key_images";
const COLUMN_PAYMENT_ID_INDEX: &str = "payment_id_index";
const COLUMN_TIMESTAMP_INDEX: &str = "timestamp_index";

const SECONDS_PER_DAY: u64 = 60 * 60 * 24;

fn amount_key(amount: Amount) -> Vec<u8> {
    amount.to_be_bytes().to_vec()
}

fn amount_index_key(amount: Amount, global_index: GlobalOutputIndex) -> Vec<u8> {
    let mut key = amount.to_be_bytes().to_vec();
    key.extend_from_slice(&global_index.to_be_bytes());
    key
}

impl Encode for PackedOutIndex {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.block_index.to_le_bytes());
        out.extend_from_slice(&self.transaction_index.to_le_bytes());
        out.extend_from_slice(&self.output_index.to_le_bytes());
    }
}

impl cryptonote_serial::io::Decode for PackedOutIndex {
    fn decode(bytes: &[u8], cursor: &mut usize) -> cryptonote_serial::Result<Self> {
        let block_index = u32::from_le_bytes(cryptonote_serial::io::read_fixed_bytes(bytes, cursor)?);
        let transaction_index = u16::from_le_bytes(cryptonote_serial::io::read_fixed_bytes(bytes, cursor)?);
        let output_index = u16::from_le_bytes(cryptonote_serial::io::read_fixed_bytes(bytes, cursor)?);
        Ok(PackedOutIndex {
            block_index,
            transaction_index,
            output_index,
        })
    }
}

impl Encode for KeyOutputInfo {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.public_key.as_bytes());
        out.extend_from_slice(&self.transaction_hash);
        out.extend_from_slice(&self.unlock_time.to_le_bytes());
        out.extend_from_slice(&self.output_index.to_le_bytes());
    }
}

impl cryptonote_serial::io::Decode for KeyOutputInfo {
    fn decode(bytes: &[u8], cursor: &mut usize) -> cryptonote_serial::Result<Self> {
        let public_key_bytes: [u8; 32] = cryptonote_serial::io::read_fixed_bytes(bytes, cursor)?;
        let public_key = cryptonote_crypto::PublicKey::from_bytes(public_key_bytes);
        let transaction_hash = cryptonote_serial::io::read_fixed_bytes(bytes, cursor)?;
        let unlock_time = u64::from_le_bytes(cryptonote_serial::io::read_fixed_bytes(bytes, cursor)?);
        let output_index = u16::from_le_bytes(cryptonote_serial::io::read_fixed_bytes(bytes, cursor)?);
        Ok(KeyOutputInfo {
            public_key,
            transaction_hash,
            unlock_time,
            output_index,
        })
    }
}

/// Thin, store-backed view over the UTXO set and its secondary indexes.
/// Holds no cache of its own beyond what `Store`'s LMDB pages already
/// provide; every read goes through a fresh snapshot.
pub struct UtxoIndex<'a> {
    store: &'a Store,
}

impl<'a> UtxoIndex<'a> {
    #[must_use]
    pub fn new(store: &'a Store) -> Self {
        UtxoIndex { store }
    }

    #[must_use]
    pub fn output_count(&self, amount: Amount) -> Result<u32> {
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_AMOUNT_OUTPUT_COUNT, amount_key(amount));
        let result = self.store.read(batch)?;
        Ok(match result.get(0) {
            Some(bytes) => u32::from_be_bytes(bytes.try_into().map_err(|_| {
                ChainError::Inconsistent("corrupt amount_output_count record".into())
            })?),
            None => 0,
        })
    }

    #[must_use]
    pub fn packed_out_index(&self, amount: Amount, global_index: GlobalOutputIndex) -> Result<Option<PackedOutIndex>> {
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_PACKED_OUTPUTS, amount_index_key(amount, global_index));
        let result = self.store.read(batch)?;
        result
            .get(0)
            .map(|bytes| decode_complete(bytes).map_err(ChainError::from))
            .transpose()
    }

    #[must_use]
    pub fn key_output_info(&self, amount: Amount, global_index: GlobalOutputIndex) -> Result<Option<KeyOutputInfo>> {
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_KEY_OUTPUT_INFO, amount_index_key(amount, global_index));
        let result = self.store.read(batch)?;
        result
            .get(0)
            .map(|bytes| decode_complete(bytes).map_err(ChainError::from))
            .transpose()
    }

    #[must_use]
    pub fn is_spent(&self, image: &KeyImage) -> Result<bool> {
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_SPENT_KEY_IMAGES, image.as_bytes().to_vec());
        let result = self.store.read(batch)?;
        Ok(result.get(0).is_some())
    }

    /// The highest-indexed block whose timestamp is `<=` the UTC midnight
    /// containing `timestamp`, mirroring the reference cache's
    /// day-bucketed secondary index used to answer `getBlockHeightForTimestamp`.
    #[must_use]
    pub fn block_height_for_timestamp(&self, timestamp: u64) -> Result<Option<Height>> {
        let bucket = timestamp - (timestamp % SECONDS_PER_DAY);
        let mut batch = ReadBatch::new();
        batch.get(COLUMN_TIMESTAMP_INDEX, bucket.to_be_bytes().to_vec());
        let result = self.store.read(batch)?;
        Ok(result
            .get(0)
            .map(|bytes| u32::from_be_bytes(bytes.try_into().unwrap_or_default())))
    }

    /// Records every key output a transaction created, bumping the
    /// per-amount count and filling in the packed/global index records.
    /// Appended to `batch` rather than written immediately, so a whole
    /// block's worth of indexing commits atomically with the rest of
    /// `pushBlock` (§4.4 total-or-nothing semantics).
    pub fn index_transaction_outputs(
        &self,
        batch: &mut WriteBatch,
        info: &CachedTransactionInfo,
        outputs: &[(Amount, KeyOutputInfo)],
    ) -> Result<()> {
        let mut running_counts: std::collections::HashMap<Amount, u32> = std::collections::HashMap::new();
        for ((amount, global_index), (_, key_info)) in info.global_indexes.iter().zip(outputs) {
            let count = match running_counts.get(amount) {
                Some(count) => *count,
                None => self.output_count(*amount)?,
            };
            running_counts.insert(*amount, count + 1);
            batch.put(
                COLUMN_AMOUNT_OUTPUT_COUNT,
                amount_key(*amount),
                (count + 1).to_be_bytes().to_vec(),
            );

            let packed = PackedOutIndex {
                block_index: info.block_index,
                transaction_index: info.transaction_index,
                output_index: key_info.output_index,
            };
            batch.put(
                COLUMN_PACKED_OUTPUTS,
                amount_index_key(*amount, *global_index),
                packed.encode_to_vec(),
            );
            batch.put(
                COLUMN_KEY_OUTPUT_INFO,
                amount_index_key(*amount, *global_index),
                key_info.encode_to_vec(),
            );
        }
        Ok(())
    }

    /// Reverses `index_transaction_outputs`, used by `split` to undo a
    /// popped block's contribution to the per-amount global-index tail.
    pub fn unindex_transaction_outputs(&self, batch: &mut WriteBatch, info: &CachedTransactionInfo) -> Result<()> {
        let mut running_counts: std::collections::HashMap<Amount, u32> = std::collections::HashMap::new();
        for (amount, global_index) in &info.global_indexes {
            batch.delete(COLUMN_PACKED_OUTPUTS, amount_index_key(*amount, *global_index));
            batch.delete(COLUMN_KEY_OUTPUT_INFO, amount_index_key(*amount, *global_index));
            let count = match running_counts.get(amount) {
                Some(count) => *count,
                None => self.output_count(*amount)?,
            };
            if count > 0 {
                running_counts.insert(*amount, count - 1);
                batch.put(
                    COLUMN_AMOUNT_OUTPUT_COUNT,
                    amount_key(*amount),
                    (count - 1).to_be_bytes().to_vec(),
                );
            }
        }
        Ok(())
    }

    pub fn index_spent_key_images(&self, batch: &mut WriteBatch, height: Height, images: &[KeyImage]) {
        for image in images {
            batch.put(
                COLUMN_SPENT_KEY_IMAGES,
                image.as_bytes().to_vec(),
                height.to_le_bytes().to_vec(),
            );
        }
    }

    pub fn unindex_spent_key_images(&self, batch: &mut WriteBatch, images: &[KeyImage]) {
        for image in images {
            batch.delete(COLUMN_SPENT_KEY_IMAGES, image.as_bytes().to_vec());
        }
    }

    pub fn index_payment_id(&self, batch: &mut WriteBatch, payment_id: &[u8; 32], info: &CachedTransactionInfo) {
        let mut key = payment_id.to_vec();
        key.extend_from_slice(&info.block_index.to_be_bytes());
        key.extend_from_slice(&info.transaction_index.to_be_bytes());
        batch.put(COLUMN_PAYMENT_ID_INDEX, key, info.hash.to_vec());
    }

    /// Reverses `index_payment_id`, used by `split` to undo a popped
    /// block's payment-id entries.
    pub fn unindex_payment_id(&self, batch: &mut WriteBatch, payment_id: &[u8; 32], info: &CachedTransactionInfo) {
        let mut key = payment_id.to_vec();
        key.extend_from_slice(&info.block_index.to_be_bytes());
        key.extend_from_slice(&info.transaction_index.to_be_bytes());
        batch.delete(COLUMN_PAYMENT_ID_INDEX, key);
    }

    /// Records the first block at or after each UTC-midnight boundary it
    /// crosses, overwriting a bucket only the first time it's filled.
    pub fn index_block_timestamp(&self, batch: &mut WriteBatch, height: Height, timestamp: u64) -> Result<()> {
        let bucket = timestamp - (timestamp % SECONDS_PER_DAY);
        if self.block_height_for_timestamp(timestamp)?.is_none() {
            batch.put(
                COLUMN_TIMESTAMP_INDEX,
                bucket.to_be_bytes().to_vec(),
                height.to_be_bytes().to_vec(),
            );
        }
        Ok(())
    }

    /// Reverses `index_block_timestamp`: only the block that actually
    /// claimed a day's bucket needs to give it up when popped, since
    /// every later block sharing that day was a no-op on the way in.
    pub fn unindex_block_timestamp(&self, batch: &mut WriteBatch, height: Height, timestamp: u64) -> Result<()> {
        let bucket = timestamp - (timestamp % SECONDS_PER_DAY);
        if self.block_height_for_timestamp(timestamp)? == Some(height) {
            batch.delete(COLUMN_TIMESTAMP_INDEX, bucket.to_be_bytes().to_vec());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptonote_store::StoreConfig;

    fn temp_store() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (Store::open(StoreConfig::new(dir.path())).unwrap(), dir)
    }

    #[test]
    fn unspent_key_image_reads_as_absent() {
        let (store, _dir) = temp_store();
        let index = UtxoIndex::new(&store);
        let image = KeyImage::from_bytes([7u8; 32]);
        assert!(!index.is_spent(&image).unwrap());
    }

    #[test]
    fn spending_then_unspending_round_trips() {
        let (store, _dir) = temp_store();
        let index = UtxoIndex::new(&store);
        let image = KeyImage::from_bytes([9u8; 32]);

        let mut batch = WriteBatch::new();
        index.index_spent_key_images(&mut batch, 10, &[image]);
        store.write(batch).unwrap();
        assert!(index.is_spent(&image).unwrap());

        let mut batch = WriteBatch::new();
        index.unindex_spent_key_images(&mut batch, &[image]);
        store.write(batch).unwrap();
        assert!(!index.is_spent(&image).unwrap());
    }

    #[test]
    fn timestamp_bucket_keeps_first_writer() {
        let (store, _dir) = temp_store();
        let index = UtxoIndex::new(&store);
        let day = SECONDS_PER_DAY * 100;

        let mut batch = WriteBatch::new();
        index.index_block_timestamp(&mut batch, 5, day + 10).unwrap();
        store.write(batch).unwrap();

        let mut batch = WriteBatch::new();
        index.index_block_timestamp(&mut batch, 6, day + 20).unwrap();
        store.write(batch).unwrap();

        assert_eq!(index.block_height_for_timestamp(day + 20).unwrap(), Some(5));
    }
}
