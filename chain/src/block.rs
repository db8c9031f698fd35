//! Block data model (§3): header, coinbase ("base") transaction, and the
//! ordered list of transaction hashes committed by the transaction-tree
//! Merkle root.

use cryptonote_serial::error::{Result, SerializationError};
use cryptonote_serial::io::{read_container, read_fixed_bytes, write_container, Decode, Encode};
use cryptonote_serial::merkle::tree_hash;
use cryptonote_serial::varint::{read_varint, write_varint};

use crate::transaction::Transaction;

const MAX_TRANSACTIONS_PER_BLOCK: u64 = 0x10_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub major_version: u8,
    pub minor_version: u8,
    pub timestamp: u64,
    pub previous_block_hash: [u8; 32],
    pub nonce: u32,
    /// Present for `major_version >= 2`: the merge-mining parent block
    /// header, carried as an opaque blob. Merge-mining validation itself
    /// is outside this core's scope; the bytes are preserved verbatim so
    /// re-encoding and hashing stay bit-exact.
    pub parent_block: Option<Vec<u8>>,
}

impl Encode for BlockHeader {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, u64::from(self.major_version));
        write_varint(out, u64::from(self.minor_version));
        write_varint(out, self.timestamp);
        out.extend_from_slice(&self.previous_block_hash);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        if self.major_version >= 2 {
            let blob = self.parent_block.as_deref().unwrap_or(&[]);
            write_varint(out, blob.len() as u64);
            out.extend_from_slice(blob);
        }
    }
}

impl Decode for BlockHeader {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let major_version = u8::try_from(read_varint(bytes, cursor)?)
            .map_err(|_| SerializationError::VarintOverflow)?;
        let minor_version = u8::try_from(read_varint(bytes, cursor)?)
            .map_err(|_| SerializationError::VarintOverflow)?;
        let timestamp = read_varint(bytes, cursor)?;
        let previous_block_hash = read_fixed_bytes(bytes, cursor)?;
        let nonce = u32::from_le_bytes(read_fixed_bytes(bytes, cursor)?);
        let parent_block = if major_version >= 2 {
            let len = read_varint(bytes, cursor)? as usize;
            let slice = bytes
                .get(*cursor..*cursor + len)
                .ok_or(SerializationError::UnexpectedEof)?;
            *cursor += len;
            Some(slice.to_vec())
        } else {
            None
        };
        Ok(BlockHeader {
            major_version,
            minor_version,
            timestamp,
            previous_block_hash,
            nonce,
            parent_block,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub base_transaction: Transaction,
    pub transaction_hashes: Vec<[u8; 32]>,
}

impl Encode for Block {
    fn encode(&self, out: &mut Vec<u8>) {
        self.header.encode(out);
        self.base_transaction.encode(out);
        write_container(out, &self.transaction_hashes);
    }
}

impl Decode for Block {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let header = BlockHeader::decode(bytes, cursor)?;
        let base_transaction = Transaction::decode(bytes, cursor)?;
        let transaction_hashes = read_container(bytes, cursor, MAX_TRANSACTIONS_PER_BLOCK)?;
        Ok(Block {
            header,
            base_transaction,
            transaction_hashes,
        })
    }
}

impl Block {
    /// The transaction-tree Merkle root over `[hash(baseTx)] ++
    /// transactionHashes` (§4.2).
    #[must_use]
    pub fn transaction_tree_root(&self) -> [u8; 32] {
        let mut leaves = Vec::with_capacity(self.transaction_hashes.len() + 1);
        leaves.push(self.base_transaction.hash());
        leaves.extend_from_slice(&self.transaction_hashes);
        tree_hash(&leaves).expect("the base transaction leaf is always present")
    }

    /// The canonical object hash of the full block.
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        cryptonote_serial::hash::object_hash(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::{Input, TransactionPrefix};
    use cryptonote_serial::io::decode_complete;

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

    #[test]
    fn block_roundtrips() {
        let block = Block {
            header: BlockHeader {
                major_version: 1,
                minor_version: 0,
                timestamp: 1_600_000_000,
                previous_block_hash: [0u8; 32],
                nonce: 42,
                parent_block: None,
            },
            base_transaction: coinbase_tx(0),
            transaction_hashes: vec![[1u8; 32], [2u8; 32]],
        };
        let encoded = block.encode_to_vec();
        let decoded: Block = decode_complete(&encoded).unwrap();
        assert_eq!(decoded, block);
    }

    #[test]
    fn tree_root_includes_base_transaction() {
        let block = Block {
            header: BlockHeader {
                major_version: 1,
                minor_version: 0,
                timestamp: 0,
                previous_block_hash: [0u8; 32],
                nonce: 0,
                parent_block: None,
            },
            base_transaction: coinbase_tx(5),
            transaction_hashes: vec![],
        };
        assert_eq!(block.transaction_tree_root(), block.base_transaction.hash());
    }
}
