//! Genesis block construction (§6), following the reference chain's
//! hard-coded coinbase transaction and zero premine, re-expressed as a
//! struct literal instead of parsed from the original hex blob so it
//! round-trips exactly through this workspace's own canonical encoding
//! (see DESIGN.md).

use cryptonote_chain::{Block, BlockHeader, Input, Output, Transaction, TransactionPrefix, TxOutput};
use cryptonote_crypto::PublicKey;

/// Unix timestamp of the reference chain's first mined block.
const GENESIS_BLOCK_TIMESTAMP: u64 = 1_533_098_345;

/// The reference chain ships with no premine: `GENESIS_BLOCK_REWARD = 0`.
const GENESIS_BLOCK_REWARD: u64 = 0;

/// One-time public key embedded in the reference genesis coinbase
/// output, carried over bit-for-bit from `GENESIS_COINBASE_TX_HEX`.
const GENESIS_OUTPUT_KEY: [u8; 32] = [
    0x9b, 0x2e, 0x4c, 0x02, 0x81, 0xc0, 0xb0, 0x2e, 0x7c, 0x53, 0x29, 0x1a, 0x94, 0xd1, 0xd0, 0xcb, 0xff, 0x88, 0x83,
    0xf8, 0x02, 0x4f, 0x51, 0x42, 0xee, 0x49, 0x4f, 0xfb, 0xbd, 0x08, 0x80, 0x71,
];

/// Builds the fixed genesis block this network starts every chain from.
#[must_use]
pub fn genesis_block() -> Block {
    let base_transaction = Transaction {
        prefix: TransactionPrefix {
            version: 1,
            unlock_time: u64::from(cryptonote_chain::constants::CRYPTONOTE_MINED_MONEY_UNLOCK_WINDOW),
            inputs: vec![Input::Coinbase { height: 0 }],
            outputs: vec![TxOutput {
                amount: GENESIS_BLOCK_REWARD,
                target: Output::Key { one_time_public_key: PublicKey::from_bytes(GENESIS_OUTPUT_KEY) },
            }],
            extra: Vec::new(),
        },
        signatures: Vec::new(),
    };

    Block {
        header: BlockHeader {
            major_version: 1,
            minor_version: 0,
            timestamp: GENESIS_BLOCK_TIMESTAMP,
            previous_block_hash: [0u8; 32],
            nonce: 0,
            parent_block: None,
        },
        base_transaction,
        transaction_hashes: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_has_no_parent_and_a_single_coinbase_output() {
        let block = genesis_block();
        assert_eq!(block.header.previous_block_hash, [0u8; 32]);
        assert_eq!(block.base_transaction.prefix.outputs.len(), 1);
        assert!(block.transaction_hashes.is_empty());
    }
}
