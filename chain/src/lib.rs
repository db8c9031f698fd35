//! Blockchain cache core (§3, §4.4): block/transaction data model,
//! CryptoNote consensus constants, the windowed difficulty and upgrade-vote
//! algorithms, UTXO/secondary indexing, and the [`cache::BlockchainCache`]
//! that ties them together over a [`cryptonote_store::Store`].

pub mod block;
pub mod cache;
pub mod constants;
pub mod difficulty;
pub mod error;
pub mod extra;
pub mod observers;
pub mod transaction;
pub mod types;
pub mod upgrade;
pub mod utxo;

pub use block::{Block, BlockHeader};
pub use cache::{AddBlockResult, BlockchainCache, PoppedBlock, PushBlockArgs};
pub use error::{ChainError, Result};
pub use observers::Observers;
pub use transaction::{Input, Output, Transaction, TransactionPrefix, TxOutput};
pub use types::{
    Amount, CachedBlockInfo, CachedTransactionInfo, GlobalOutputIndex, Height, KeyOutputInfo,
    PackedOutIndex, PushedBlockInfo, ValidatorState,
};
pub use upgrade::{BlockVersionSource, UpgradeDetector};
