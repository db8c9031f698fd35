//! Transaction pool (§4.5): priority-ordered mempool with fusion-first
//! block template assembly and recently-deleted suppression.

pub mod error;
pub mod pool;
pub mod priority;
pub mod types;

pub use error::{PoolError, Result};
pub use pool::TransactionPool;
pub use priority::PriorityKey;
pub use types::{AddTxOutcome, BlockTemplate, PoolEntry, TxId};
