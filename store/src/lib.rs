//! Embedded key/value store adapter (§4.3): atomic write batches, snapshot
//! read batches, auto-resizing memory map, periodic durability sync.

pub mod batch;
pub mod config;
pub mod error;
mod store;

pub use batch::{ReadBatch, ReadResult, WriteBatch};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use store::Store;
