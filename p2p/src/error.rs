use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Deserialization(#[from] cryptonote_serial::SerializationError),
    #[error("frame exceeds maximum size: {0} bytes")]
    FrameTooLarge(u32),
    #[error("peer sent an invalid block: {0}")]
    BadBlock(String),
    #[error("peer sent an invalid transaction: {0}")]
    BadTx(String),
    #[error("peer did not respond within the configured window")]
    Timeout,
    #[error("peer is banned")]
    Banned,
    #[error("unexpected message for the current peer state")]
    OutOfOrder,
    #[error("underlying chain error: {0}")]
    Chain(#[from] cryptonote_chain::ChainError),
    #[error("underlying pool error: {0}")]
    Pool(#[from] cryptonote_pool::PoolError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
