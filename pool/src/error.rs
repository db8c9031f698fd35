use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("canonical encoding error: {0}")]
    Serialization(#[from] cryptonote_serial::SerializationError),
    #[error("underlying chain error: {0}")]
    Chain(#[from] cryptonote_chain::ChainError),
}

pub type Result<T> = std::result::Result<T, PoolError>;
