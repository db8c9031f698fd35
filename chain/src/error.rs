use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("expected previous block hash to equal the current top, got a mismatch")]
    InvalidPrevHash,
    #[error("key image already spent")]
    DoubleSpend,
    #[error("ring signature failed verification")]
    BadRingSignature,
    #[error("split height {0} is not within the cache's range")]
    InvalidSplitHeight(u32),
    #[error("requested height {0} exceeds the top index")]
    HeightOutOfRange(u32),
    #[error("underlying store error: {0}")]
    Database(#[from] cryptonote_store::StoreError),
    #[error("canonical encoding error: {0}")]
    Serialization(#[from] cryptonote_serial::SerializationError),
    #[error("cryptographic operation failed: {0}")]
    Crypto(#[from] cryptonote_crypto::CryptoError),
    #[error("on-disk indexes are inconsistent: {0}")]
    Inconsistent(String),
}

pub type Result<T> = std::result::Result<T, ChainError>;
