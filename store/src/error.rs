use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database engine error: {0}")]
    Engine(#[from] heed::Error),
    #[error("failed to prepare data directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown column family {0:?}")]
    UnknownColumn(&'static str),
    #[error("store is shutting down")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, StoreError>;
