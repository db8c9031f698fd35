use thiserror::Error;

#[derive(Error, Debug)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("underlying store error: {0}")]
    Store(#[from] cryptonote_store::StoreError),
    #[error("underlying chain error: {0}")]
    Chain(#[from] cryptonote_chain::ChainError),
    #[error("underlying protocol error: {0}")]
    Protocol(#[from] cryptonote_p2p::ProtocolError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;
