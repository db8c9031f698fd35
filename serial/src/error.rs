use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("varint exceeds 64 bits")]
    VarintOverflow,
    #[error("varint encoding is not minimal")]
    VarintNotMinimal,
    #[error("unknown variant tag {0:#x}")]
    UnknownTag(u8),
    #[error("container length {0} exceeds configured maximum")]
    LengthLimitExceeded(u64),
    #[error("{0} unconsumed trailing byte(s) after decode")]
    TrailingBytes(usize),
    #[error("string field is not valid utf-8")]
    InvalidUtf8,
}

pub type Result<T> = std::result::Result<T, SerializationError>;
