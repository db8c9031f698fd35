use thiserror::Error;

/// Error taxonomy for the crypto primitives (C1). None of these operations
/// perform I/O, so there is no `Io` variant here — only the crate-local
/// failure modes named by the spec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("key is not a valid point on the curve")]
    InvalidKey,

    #[error("ring signature failed verification")]
    InvalidSignature,

    #[error("point is not on the curve or not in the prime-order subgroup")]
    InvalidPoint,

    #[error("proof-of-work hashing is unavailable on this platform")]
    PoWUnavailable,

    #[error("ring size mismatch: {expected} public keys, {got} signatures")]
    RingSizeMismatch { expected: usize, got: usize },
}

pub type Result<T> = std::result::Result<T, CryptoError>;
