//! CryptoNote-family cryptographic primitives: key generation and
//! derivation, key images, LSAG ring signatures, and the CryptoNight-family
//! proof-of-work slow hash.

pub mod error;
pub mod keys;
pub mod ring;
pub mod slowhash;
pub mod types;

mod varint;

pub use error::{CryptoError, Result};
pub use keys::{
    check_public_key, derive_public_key, derive_secret_key, generate_key_derivation,
    generate_key_image, generate_keys, hash_to_point, hash_to_scalar, underive_public_key,
};
pub use ring::{check_ring_signature, generate_ring_signatures};
pub use slowhash::{cn_slow_hash, Variant};
pub use types::{
    check_key, EllipticCurvePoint, EllipticCurveScalar, Hash, KeyDerivation, KeyImage, PublicKey,
    SecretKey, Signature,
};
