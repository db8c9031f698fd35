use std::fmt;

use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::IsIdentity;
use zeroize::Zeroize;

use cryptonote_serial::io::{read_fixed_bytes, Decode, Encode};

use crate::error::{CryptoError, Result};

macro_rules! fixed_bytes {
    ($name:ident, $len:expr) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(#[cfg_attr(feature = "serde", serde(with = "serde_bytes_array"))] pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            #[must_use]
            pub const fn from_bytes(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            #[must_use]
            pub const fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            #[must_use]
            pub const fn zero() -> Self {
                Self([0u8; $len])
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = CryptoError;

            fn try_from(value: &[u8]) -> std::result::Result<Self, Self::Error> {
                let arr: [u8; $len] = value.try_into().map_err(|_| CryptoError::InvalidKey)?;
                Ok(Self(arr))
            }
        }

        impl Encode for $name {
            fn encode(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.0);
            }
        }

        impl Decode for $name {
            fn decode(bytes: &[u8], cursor: &mut usize) -> cryptonote_serial::Result<Self> {
                Ok(Self(read_fixed_bytes(bytes, cursor)?))
            }
        }
    };
}

// Small helper module so the fixed-size arrays above can derive
// `serde::{Serialize, Deserialize}` without pulling in `serde_bytes` as a
// real dependency (it only ever sees arrays, never slices).
#[cfg(feature = "serde")]
mod serde_bytes_array {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        bytes.as_slice().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let v: Vec<u8> = Vec::deserialize(deserializer)?;
        v.try_into()
            .map_err(|v: Vec<u8>| serde::de::Error::invalid_length(v.len(), &"fixed-size array"))
    }
}

fixed_bytes!(Hash, 32);
fixed_bytes!(PublicKey, 32);
fixed_bytes!(KeyImage, 32);
fixed_bytes!(KeyDerivation, 32);
fixed_bytes!(EllipticCurvePoint, 32);
fixed_bytes!(EllipticCurveScalar, 32);

/// A secret scalar. Zeroized on drop; never `Debug`-printed in full.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SecretKey(pub [u8; 32]);

impl SecretKey {
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub(crate) fn scalar(&self) -> Scalar {
        Scalar::from_bytes_mod_order(self.0)
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey(..)")
    }
}

/// A 64-byte ring/LSAG signature component: `(c, r)` scalar pair per ring
/// member, concatenated.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Signature(#[cfg_attr(feature = "serde", serde(with = "serde_bytes_array"))] pub [u8; 64]);

impl Signature {
    #[must_use]
    pub const fn from_parts(c: [u8; 32], r: [u8; 32]) -> Self {
        let mut bytes = [0u8; 64];
        let mut i = 0;
        while i < 32 {
            bytes[i] = c[i];
            bytes[32 + i] = r[i];
            i += 1;
        }
        Self(bytes)
    }

    #[must_use]
    pub fn c(&self) -> [u8; 32] {
        self.0[0..32].try_into().unwrap()
    }

    #[must_use]
    pub fn r(&self) -> [u8; 32] {
        self.0[32..64].try_into().unwrap()
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(self.0))
    }
}

pub(crate) fn point_from_compressed(bytes: &[u8; 32]) -> Result<EdwardsPoint> {
    let compressed = CompressedEdwardsY(*bytes);
    let point = compressed.decompress().ok_or(CryptoError::InvalidPoint)?;
    Ok(point)
}

/// Checks a public key is a canonical encoding of a point on the curve.
/// Mirrors `Crypto::check_key`: non-canonical encodings and off-curve
/// points are both rejected.
pub fn check_key(pk: &PublicKey) -> bool {
    point_from_compressed(&pk.0).is_ok()
}

/// Checks that a key image lies in the prime-order subgroup, i.e.
/// `8 * I != identity` is insufficient; we require `l * I == identity`
/// where `l` is the group order, which for a point already on the curve
/// is equivalent to checking it has no low-order component.
pub(crate) fn in_prime_order_subgroup(point: &EdwardsPoint) -> bool {
    // The prime-order subgroup check: multiplying by the subgroup order
    // must yield the identity. curve25519-dalek doesn't expose the
    // order directly for Edwards points, so we use `is_torsion_free`,
    // which is exactly this check for the curve we're on.
    point.is_torsion_free() && !point.is_identity()
}
