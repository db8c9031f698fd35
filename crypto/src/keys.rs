//! Key generation, derivation and key images (§4.1).

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;
use rand_core::{CryptoRng, RngCore};
use sha3::{Digest, Keccak256};

use crate::error::{CryptoError, Result};
use crate::types::{
    check_key, in_prime_order_subgroup, point_from_compressed, KeyDerivation, KeyImage,
    PublicKey, SecretKey,
};

/// `H_s`: hashes an arbitrary byte string down to a scalar mod `l`.
#[must_use]
pub fn hash_to_scalar(data: &[u8]) -> Scalar {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let digest: [u8; 32] = hasher.finalize().into();
    Scalar::from_bytes_mod_order(digest)
}

/// `H_p`: hashes a compressed point into another point on the curve, by
/// try-and-increment over Keccak-256 followed by cofactor clearing
/// (`8 * candidate`). This is a deliberate simplification of the
/// reference implementation's Elligator-based `hash_to_ec` — see
/// DESIGN.md — but satisfies the same contract: deterministic, and the
/// result always lies in the prime-order subgroup.
#[must_use]
pub fn hash_to_point(input: &[u8; 32]) -> EdwardsPoint {
    let mut counter: u8 = 0;
    loop {
        let mut hasher = Keccak256::new();
        hasher.update(input);
        hasher.update([counter]);
        let digest: [u8; 32] = hasher.finalize().into();
        if let Some(candidate) = CompressedEdwardsY(digest).decompress() {
            return candidate.mul_by_cofactor();
        }
        counter = counter.wrapping_add(1);
    }
}

/// `generateKeys`: draws a uniform secret scalar and returns `(pk, sk)`
/// with `pk = s * B`.
pub fn generate_keys<R: RngCore + CryptoRng>(rng: &mut R) -> (PublicKey, SecretKey) {
    let mut scalar_bytes = [0u8; 32];
    rng.fill_bytes(&mut scalar_bytes);
    let secret = Scalar::from_bytes_mod_order(scalar_bytes);
    let public = &secret * &ED25519_BASEPOINT_TABLE;
    (
        PublicKey(public.compress().to_bytes()),
        SecretKey(secret.to_bytes()),
    )
}

/// `checkKey`: rejects non-canonical encodings and off-curve points.
#[must_use]
pub fn check_public_key(pk: &PublicKey) -> bool {
    check_key(pk)
}

/// `generateKeyDerivation`: `D = 8 * (a * R)`.
pub fn generate_key_derivation(r: &PublicKey, a: &SecretKey) -> Result<KeyDerivation> {
    let point = point_from_compressed(&r.0)?;
    let derived = (point * a.scalar()).mul_by_cofactor();
    Ok(KeyDerivation(derived.compress().to_bytes()))
}

fn derivation_scalar(d: &KeyDerivation, output_index: u64, suffix: Option<&[u8]>) -> Scalar {
    let mut buf = Vec::with_capacity(32 + 10 + suffix.map_or(0, <[u8]>::len));
    buf.extend_from_slice(d.as_bytes());
    crate::varint::write_varint(&mut buf, output_index);
    if let Some(s) = suffix {
        buf.extend_from_slice(s);
    }
    hash_to_scalar(&buf)
}

/// `derivePublicKey`: `P = A + H_s(D || varint(i) [|| suffix]) * B`.
pub fn derive_public_key(
    d: &KeyDerivation,
    output_index: u64,
    a: &PublicKey,
    suffix: Option<&[u8]>,
) -> Result<PublicKey> {
    let base = point_from_compressed(&a.0)?;
    let scalar = derivation_scalar(d, output_index, suffix);
    let point = base + &scalar * &ED25519_BASEPOINT_TABLE;
    Ok(PublicKey(point.compress().to_bytes()))
}

/// Inverse of `derive_public_key`: recovers the base spend public key
/// `A` given the derivation, index and the one-time output key `P`.
pub fn underive_public_key(
    d: &KeyDerivation,
    output_index: u64,
    p: &PublicKey,
    suffix: Option<&[u8]>,
) -> Result<PublicKey> {
    let one_time = point_from_compressed(&p.0)?;
    let scalar = derivation_scalar(d, output_index, suffix);
    let base = one_time - &scalar * &ED25519_BASEPOINT_TABLE;
    Ok(PublicKey(base.compress().to_bytes()))
}

/// `deriveSecretKey`: `x = a + H_s(D || varint(i))`.
pub fn derive_secret_key(d: &KeyDerivation, output_index: u64, a: &SecretKey) -> SecretKey {
    let scalar = derivation_scalar(d, output_index, None);
    let x = a.scalar() + scalar;
    SecretKey(x.to_bytes())
}

/// `generateKeyImage`: `I = x * H_p(P)`.
pub fn generate_key_image(p: &PublicKey, x: &SecretKey) -> KeyImage {
    let hp = hash_to_point(&p.0);
    let image = hp * x.scalar();
    KeyImage(image.compress().to_bytes())
}

/// Verifies a key image lies in the prime-order subgroup (part of input
/// validation before a spend is accepted).
pub fn check_key_image(image: &KeyImage) -> Result<()> {
    let point = point_from_compressed(&image.0).map_err(|_| CryptoError::InvalidKey)?;
    if in_prime_order_subgroup(&point) {
        Ok(())
    } else {
        Err(CryptoError::InvalidKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn generate_keys_roundtrips_through_check() {
        let (pk, _sk) = generate_keys(&mut OsRng);
        assert!(check_public_key(&pk));
    }

    #[test]
    fn derive_then_underive_recovers_spend_key() {
        let (a_pub, a_sec) = generate_keys(&mut OsRng);
        let (r_pub, r_sec) = generate_keys(&mut OsRng);

        let d_sender = generate_key_derivation(&a_pub, &r_sec).unwrap();
        let d_receiver = generate_key_derivation(&r_pub, &a_sec).unwrap();
        assert_eq!(d_sender.as_bytes(), d_receiver.as_bytes());

        let one_time = derive_public_key(&d_sender, 3, &a_pub, None).unwrap();
        let recovered = underive_public_key(&d_sender, 3, &one_time, None).unwrap();
        assert_eq!(recovered.as_bytes(), a_pub.as_bytes());
    }

    #[test]
    fn derive_secret_key_matches_derived_public_key() {
        let (a_pub, a_sec) = generate_keys(&mut OsRng);
        let (r_pub, r_sec) = generate_keys(&mut OsRng);
        let d = generate_key_derivation(&r_pub, &a_sec).unwrap();
        let d2 = generate_key_derivation(&a_pub, &r_sec).unwrap();
        assert_eq!(d.as_bytes(), d2.as_bytes());

        let one_time_pub = derive_public_key(&d, 7, &a_pub, None).unwrap();
        let one_time_sec = derive_secret_key(&d, 7, &a_sec);

        let expected = {
            let scalar = Scalar::from_bytes_mod_order(*one_time_sec.as_bytes());
            (&scalar * &ED25519_BASEPOINT_TABLE).compress().to_bytes()
        };
        assert_eq!(one_time_pub.as_bytes(), &expected);
    }

    #[test]
    fn key_image_is_in_prime_order_subgroup() {
        let (pk, sk) = generate_keys(&mut OsRng);
        let image = generate_key_image(&pk, &sk);
        assert!(check_key_image(&image).is_ok());
    }

    #[test]
    fn check_key_rejects_off_curve_point() {
        // y-coordinate chosen such that (y^2-1)/(d*y^2+1) is a quadratic
        // non-residue mod p, so no x exists on the curve for this y.
        let bogus = PublicKey(
            hex::decode("028361471adfb6268f12cb97e243b964026f9db4b97a456460ea523e36145344")
                .unwrap()
                .try_into()
                .unwrap(),
        );
        assert!(!check_public_key(&bogus));
    }
}
