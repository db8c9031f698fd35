//! CryptoNote/LSAG ring signatures and verification (§4.1, §8.6).
//!
//! A ring signature proves knowledge of the secret key behind exactly one
//! of `pubs[]` — the one at `real_index` — without revealing which, while
//! binding the proof to a fixed key image `I` so the same secret can't be
//! used to sign two different messages undetected (the double-spend
//! guard upstream relies on `I` being deterministic per secret key).

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::EdwardsPoint;
use curve25519_dalek::scalar::Scalar;
use curve25519_dalek::traits::Identity;
use rand_core::{CryptoRng, RngCore};

use crate::error::{CryptoError, Result};
use crate::keys::hash_to_point;
use crate::types::{check_key, in_prime_order_subgroup, point_from_compressed, Hash, KeyImage, PublicKey, SecretKey, Signature};

/// Produces one `(c, r)` pair per ring member. `sigs[real_index]` closes
/// the ring: `sum(c_i) == H_s(prefix_hash || all commitments)`.
pub fn generate_ring_signatures<R: RngCore + CryptoRng>(
    prefix_hash: &Hash,
    image: &KeyImage,
    pubs: &[PublicKey],
    secret: &SecretKey,
    real_index: usize,
    rng: &mut R,
) -> Result<Vec<Signature>> {
    if real_index >= pubs.len() {
        return Err(CryptoError::RingSizeMismatch {
            expected: pubs.len(),
            got: real_index + 1,
        });
    }

    let image_point = point_from_compressed(&image.0)?;
    let hp_real = hash_to_point(&pubs[real_index].0);

    let mut c = vec![Scalar::ZERO; pubs.len()];
    let mut r = vec![Scalar::ZERO; pubs.len()];

    let mut buf = Vec::with_capacity(32 + 64 * pubs.len());
    buf.extend_from_slice(prefix_hash.as_bytes());

    // First pass: commitments for every index. For the real index we
    // pick a random nonce `k` and commit `k*B`, `k*H_p(P_real)`; for every
    // other index we pick random `(c_i, r_i)` and derive the commitments
    // that would make the ring equation hold for that forged challenge.
    let mut commitments = vec![(EdwardsPoint::identity(), EdwardsPoint::identity()); pubs.len()];
    let k = random_scalar(rng);
    commitments[real_index] = (
        &k * &ED25519_BASEPOINT_TABLE,
        k * hp_real,
    );

    for (i, pk) in pubs.iter().enumerate() {
        if i == real_index {
            continue;
        }
        let pub_point = point_from_compressed(&pk.0)?;
        let ci = random_scalar(rng);
        let ri = random_scalar(rng);
        c[i] = ci;
        r[i] = ri;
        let hp_i = hash_to_point(&pk.0);
        // L_i = r_i*B + c_i*P_i ; R_i = r_i*H_p(P_i) + c_i*I
        commitments[i] = (
            &r[i] * &ED25519_BASEPOINT_TABLE + ci * pub_point,
            r[i] * hp_i + ci * image_point,
        );
    }

    for (l, rr) in &commitments {
        buf.extend_from_slice(l.compress().as_bytes());
        buf.extend_from_slice(rr.compress().as_bytes());
    }
    let challenge_sum = crate::keys::hash_to_scalar(&buf);

    let mut sum_others = Scalar::ZERO;
    for (i, _) in pubs.iter().enumerate() {
        if i != real_index {
            sum_others += c[i];
        }
    }
    c[real_index] = challenge_sum - sum_others;
    r[real_index] = k - c[real_index] * secret.scalar();

    Ok((0..pubs.len())
        .map(|i| Signature::from_parts(c[i].to_bytes(), r[i].to_bytes()))
        .collect())
}

/// Verifies a ring signature and that `I` lies in the prime-order subgroup.
pub fn check_ring_signature(
    prefix_hash: &Hash,
    image: &KeyImage,
    pubs: &[PublicKey],
    sigs: &[Signature],
) -> Result<bool> {
    if pubs.len() != sigs.len() {
        return Err(CryptoError::RingSizeMismatch {
            expected: pubs.len(),
            got: sigs.len(),
        });
    }
    if pubs.is_empty() {
        return Ok(false);
    }

    let image_point = point_from_compressed(&image.0)?;
    if !in_prime_order_subgroup(&image_point) {
        return Ok(false);
    }

    let mut buf = Vec::with_capacity(32 + 64 * pubs.len());
    buf.extend_from_slice(prefix_hash.as_bytes());

    let mut sum = Scalar::ZERO;
    let mut rendered = Vec::with_capacity(pubs.len());
    for (pk, sig) in pubs.iter().zip(sigs.iter()) {
        if !check_key(pk) {
            return Ok(false);
        }
        let pub_point = point_from_compressed(&pk.0)?;
        let c = Scalar::from_canonical_bytes(sig.c());
        let r = Scalar::from_canonical_bytes(sig.r());
        let (c, r) = match (Option::from(c), Option::from(r)) {
            (Some(c), Some(r)) => (c, r),
            _ => return Ok(false),
        };
        sum += c;

        let hp = hash_to_point(&pk.0);
        let l = &r * &ED25519_BASEPOINT_TABLE + c * pub_point;
        let rr = r * hp + c * image_point;
        rendered.push((l, rr));
    }

    for (l, rr) in &rendered {
        buf.extend_from_slice(l.compress().as_bytes());
        buf.extend_from_slice(rr.compress().as_bytes());
    }
    let expected = crate::keys::hash_to_scalar(&buf);

    Ok(sum == expected)
}

fn random_scalar<R: RngCore + CryptoRng>(rng: &mut R) -> Scalar {
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    Scalar::from_bytes_mod_order(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{generate_key_image, generate_keys};
    use rand::rngs::OsRng;

    #[test]
    fn ring_signature_round_trips() {
        let prefix_hash = Hash::from_bytes([7u8; 32]);
        let (real_pub, real_sec) = generate_keys(&mut OsRng);
        let decoys: Vec<PublicKey> = (0..3)
            .map(|_| generate_keys(&mut OsRng).0)
            .collect();

        let mut pubs = decoys;
        let real_index = 2;
        pubs.insert(real_index, real_pub);

        let image = generate_key_image(&real_pub, &real_sec);
        let sigs =
            generate_ring_signatures(&prefix_hash, &image, &pubs, &real_sec, real_index, &mut OsRng)
                .unwrap();

        assert!(check_ring_signature(&prefix_hash, &image, &pubs, &sigs).unwrap());
    }

    #[test]
    fn ring_signature_rejects_tampered_message() {
        let prefix_hash = Hash::from_bytes([1u8; 32]);
        let tampered_hash = Hash::from_bytes([2u8; 32]);
        let (real_pub, real_sec) = generate_keys(&mut OsRng);
        let pubs = vec![real_pub, generate_keys(&mut OsRng).0];
        let image = generate_key_image(&real_pub, &real_sec);

        let sigs =
            generate_ring_signatures(&prefix_hash, &image, &pubs, &real_sec, 0, &mut OsRng).unwrap();

        assert!(!check_ring_signature(&tampered_hash, &image, &pubs, &sigs).unwrap());
    }

    #[test]
    fn ring_signature_rejects_wrong_key_image() {
        let prefix_hash = Hash::from_bytes([3u8; 32]);
        let (real_pub, real_sec) = generate_keys(&mut OsRng);
        let (other_pub, other_sec) = generate_keys(&mut OsRng);
        let pubs = vec![real_pub, other_pub];
        let image = generate_key_image(&real_pub, &real_sec);
        let wrong_image = generate_key_image(&other_pub, &other_sec);

        let sigs =
            generate_ring_signatures(&prefix_hash, &image, &pubs, &real_sec, 0, &mut OsRng).unwrap();

        assert!(!check_ring_signature(&prefix_hash, &wrong_image, &pubs, &sigs).unwrap());
    }
}
