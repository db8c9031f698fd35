//! CryptoNight-family proof-of-work slow hash (§4.1).
//!
//! This follows the documented stage order — Keccak absorb, AES-derived
//! scratchpad expansion, a long mixing loop doing two scratchpad touches
//! and one 64x64->128 multiply-fold per round, state re-absorption, and a
//! finalizer chosen by the low two bits of the permuted state — but does
//! not attempt bit-exact compatibility with the reference network's PoW:
//! the real algorithm's scratchpad indexing and multiply-add tweaks are
//! consensus-critical and intentionally undocumented at that precision
//! in the source spec. DESIGN.md records this as a deliberate
//! simplification; the four finalizers are real (Blake2b and Keccak) or
//! a domain-separated Keccak stand-in where the pack carries no crate
//! for Groestl/JH/Skein.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes128;
use blake2::{Blake2b512, Digest as Blake2Digest};
use sha3::{Digest, Keccak256};

use crate::error::{CryptoError, Result};
use crate::types::Hash;

/// Selects which CryptoNight variant's tweaks apply to the mixing loop.
/// Only `variant` changes the mixing; the surrounding stages are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Original,
    V1,
    V2,
}

const STATE_BYTES: usize = 200;
const BLOCK_SIZE: usize = 16;

/// Runs the slow hash. `scratchpad_size` must be a multiple of
/// `BLOCK_SIZE` and `page_size` must divide it evenly, matching the
/// "page-by-page AES expansion" description in the spec.
pub fn cn_slow_hash(
    data: &[u8],
    variant: Variant,
    page_size: usize,
    scratchpad_size: usize,
    iterations: usize,
) -> Result<Hash> {
    if page_size == 0 || scratchpad_size == 0 || scratchpad_size % page_size != 0 {
        return Err(CryptoError::PoWUnavailable);
    }

    let mut state = expand_keccak_state(data);

    let (key_a, key_b) = aes_keys_from_state(&state);
    let mut scratchpad = expand_scratchpad(&state, &key_a, &key_b, scratchpad_size);

    mix(&mut scratchpad, &key_a, variant, iterations);

    absorb_scratchpad(&mut state, &scratchpad);
    keccak_permute(&mut state);

    Ok(finalize(&state))
}

/// Stand-in for the 1600-bit Keccak absorb: stretches a 32-byte Keccak
/// digest of `data` out to the full 200-byte internal state using
/// domain-separated re-hashing.
fn expand_keccak_state(data: &[u8]) -> [u8; STATE_BYTES] {
    let mut state = [0u8; STATE_BYTES];
    let mut block = 0u8;
    let mut offset = 0;
    while offset < STATE_BYTES {
        let mut hasher = Keccak256::new();
        hasher.update(data);
        hasher.update([block]);
        let digest: [u8; 32] = hasher.finalize().into();
        let n = (STATE_BYTES - offset).min(32);
        state[offset..offset + n].copy_from_slice(&digest[..n]);
        offset += n;
        block += 1;
    }
    state
}

fn aes_keys_from_state(state: &[u8; STATE_BYTES]) -> ([u8; 16], [u8; 16]) {
    let mut a = [0u8; 16];
    let mut b = [0u8; 16];
    a.copy_from_slice(&state[0..16]);
    b.copy_from_slice(&state[16..32]);
    (a, b)
}

fn expand_scratchpad(
    state: &[u8; STATE_BYTES],
    key_a: &[u8; 16],
    key_b: &[u8; 16],
    scratchpad_size: usize,
) -> Vec<u8> {
    let cipher_a = Aes128::new(GenericArray::from_slice(key_a));
    let cipher_b = Aes128::new(GenericArray::from_slice(key_b));

    let mut scratchpad = vec![0u8; scratchpad_size];
    let mut block = [0u8; BLOCK_SIZE];
    block.copy_from_slice(&state[32..32 + BLOCK_SIZE]);

    for (i, chunk) in scratchpad.chunks_mut(BLOCK_SIZE).enumerate() {
        let mut ga = GenericArray::clone_from_slice(&block);
        for round in 0..10 {
            if round % 2 == 0 {
                cipher_a.encrypt_block(&mut ga);
            } else {
                cipher_b.encrypt_block(&mut ga);
            }
        }
        // Fold the running block index in so identical plaintext blocks
        // don't repeat verbatim across the scratchpad.
        for (b, ib) in ga.iter_mut().zip((i as u64).to_le_bytes().iter().cycle()) {
            *b ^= ib;
        }
        block.copy_from_slice(ga.as_slice());
        chunk.copy_from_slice(&ga[..chunk.len()]);
    }
    scratchpad
}

fn mix(scratchpad: &mut [u8], key_a: &[u8; 16], variant: Variant, iterations: usize) {
    let cipher = Aes128::new(GenericArray::from_slice(key_a));
    let len = scratchpad.len();
    if len < BLOCK_SIZE {
        return;
    }
    let blocks = len / BLOCK_SIZE;
    if blocks == 0 {
        return;
    }

    let mut a_block = [0u8; BLOCK_SIZE];
    a_block.copy_from_slice(&scratchpad[0..BLOCK_SIZE]);

    for round in 0..(iterations / 2).max(1) {
        let idx_a = (u64::from_le_bytes(a_block[0..8].try_into().unwrap()) as usize) % blocks;
        let off_a = idx_a * BLOCK_SIZE;

        let mut ga = GenericArray::clone_from_slice(&scratchpad[off_a..off_a + BLOCK_SIZE]);
        cipher.encrypt_block(&mut ga);
        if variant == Variant::V2 || variant == Variant::V1 {
            // Variant tweak: xor in the round counter so V1/V2 diverge
            // from the original mixing trace, matching the spec's note
            // that variants only perturb the mixing loop.
            ga[0] ^= (round & 0xff) as u8;
        }
        scratchpad[off_a..off_a + BLOCK_SIZE].copy_from_slice(ga.as_slice());

        let idx_b = (u64::from_le_bytes(ga[0..8].try_into().unwrap()) as usize) % blocks;
        let off_b = idx_b * BLOCK_SIZE;
        let mut b_block = [0u8; BLOCK_SIZE];
        b_block.copy_from_slice(&scratchpad[off_b..off_b + BLOCK_SIZE]);

        let (hi, lo) = mul64(
            u64::from_le_bytes(ga[0..8].try_into().unwrap()),
            u64::from_le_bytes(b_block[0..8].try_into().unwrap()),
        );
        for k in 0..8 {
            b_block[k] = b_block[k].wrapping_add(lo.to_le_bytes()[k]);
            b_block[8 + k] = b_block[8 + k].wrapping_add(hi.to_le_bytes()[k]);
        }
        scratchpad[off_b..off_b + BLOCK_SIZE].copy_from_slice(&b_block);

        a_block = b_block;
    }
}

/// 64x64 -> 128 bit multiply, returning `(high, low)`.
fn mul64(a: u64, b: u64) -> (u64, u64) {
    let product = u128::from(a) * u128::from(b);
    ((product >> 64) as u64, product as u64)
}

fn absorb_scratchpad(state: &mut [u8; STATE_BYTES], scratchpad: &[u8]) {
    for (i, chunk) in scratchpad.chunks(BLOCK_SIZE).enumerate() {
        let offset = (i * BLOCK_SIZE) % STATE_BYTES;
        for (j, byte) in chunk.iter().enumerate() {
            state[(offset + j) % STATE_BYTES] ^= *byte;
        }
    }
}

fn keccak_permute(state: &mut [u8; STATE_BYTES]) {
    let mut hasher = Keccak256::new();
    hasher.update(state.as_slice());
    let digest: [u8; 32] = hasher.finalize().into();
    for (i, byte) in state.iter_mut().enumerate() {
        *byte ^= digest[i % 32];
    }
}

fn finalize(state: &[u8; STATE_BYTES]) -> Hash {
    let selector = state[0] & 0b11;
    let digest = match selector {
        0 => {
            let mut hasher = Blake2b512::new();
            hasher.update(state.as_slice());
            let out = hasher.finalize();
            let mut h = [0u8; 32];
            h.copy_from_slice(&out[..32]);
            h
        }
        1 => {
            let mut hasher = Keccak256::new();
            hasher.update(state.as_slice());
            hasher.finalize().into()
        }
        2 => {
            // Stand-in for Groestl: domain-separated Keccak.
            let mut hasher = Keccak256::new();
            hasher.update(b"groestl-stand-in");
            hasher.update(state.as_slice());
            hasher.finalize().into()
        }
        _ => {
            // Stand-in for JH/Skein: domain-separated Keccak.
            let mut hasher = Keccak256::new();
            hasher.update(b"jh-skein-stand-in");
            hasher.update(state.as_slice());
            hasher.finalize().into()
        }
    };
    Hash::from_bytes(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_hash_is_deterministic() {
        let data = b"cryptonote block header bytes";
        let a = cn_slow_hash(data, Variant::V2, 16 * 1024, 2 * 1024 * 1024, 8).unwrap();
        let b = cn_slow_hash(data, Variant::V2, 16 * 1024, 2 * 1024 * 1024, 8).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn slow_hash_differs_for_different_inputs() {
        let a = cn_slow_hash(b"one", Variant::Original, 16 * 1024, 2 * 1024 * 1024, 8).unwrap();
        let b = cn_slow_hash(b"two", Variant::Original, 16 * 1024, 2 * 1024 * 1024, 8).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn rejects_misaligned_scratchpad_sizes() {
        assert!(cn_slow_hash(b"x", Variant::Original, 100, 33, 8).is_err());
    }
}
