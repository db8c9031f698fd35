//! CryptoNote-style block base58 (§6): data is chopped into 8-byte
//! blocks, each block base58-encoded on its own (not the whole buffer as
//! one big integer, unlike Bitcoin's Base58Check), so that a fixed
//! number of input bytes always produces a fixed number of characters.

use sha3::{Digest, Keccak256};

use crate::error::{Result, SerializationError};
use crate::varint::{read_varint, write_varint};

const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const ENCODED_BLOCK_SIZES: [usize; 9] = [0, 2, 3, 5, 6, 7, 9, 10, 11];
const FULL_BLOCK_SIZE: usize = 8;
const FULL_ENCODED_BLOCK_SIZE: usize = 11;

fn encode_block(block: &[u8]) -> Vec<u8> {
    let enc_len = ENCODED_BLOCK_SIZES[block.len()];
    let mut num: u64 = 0;
    for &b in block {
        num = (num << 8) | u64::from(b);
    }
    let mut out = vec![0u8; enc_len];
    for slot in out.iter_mut().rev() {
        *slot = ALPHABET[(num % 58) as usize];
        num /= 58;
    }
    out
}

fn decode_block(enc: &[u8], block_size: usize) -> Result<Vec<u8>> {
    let expected_len = ENCODED_BLOCK_SIZES[block_size];
    if enc.len() != expected_len {
        return Err(SerializationError::UnexpectedEof);
    }
    let mut num: u64 = 0;
    for &c in enc {
        let idx = ALPHABET
            .iter()
            .position(|&a| a == c)
            .ok_or(SerializationError::UnknownTag(c))? as u64;
        num = num
            .checked_mul(58)
            .and_then(|n| n.checked_add(idx))
            .ok_or(SerializationError::VarintOverflow)?;
    }
    if block_size < 8 && num >= (1u64 << (8 * block_size)) {
        return Err(SerializationError::VarintOverflow);
    }
    let bytes = num.to_be_bytes();
    Ok(bytes[8 - block_size..].to_vec())
}

/// Encodes an arbitrary byte buffer as block-base58.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    let mut out = Vec::with_capacity((data.len() / FULL_BLOCK_SIZE + 1) * FULL_ENCODED_BLOCK_SIZE);
    for chunk in data.chunks(FULL_BLOCK_SIZE) {
        out.extend(encode_block(chunk));
    }
    // SAFETY-free: the alphabet is pure ASCII.
    String::from_utf8(out).expect("base58 alphabet is ASCII")
}

/// Decodes a block-base58 string back into bytes.
pub fn decode(encoded: &str) -> Result<Vec<u8>> {
    let bytes = encoded.as_bytes();
    let full_blocks = bytes.len() / FULL_ENCODED_BLOCK_SIZE;
    let remainder_len = bytes.len() % FULL_ENCODED_BLOCK_SIZE;
    let remainder_block_size = if remainder_len == 0 {
        0
    } else {
        ENCODED_BLOCK_SIZES
            .iter()
            .position(|&l| l == remainder_len)
            .ok_or(SerializationError::UnexpectedEof)?
    };

    let mut out = Vec::with_capacity(full_blocks * FULL_BLOCK_SIZE + remainder_block_size);
    for chunk in bytes.chunks(FULL_ENCODED_BLOCK_SIZE).take(full_blocks) {
        out.extend(decode_block(chunk, FULL_BLOCK_SIZE)?);
    }
    if remainder_len != 0 {
        let tail = &bytes[full_blocks * FULL_ENCODED_BLOCK_SIZE..];
        out.extend(decode_block(tail, remainder_block_size)?);
    }
    Ok(out)
}

/// Encodes a CryptoNote address: `base58(varint(prefix) || payload ||
/// keccak(varint(prefix) || payload)[0..4])`.
#[must_use]
pub fn encode_address(prefix: u64, payload: &[u8]) -> String {
    let mut body = Vec::new();
    write_varint(&mut body, prefix);
    body.extend_from_slice(payload);

    let mut hasher = Keccak256::new();
    hasher.update(&body);
    let checksum: [u8; 32] = hasher.finalize().into();

    body.extend_from_slice(&checksum[0..4]);
    encode(&body)
}

/// Decodes and checksum-validates a CryptoNote address, returning
/// `(prefix, payload)`.
pub fn decode_address(address: &str) -> Result<(u64, Vec<u8>)> {
    let raw = decode(address)?;
    if raw.len() < 4 {
        return Err(SerializationError::UnexpectedEof);
    }
    let (body, checksum) = raw.split_at(raw.len() - 4);

    let mut hasher = Keccak256::new();
    hasher.update(body);
    let expected: [u8; 32] = hasher.finalize().into();
    if &expected[0..4] != checksum {
        return Err(SerializationError::TrailingBytes(4));
    }

    let mut cursor = 0;
    let prefix = read_varint(body, &mut cursor)?;
    let payload = body[cursor..].to_vec();
    Ok((prefix, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrips() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let encoded = encode(data);
        let decoded = decode(&encoded).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn address_roundtrips() {
        let prefix = 0x14820cu64;
        let payload = [7u8; 64];
        let address = encode_address(prefix, &payload);
        let (decoded_prefix, decoded_payload) = decode_address(&address).unwrap();
        assert_eq!(decoded_prefix, prefix);
        assert_eq!(decoded_payload, payload);
    }

    #[test]
    fn address_rejects_mutated_checksum_character() {
        let address = encode_address(0x14820c, &[1u8; 64]);
        let mut chars: Vec<char> = address.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == '1' { '2' } else { '1' };
        let mutated: String = chars.into_iter().collect();
        assert!(decode_address(&mutated).is_err());
    }
}
