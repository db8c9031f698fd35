//! Little-endian canonical binary encoding (§4.2): the `Encode`/`Decode`
//! traits every in-scope type implements, plus the container and
//! tag-prefixed-variant helpers built on top of them.

use crate::error::{Result, SerializationError};
use crate::varint::{read_varint, write_varint};

/// Anything that can be written to the canonical wire/storage format.
pub trait Encode {
    fn encode(&self, out: &mut Vec<u8>);

    fn encode_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }
}

/// The inverse of `Encode`. Implementations must consume exactly the
/// bytes belonging to the value and advance `cursor` accordingly; they
/// must never peek past what they consume.
pub trait Decode: Sized {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self>;
}

/// Decodes a complete buffer, erroring if any bytes remain unconsumed —
/// the round-trip law's "unknown trailing bytes are an error" clause.
pub fn decode_complete<T: Decode>(bytes: &[u8]) -> Result<T> {
    let mut cursor = 0;
    let value = T::decode(bytes, &mut cursor)?;
    if cursor != bytes.len() {
        return Err(SerializationError::TrailingBytes(bytes.len() - cursor));
    }
    Ok(value)
}

impl Encode for u64 {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, *self);
    }
}

impl Decode for u64 {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        read_varint(bytes, cursor)
    }
}

impl Encode for [u8; 32] {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl Decode for [u8; 32] {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        read_fixed_bytes(bytes, cursor)
    }
}

impl Encode for u32 {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, u64::from(*self));
    }
}

impl Decode for u32 {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let value = read_varint(bytes, cursor)?;
        u32::try_from(value).map_err(|_| SerializationError::VarintOverflow)
    }
}

pub fn read_fixed_bytes<const N: usize>(bytes: &[u8], cursor: &mut usize) -> Result<[u8; N]> {
    let slice = bytes
        .get(*cursor..*cursor + N)
        .ok_or(SerializationError::UnexpectedEof)?;
    *cursor += N;
    let mut out = [0u8; N];
    out.copy_from_slice(slice);
    Ok(out)
}

pub fn write_fixed_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes);
}

/// Writes a length-prefixed (varint) byte blob.
pub fn write_varint_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

/// Reads a length-prefixed (varint) byte blob, bounded by `max_len` so a
/// corrupt length field can't drive an unbounded allocation.
pub fn read_varint_bytes(bytes: &[u8], cursor: &mut usize, max_len: u64) -> Result<Vec<u8>> {
    let len = read_varint(bytes, cursor)?;
    if len > max_len {
        return Err(SerializationError::LengthLimitExceeded(len));
    }
    let len = len as usize;
    let slice = bytes
        .get(*cursor..*cursor + len)
        .ok_or(SerializationError::UnexpectedEof)?;
    *cursor += len;
    Ok(slice.to_vec())
}

/// Writes a varint-length-prefixed homogeneous container.
pub fn write_container<T: Encode>(out: &mut Vec<u8>, items: &[T]) {
    write_varint(out, items.len() as u64);
    for item in items {
        item.encode(out);
    }
}

/// Reads a varint-length-prefixed homogeneous container, bounded by
/// `max_len` elements.
pub fn read_container<T: Decode>(bytes: &[u8], cursor: &mut usize, max_len: u64) -> Result<Vec<T>> {
    let len = read_varint(bytes, cursor)?;
    if len > max_len {
        return Err(SerializationError::LengthLimitExceeded(len));
    }
    let mut items = Vec::with_capacity(len.min(4096) as usize);
    for _ in 0..len {
        items.push(T::decode(bytes, cursor)?);
    }
    Ok(items)
}

/// Writes a single-byte tag ahead of a variant's body, per the "variant
/// types are tag-prefixed" rule.
pub fn write_tag(out: &mut Vec<u8>, tag: u8) {
    out.push(tag);
}

pub fn read_tag(bytes: &[u8], cursor: &mut usize) -> Result<u8> {
    let tag = *bytes
        .get(*cursor)
        .ok_or(SerializationError::UnexpectedEof)?;
    *cursor += 1;
    Ok(tag)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u64_roundtrips() {
        let encoded = 123_456_789u64.encode_to_vec();
        let decoded: u64 = decode_complete(&encoded).unwrap();
        assert_eq!(decoded, 123_456_789);
    }

    #[test]
    fn container_roundtrips() {
        let items: Vec<u32> = vec![1, 2, 3, 4];
        let mut out = Vec::new();
        write_container(&mut out, &items);
        let mut cursor = 0;
        let decoded: Vec<u32> = read_container(&out, &mut cursor, 1024).unwrap();
        assert_eq!(decoded, items);
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        let mut encoded = 5u64.encode_to_vec();
        encoded.push(0xff);
        let result: Result<u64> = decode_complete(&encoded);
        assert!(matches!(result, Err(SerializationError::TrailingBytes(1))));
    }

    #[test]
    fn container_rejects_oversized_length_prefix() {
        let mut out = Vec::new();
        write_varint(&mut out, 10_000);
        let mut cursor = 0;
        let result: Result<Vec<u32>> = read_container(&out, &mut cursor, 16);
        assert!(matches!(
            result,
            Err(SerializationError::LengthLimitExceeded(10_000))
        ));
    }
}
