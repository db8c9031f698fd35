//! Transaction-extra field parsing (§3, bit-exact tags). The field is an
//! opaque byte string holding a sequence of tag-prefixed sub-fields; any
//! ordering is tolerated, but the public-key, payment-id/padding, nonce
//! and merge-mining tags may each appear at most once.

use cryptonote_serial::error::{Result, SerializationError};
use cryptonote_serial::varint::read_varint;

pub const TAG_PADDING: u8 = 0x00;
pub const TAG_PUBKEY: u8 = 0x01;
pub const TAG_NONCE: u8 = 0x02;
pub const TAG_MERGE_MINING: u8 = 0x03;
pub const TAG_ENCRYPTED_MESSAGE: u8 = 0x04;
pub const TAG_TTL: u8 = 0x05;
pub const TAG_SENDER: u8 = 0x06;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtraField {
    /// `0x00`: payment-id nonce / padding byte string.
    Padding(Vec<u8>),
    /// `0x01`: the transaction's one-time public key.
    PublicKey([u8; 32]),
    /// `0x02`: an opaque, length-prefixed extra nonce (max 255 bytes).
    Nonce(Vec<u8>),
    /// `0x03`: merge-mining tag (opaque payload; depth/hash not modeled
    /// here since merge-mining is outside this core's scope).
    MergeMining(Vec<u8>),
    /// `0x04`: project-local encrypted message.
    EncryptedMessage(Vec<u8>),
    /// `0x05`: project-local TTL, varint seconds.
    Ttl(u64),
    /// `0x06`: project-local sender tag.
    Sender(Vec<u8>),
    /// Any tag this parser doesn't recognize; preserved verbatim so
    /// re-encoding is lossless.
    Unknown { tag: u8, payload: Vec<u8> },
}

fn read_length_prefixed(bytes: &[u8], cursor: &mut usize, max_len: usize) -> Result<Vec<u8>> {
    let len = read_varint(bytes, cursor)? as usize;
    if len > max_len {
        return Err(SerializationError::LengthLimitExceeded(len as u64));
    }
    let slice = bytes
        .get(*cursor..*cursor + len)
        .ok_or(SerializationError::UnexpectedEof)?;
    *cursor += len;
    Ok(slice.to_vec())
}

/// Parses every sub-field out of a raw `extra` byte string. Tolerates any
/// ordering; does not itself enforce uniqueness (see `validate`).
pub fn parse_extra(extra: &[u8]) -> Result<Vec<ExtraField>> {
    let mut fields = Vec::new();
    let mut cursor = 0;
    while cursor < extra.len() {
        let tag = extra[cursor];
        cursor += 1;
        let field = match tag {
            TAG_PADDING => ExtraField::Padding(read_length_prefixed(extra, &mut cursor, 255)?),
            TAG_PUBKEY => {
                let slice = extra
                    .get(cursor..cursor + 32)
                    .ok_or(SerializationError::UnexpectedEof)?;
                cursor += 32;
                let mut key = [0u8; 32];
                key.copy_from_slice(slice);
                ExtraField::PublicKey(key)
            }
            TAG_NONCE => ExtraField::Nonce(read_length_prefixed(extra, &mut cursor, 255)?),
            TAG_MERGE_MINING => {
                ExtraField::MergeMining(read_length_prefixed(extra, &mut cursor, 255)?)
            }
            TAG_ENCRYPTED_MESSAGE => {
                ExtraField::EncryptedMessage(read_length_prefixed(extra, &mut cursor, 255)?)
            }
            TAG_TTL => ExtraField::Ttl(read_varint(extra, &mut cursor)?),
            TAG_SENDER => ExtraField::Sender(read_length_prefixed(extra, &mut cursor, 255)?),
            other => ExtraField::Unknown {
                tag: other,
                payload: read_length_prefixed(extra, &mut cursor, 255)?,
            },
        };
        fields.push(field);
    }
    Ok(fields)
}

/// Enforces the at-most-once constraint on pubkey/padding/nonce/merge-mining.
pub fn validate_uniqueness(fields: &[ExtraField]) -> Result<()> {
    let mut seen_pubkey = false;
    let mut seen_padding = false;
    let mut seen_nonce = false;
    let mut seen_merge_mining = false;
    for field in fields {
        let (flag, tag) = match field {
            ExtraField::PublicKey(_) => (&mut seen_pubkey, TAG_PUBKEY),
            ExtraField::Padding(_) => (&mut seen_padding, TAG_PADDING),
            ExtraField::Nonce(_) => (&mut seen_nonce, TAG_NONCE),
            ExtraField::MergeMining(_) => (&mut seen_merge_mining, TAG_MERGE_MINING),
            _ => continue,
        };
        if *flag {
            return Err(SerializationError::UnknownTag(tag));
        }
        *flag = true;
    }
    Ok(())
}

/// Extracts the transaction public key, if present.
#[must_use]
pub fn find_public_key(fields: &[ExtraField]) -> Option<[u8; 32]> {
    fields.iter().find_map(|f| match f {
        ExtraField::PublicKey(key) => Some(*key),
        _ => None,
    })
}

/// Extracts the 32-byte payment id, if the padding field carries one
/// rather than being pure zero-padding.
#[must_use]
pub fn find_payment_id(fields: &[ExtraField]) -> Option<[u8; 32]> {
    fields.iter().find_map(|f| match f {
        ExtraField::Padding(payload) if payload.len() == 32 => {
            let mut id = [0u8; 32];
            id.copy_from_slice(payload);
            Some(id)
        }
        _ => None,
    })
}

/// Extracts the TTL in seconds, if present.
#[must_use]
pub fn find_ttl(fields: &[ExtraField]) -> Option<u64> {
    fields.iter().find_map(|f| match f {
        ExtraField::Ttl(seconds) => Some(*seconds),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pubkey_and_ttl_in_either_order() {
        let mut extra = vec![TAG_PUBKEY];
        extra.extend_from_slice(&[9u8; 32]);
        extra.push(TAG_TTL);
        extra.push(42); // varint(42)

        let fields = parse_extra(&extra).unwrap();
        assert_eq!(find_public_key(&fields), Some([9u8; 32]));
        assert_eq!(find_ttl(&fields), Some(42));
        assert!(validate_uniqueness(&fields).is_ok());
    }

    #[test]
    fn rejects_duplicate_public_key_tag() {
        let mut extra = vec![TAG_PUBKEY];
        extra.extend_from_slice(&[1u8; 32]);
        extra.push(TAG_PUBKEY);
        extra.extend_from_slice(&[2u8; 32]);

        let fields = parse_extra(&extra).unwrap();
        assert!(validate_uniqueness(&fields).is_err());
    }

    #[test]
    fn tolerates_unknown_tags() {
        let extra = vec![0x7f, 0x02, 0xaa, 0xbb];
        let fields = parse_extra(&extra).unwrap();
        assert_eq!(
            fields,
            vec![ExtraField::Unknown {
                tag: 0x7f,
                payload: vec![0xaa, 0xbb]
            }]
        );
    }
}
