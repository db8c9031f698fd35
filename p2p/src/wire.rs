//! Levin frame format (§6): an 8-byte signature, a varint payload length,
//! a flags byte distinguishing request/response/notify, a command id and
//! return code, and a canonically-encoded payload.

use cryptonote_serial::error::SerializationError;
use cryptonote_serial::io::{read_varint_bytes, write_varint_bytes};
use cryptonote_serial::varint::{read_varint, write_varint};

use crate::error::{ProtocolError, Result};

pub const LEVIN_SIGNATURE: [u8; 8] = *b"CNLEVIN\0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Flags {
    Request = 0,
    Response = 1,
    Notify = 2,
}

impl Flags {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Flags::Request),
            1 => Ok(Flags::Response),
            2 => Ok(Flags::Notify),
            other => Err(SerializationError::UnknownTag(other).into()),
        }
    }
}

/// Fixed numeric command ids (§4.6). Values are this workspace's own
/// assignment; only internal consistency between peers running this
/// code is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum CommandId {
    Handshake = 1001,
    TimedSync = 1002,
    Ping = 1003,
    RequestChain = 2006,
    ResponseChainEntry = 2007,
    RequestGetObjects = 2001,
    ResponseGetObjects = 2002,
    NewBlock = 2003,
    NewLiteBlock = 2008,
    MissingTxs = 2009,
    NewTransactions = 2004,
    RequestTxPool = 2005,
}

impl CommandId {
    fn from_u32(value: u32) -> Result<Self> {
        Ok(match value {
            1001 => CommandId::Handshake,
            1002 => CommandId::TimedSync,
            1003 => CommandId::Ping,
            2006 => CommandId::RequestChain,
            2007 => CommandId::ResponseChainEntry,
            2001 => CommandId::RequestGetObjects,
            2002 => CommandId::ResponseGetObjects,
            2003 => CommandId::NewBlock,
            2008 => CommandId::NewLiteBlock,
            2009 => CommandId::MissingTxs,
            2004 => CommandId::NewTransactions,
            2005 => CommandId::RequestTxPool,
            other => return Err(SerializationError::UnknownTag((other % 256) as u8).into()),
        })
    }
}

/// A decoded Levin frame: command, direction, status and raw payload
/// bytes (the payload is decoded into a concrete command struct by the
/// caller, once the command id tells it which type to expect).
#[derive(Debug, Clone)]
pub struct Frame {
    pub command: CommandId,
    pub flags: Flags,
    pub return_code: i32,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn encode(&self, max_packet_size: u32) -> Result<Vec<u8>> {
        if self.payload.len() as u64 > u64::from(max_packet_size) {
            return Err(ProtocolError::FrameTooLarge(self.payload.len() as u32));
        }
        let mut out = Vec::with_capacity(8 + self.payload.len() + 16);
        out.extend_from_slice(&LEVIN_SIGNATURE);
        write_varint(&mut out, self.command as u64);
        out.push(self.flags as u8);
        out.extend_from_slice(&self.return_code.to_le_bytes());
        write_varint_bytes(&mut out, &self.payload);
        Ok(out)
    }

    /// Decodes one frame from the front of `bytes`, returning the frame
    /// and the number of bytes consumed. Returns `Ok(None)` if `bytes`
    /// doesn't yet contain a complete frame (the caller should read more).
    pub fn decode(bytes: &[u8], max_packet_size: u32) -> Result<Option<(Frame, usize)>> {
        if bytes.len() < 8 {
            return Ok(None);
        }
        if bytes[0..8] != LEVIN_SIGNATURE {
            return Err(SerializationError::UnknownTag(bytes[0]).into());
        }
        let mut cursor = 8usize;
        let command = match read_varint(bytes, &mut cursor) {
            Ok(v) => v,
            Err(_) => return Ok(None),
        };
        if cursor + 5 > bytes.len() {
            return Ok(None);
        }
        let flags = bytes[cursor];
        cursor += 1;
        let return_code = i32::from_le_bytes(bytes[cursor..cursor + 4].try_into().unwrap());
        cursor += 4;

        let payload_len_start = cursor;
        let payload = match read_varint_bytes(bytes, &mut cursor, u64::from(max_packet_size)) {
            Ok(p) => p,
            Err(SerializationError::UnexpectedEof) => return Ok(None),
            Err(other) => {
                let _ = payload_len_start;
                return Err(other.into());
            }
        };

        let frame = Frame {
            command: CommandId::from_u32(u32::try_from(command).unwrap_or(u32::MAX))?,
            flags: Flags::from_u8(flags)?,
            return_code,
            payload,
        };
        Ok(Some((frame, cursor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_frame_round_trips_through_encode_and_decode() {
        let frame = Frame {
            command: CommandId::Ping,
            flags: Flags::Request,
            return_code: 0,
            payload: vec![1, 2, 3, 4],
        };
        let encoded = frame.encode(1 << 20).unwrap();
        let (decoded, consumed) = Frame::decode(&encoded, 1 << 20).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(decoded.command, CommandId::Ping);
        assert_eq!(decoded.flags, Flags::Request);
        assert_eq!(decoded.payload, vec![1, 2, 3, 4]);
    }

    #[test]
    fn decode_reports_incomplete_frames_rather_than_erroring() {
        let frame = Frame {
            command: CommandId::Handshake,
            flags: Flags::Response,
            return_code: 0,
            payload: vec![9; 64],
        };
        let encoded = frame.encode(1 << 20).unwrap();
        let partial = &encoded[..encoded.len() - 1];
        assert!(Frame::decode(partial, 1 << 20).unwrap().is_none());
    }

    #[test]
    fn decode_rejects_an_oversized_claimed_payload() {
        let frame = Frame {
            command: CommandId::NewBlock,
            flags: Flags::Notify,
            return_code: 0,
            payload: vec![0; 100],
        };
        let encoded = frame.encode(1 << 20).unwrap();
        assert!(Frame::decode(&encoded, 10).is_err());
    }

    #[test]
    fn a_bad_signature_is_rejected() {
        let mut bytes = vec![0u8; 20];
        bytes[0] = 0xff;
        assert!(Frame::decode(&bytes, 1 << 20).is_err());
    }
}
