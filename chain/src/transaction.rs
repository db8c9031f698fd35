//! Transaction data model (§3): tagged input/output sum types, the
//! transaction prefix, and the full transaction (prefix plus one ring
//! signature list per input).

use cryptonote_crypto::{KeyImage, PublicKey, Signature};
use cryptonote_serial::error::{Result, SerializationError};
use cryptonote_serial::io::{
    read_container, read_fixed_bytes, read_varint_bytes, write_container, write_varint_bytes,
    Decode, Encode,
};
use cryptonote_serial::varint::{read_varint, write_varint};

use crate::types::{Amount, Height};

const MAX_RING_SIZE: u64 = 1024;
const MAX_EXTRA_LEN: u64 = 1 << 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Coinbase {
        height: Height,
    },
    Key {
        amount: Amount,
        /// Stored relative; each entry is the delta from the previous
        /// absolute global index (the first is absolute).
        ring_offsets: Vec<u64>,
        key_image: KeyImage,
    },
    Multisig {
        amount: Amount,
        signature_count: u32,
        output_index: u32,
    },
}

const INPUT_TAG_COINBASE: u8 = 0xff;
const INPUT_TAG_KEY: u8 = 0x02;
const INPUT_TAG_MULTISIG: u8 = 0x03;

impl Input {
    /// Expands the stored relative ring offsets into strictly increasing
    /// absolute global output indexes (an input invariant in §3).
    pub fn absolute_ring_indexes(&self) -> Result<Vec<u64>> {
        match self {
            Input::Key { ring_offsets, .. } => {
                let mut absolute = Vec::with_capacity(ring_offsets.len());
                let mut running: u64 = 0;
                for (i, delta) in ring_offsets.iter().enumerate() {
                    running = if i == 0 {
                        *delta
                    } else {
                        running
                            .checked_add(*delta)
                            .ok_or(SerializationError::VarintOverflow)?
                    };
                    absolute.push(running);
                }
                Ok(absolute)
            }
            _ => Ok(Vec::new()),
        }
    }
}

impl Encode for Input {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Input::Coinbase { height } => {
                out.push(INPUT_TAG_COINBASE);
                write_varint(out, u64::from(*height));
            }
            Input::Key {
                amount,
                ring_offsets,
                key_image,
            } => {
                out.push(INPUT_TAG_KEY);
                write_varint(out, *amount);
                write_varint(out, ring_offsets.len() as u64);
                for offset in ring_offsets {
                    write_varint(out, *offset);
                }
                out.extend_from_slice(key_image.as_bytes());
            }
            Input::Multisig {
                amount,
                signature_count,
                output_index,
            } => {
                out.push(INPUT_TAG_MULTISIG);
                write_varint(out, *amount);
                write_varint(out, u64::from(*signature_count));
                write_varint(out, u64::from(*output_index));
            }
        }
    }
}

impl Decode for Input {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let tag = *bytes
            .get(*cursor)
            .ok_or(SerializationError::UnexpectedEof)?;
        *cursor += 1;
        match tag {
            INPUT_TAG_COINBASE => {
                let height = read_varint(bytes, cursor)?;
                let height = u32::try_from(height).map_err(|_| SerializationError::VarintOverflow)?;
                Ok(Input::Coinbase { height })
            }
            INPUT_TAG_KEY => {
                let amount = read_varint(bytes, cursor)?;
                let ring_len = read_varint(bytes, cursor)?;
                if ring_len > MAX_RING_SIZE {
                    return Err(SerializationError::LengthLimitExceeded(ring_len));
                }
                let mut ring_offsets = Vec::with_capacity(ring_len as usize);
                for _ in 0..ring_len {
                    ring_offsets.push(read_varint(bytes, cursor)?);
                }
                let key_image = KeyImage::from_bytes(read_fixed_bytes(bytes, cursor)?);
                Ok(Input::Key {
                    amount,
                    ring_offsets,
                    key_image,
                })
            }
            INPUT_TAG_MULTISIG => {
                let amount = read_varint(bytes, cursor)?;
                let signature_count = u32::try_from(read_varint(bytes, cursor)?)
                    .map_err(|_| SerializationError::VarintOverflow)?;
                let output_index = u32::try_from(read_varint(bytes, cursor)?)
                    .map_err(|_| SerializationError::VarintOverflow)?;
                Ok(Input::Multisig {
                    amount,
                    signature_count,
                    output_index,
                })
            }
            other => Err(SerializationError::UnknownTag(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Key {
        one_time_public_key: PublicKey,
    },
    Multisig {
        keys: Vec<PublicKey>,
        required_signatures: u32,
    },
}

const OUTPUT_TAG_KEY: u8 = 0x02;
const OUTPUT_TAG_MULTISIG: u8 = 0x03;

impl Encode for Output {
    fn encode(&self, out: &mut Vec<u8>) {
        match self {
            Output::Key { one_time_public_key } => {
                out.push(OUTPUT_TAG_KEY);
                out.extend_from_slice(one_time_public_key.as_bytes());
            }
            Output::Multisig {
                keys,
                required_signatures,
            } => {
                out.push(OUTPUT_TAG_MULTISIG);
                write_varint(out, keys.len() as u64);
                for key in keys {
                    out.extend_from_slice(key.as_bytes());
                }
                write_varint(out, u64::from(*required_signatures));
            }
        }
    }
}

impl Decode for Output {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let tag = *bytes
            .get(*cursor)
            .ok_or(SerializationError::UnexpectedEof)?;
        *cursor += 1;
        match tag {
            OUTPUT_TAG_KEY => Ok(Output::Key {
                one_time_public_key: PublicKey::from_bytes(read_fixed_bytes(bytes, cursor)?),
            }),
            OUTPUT_TAG_MULTISIG => {
                let key_count = read_varint(bytes, cursor)?;
                if key_count > MAX_RING_SIZE {
                    return Err(SerializationError::LengthLimitExceeded(key_count));
                }
                let mut keys = Vec::with_capacity(key_count as usize);
                for _ in 0..key_count {
                    keys.push(PublicKey::from_bytes(read_fixed_bytes(bytes, cursor)?));
                }
                let required_signatures = u32::try_from(read_varint(bytes, cursor)?)
                    .map_err(|_| SerializationError::VarintOverflow)?;
                Ok(Output::Multisig {
                    keys,
                    required_signatures,
                })
            }
            other => Err(SerializationError::UnknownTag(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub amount: Amount,
    pub target: Output,
}

impl Encode for TxOutput {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, self.amount);
        self.target.encode(out);
    }
}

impl Decode for TxOutput {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let amount = read_varint(bytes, cursor)?;
        let target = Output::decode(bytes, cursor)?;
        Ok(TxOutput { amount, target })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionPrefix {
    pub version: u8,
    pub unlock_time: u64,
    pub inputs: Vec<Input>,
    pub outputs: Vec<TxOutput>,
    pub extra: Vec<u8>,
}

impl Encode for TransactionPrefix {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        write_varint(out, self.unlock_time);
        write_container(out, &self.inputs);
        write_container(out, &self.outputs);
        write_varint_bytes(out, &self.extra);
    }
}

impl Decode for TransactionPrefix {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let version = *bytes
            .get(*cursor)
            .ok_or(SerializationError::UnexpectedEof)?;
        *cursor += 1;
        let unlock_time = read_varint(bytes, cursor)?;
        let inputs = read_container(bytes, cursor, MAX_RING_SIZE)?;
        let outputs = read_container(bytes, cursor, MAX_RING_SIZE)?;
        let extra = read_varint_bytes(bytes, cursor, MAX_EXTRA_LEN)?;
        Ok(TransactionPrefix {
            version,
            unlock_time,
            inputs,
            outputs,
            extra,
        })
    }
}

impl TransactionPrefix {
    #[must_use]
    pub fn sum_inputs(&self) -> u128 {
        self.inputs
            .iter()
            .map(|i| match i {
                Input::Coinbase { .. } => 0,
                Input::Key { amount, .. } | Input::Multisig { amount, .. } => u128::from(*amount),
            })
            .sum()
    }

    #[must_use]
    pub fn sum_outputs(&self) -> u128 {
        self.outputs.iter().map(|o| u128::from(o.amount)).sum()
    }

    #[must_use]
    pub fn is_coinbase(&self) -> bool {
        matches!(self.inputs.as_slice(), [Input::Coinbase { .. }])
    }

    /// A fusion transaction: zero-fee, many-inputs-to-few-outputs. The
    /// precise consolidation ratio is left to the caller's policy; here
    /// we only check the defining property used by the pool (§4.5):
    /// `sum(inputs) == sum(outputs)`.
    #[must_use]
    pub fn is_fusion_transaction(&self) -> bool {
        !self.is_coinbase() && self.sum_inputs() == self.sum_outputs()
    }

    #[must_use]
    pub fn fee(&self) -> u128 {
        self.sum_inputs().saturating_sub(self.sum_outputs())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub prefix: TransactionPrefix,
    /// One ring-signature list per input; coinbase inputs carry none.
    pub signatures: Vec<Vec<Signature>>,
}

impl Encode for Transaction {
    fn encode(&self, out: &mut Vec<u8>) {
        self.prefix.encode(out);
        write_varint(out, self.signatures.len() as u64);
        for ring in &self.signatures {
            write_varint(out, ring.len() as u64);
            for sig in ring {
                out.extend_from_slice(&sig.0);
            }
        }
    }
}

impl Decode for Transaction {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let prefix = TransactionPrefix::decode(bytes, cursor)?;
        let ring_count = read_varint(bytes, cursor)?;
        if ring_count > MAX_RING_SIZE {
            return Err(SerializationError::LengthLimitExceeded(ring_count));
        }
        let mut signatures = Vec::with_capacity(ring_count as usize);
        for _ in 0..ring_count {
            let sig_count = read_varint(bytes, cursor)?;
            if sig_count > MAX_RING_SIZE {
                return Err(SerializationError::LengthLimitExceeded(sig_count));
            }
            let mut ring = Vec::with_capacity(sig_count as usize);
            for _ in 0..sig_count {
                let bytes64: [u8; 64] = read_fixed_bytes(bytes, cursor)?;
                ring.push(Signature(bytes64));
            }
            signatures.push(ring);
        }
        Ok(Transaction { prefix, signatures })
    }
}

impl Transaction {
    #[must_use]
    pub fn hash(&self) -> [u8; 32] {
        cryptonote_serial::hash::object_hash(self)
    }

    #[must_use]
    pub fn prefix_hash(&self) -> [u8; 32] {
        cryptonote_serial::hash::object_hash(&self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptonote_serial::io::decode_complete;

    #[test]
    fn ring_offsets_expand_to_strictly_increasing_indexes() {
        let input = Input::Key {
            amount: 1,
            ring_offsets: vec![3, 2, 5],
            key_image: KeyImage::zero(),
        };
        assert_eq!(input.absolute_ring_indexes().unwrap(), vec![3, 5, 10]);
    }

    #[test]
    fn transaction_prefix_roundtrips() {
        let prefix = TransactionPrefix {
            version: 1,
            unlock_time: 0,
            inputs: vec![Input::Coinbase { height: 7 }],
            outputs: vec![TxOutput {
                amount: 1000,
                target: Output::Key {
                    one_time_public_key: PublicKey::zero(),
                },
            }],
            extra: vec![1, 2, 3],
        };
        let encoded = prefix.encode_to_vec();
        let decoded: TransactionPrefix = decode_complete(&encoded).unwrap();
        assert_eq!(decoded, prefix);
    }

    #[test]
    fn fee_is_the_difference_between_inputs_and_outputs() {
        let prefix = TransactionPrefix {
            version: 1,
            unlock_time: 0,
            inputs: vec![Input::Key {
                amount: 100,
                ring_offsets: vec![1],
                key_image: KeyImage::zero(),
            }],
            outputs: vec![TxOutput {
                amount: 90,
                target: Output::Key {
                    one_time_public_key: PublicKey::zero(),
                },
            }],
            extra: vec![],
        };
        assert_eq!(prefix.fee(), 10);
    }
}
