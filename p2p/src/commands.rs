//! Payload structs for the twelve fixed commands of §4.6, each a
//! canonical object encoding over the named fields.

use cryptonote_serial::error::{Result, SerializationError};
use cryptonote_serial::io::{
    read_container, read_fixed_bytes, read_varint_bytes, write_container, write_varint_bytes,
    Decode, Encode,
};
use cryptonote_serial::varint::{read_varint, write_varint};

pub type BlockId = [u8; 32];
pub type TxId = [u8; 32];

const MAX_LIST_LEN: u64 = 1 << 20;
const MAX_BLOB_LEN: u64 = 64 * 1024 * 1024;

fn write_blob_container(out: &mut Vec<u8>, blobs: &[Vec<u8>]) {
    write_varint(out, blobs.len() as u64);
    for blob in blobs {
        write_varint_bytes(out, blob);
    }
}

fn read_blob_container(bytes: &[u8], cursor: &mut usize) -> Result<Vec<Vec<u8>>> {
    let len = read_varint(bytes, cursor)?;
    if len > MAX_LIST_LEN {
        return Err(SerializationError::LengthLimitExceeded(len));
    }
    let mut out = Vec::with_capacity(len.min(4096) as usize);
    for _ in 0..len {
        out.push(read_varint_bytes(bytes, cursor, MAX_BLOB_LEN)?);
    }
    Ok(out)
}

/// A raw block bundled with the raw bytes of every one of its
/// transactions, exactly as stored by the blockchain cache and exchanged
/// over `REQUEST_GET_OBJECTS`/`RESPONSE_GET_OBJECTS`/`NEW_BLOCK`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    pub block: Vec<u8>,
    pub transactions: Vec<Vec<u8>>,
}

impl Encode for RawBlock {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint_bytes(out, &self.block);
        write_blob_container(out, &self.transactions);
    }
}

impl Decode for RawBlock {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let block = read_varint_bytes(bytes, cursor, MAX_BLOB_LEN)?;
        let transactions = read_blob_container(bytes, cursor)?;
        Ok(RawBlock { block, transactions })
    }
}

/// An entry in a peer's gossiped peer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerEntry {
    pub ip: u32,
    pub port: u16,
    pub peer_id: u64,
    pub last_seen: u64,
}

impl Encode for PeerEntry {
    fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.ip.to_le_bytes());
        out.extend_from_slice(&self.port.to_le_bytes());
        out.extend_from_slice(&self.peer_id.to_le_bytes());
        write_varint(out, self.last_seen);
    }
}

impl Decode for PeerEntry {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let ip = u32::from_le_bytes(read_fixed_bytes(bytes, cursor)?);
        let port = u16::from_le_bytes(read_fixed_bytes(bytes, cursor)?);
        let peer_id = u64::from_le_bytes(read_fixed_bytes(bytes, cursor)?);
        let last_seen = read_varint(bytes, cursor)?;
        Ok(PeerEntry { ip, port, peer_id, last_seen })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeData {
    pub version: u8,
    pub network_id: [u8; 16],
    pub peer_id: u64,
    pub my_port: u32,
    pub local_time: u64,
    pub node_version: String,
}

impl Encode for NodeData {
    fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.version);
        out.extend_from_slice(&self.network_id);
        out.extend_from_slice(&self.peer_id.to_le_bytes());
        out.extend_from_slice(&self.my_port.to_le_bytes());
        write_varint(out, self.local_time);
        write_varint_bytes(out, self.node_version.as_bytes());
    }
}

impl Decode for NodeData {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let version = *bytes.get(*cursor).ok_or(SerializationError::UnexpectedEof)?;
        *cursor += 1;
        let network_id = read_fixed_bytes(bytes, cursor)?;
        let peer_id = u64::from_le_bytes(read_fixed_bytes(bytes, cursor)?);
        let my_port = u32::from_le_bytes(read_fixed_bytes(bytes, cursor)?);
        let local_time = read_varint(bytes, cursor)?;
        let node_version = String::from_utf8(read_varint_bytes(bytes, cursor, 256)?)
            .map_err(|_| SerializationError::InvalidUtf8)?;
        Ok(NodeData { version, network_id, peer_id, my_port, local_time, node_version })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreSyncData {
    pub current_height: u32,
    pub top_id: BlockId,
}

impl Encode for CoreSyncData {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, u64::from(self.current_height));
        out.extend_from_slice(&self.top_id);
    }
}

impl Decode for CoreSyncData {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let current_height = u32::try_from(read_varint(bytes, cursor)?)
            .map_err(|_| SerializationError::VarintOverflow)?;
        let top_id = read_fixed_bytes(bytes, cursor)?;
        Ok(CoreSyncData { current_height, top_id })
    }
}

macro_rules! payload {
    ($name:ident { $($field:ident : $ty:ty),* $(,)? }) => {
        #[derive(Debug, Clone, PartialEq, Eq)]
        pub struct $name {
            $(pub $field: $ty),*
        }
    };
}

payload!(HandshakeRequest {
    node_data: NodeData,
    sync_data: CoreSyncData,
    local_peer_list: Vec<PeerEntry>,
});

/// The handshake response carries the same fields as the request; the
/// two are told apart by the frame's `Flags`, not by a distinct shape.
pub type HandshakeResponse = HandshakeRequest;

impl Encode for HandshakeRequest {
    fn encode(&self, out: &mut Vec<u8>) {
        self.node_data.encode(out);
        self.sync_data.encode(out);
        write_container(out, &self.local_peer_list);
    }
}

impl Decode for HandshakeRequest {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        Ok(HandshakeRequest {
            node_data: NodeData::decode(bytes, cursor)?,
            sync_data: CoreSyncData::decode(bytes, cursor)?,
            local_peer_list: read_container(bytes, cursor, MAX_LIST_LEN)?,
        })
    }
}

payload!(TimedSync {
    sync_data: CoreSyncData,
    local_peer_list: Vec<PeerEntry>,
    local_time: u64,
});

impl Encode for TimedSync {
    fn encode(&self, out: &mut Vec<u8>) {
        self.sync_data.encode(out);
        write_container(out, &self.local_peer_list);
        write_varint(out, self.local_time);
    }
}

impl Decode for TimedSync {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        Ok(TimedSync {
            sync_data: CoreSyncData::decode(bytes, cursor)?,
            local_peer_list: read_container(bytes, cursor, MAX_LIST_LEN)?,
            local_time: read_varint(bytes, cursor)?,
        })
    }
}

payload!(Ping {
    status: String,
    peer_id: u64,
});

impl Encode for Ping {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint_bytes(out, self.status.as_bytes());
        out.extend_from_slice(&self.peer_id.to_le_bytes());
    }
}

impl Decode for Ping {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let status = String::from_utf8(read_varint_bytes(bytes, cursor, 64)?)
            .map_err(|_| SerializationError::InvalidUtf8)?;
        let peer_id = u64::from_le_bytes(read_fixed_bytes(bytes, cursor)?);
        Ok(Ping { status, peer_id })
    }
}

payload!(RequestChain {
    block_ids: Vec<BlockId>,
});

impl Encode for RequestChain {
    fn encode(&self, out: &mut Vec<u8>) {
        write_container(out, &self.block_ids);
    }
}

impl Decode for RequestChain {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        Ok(RequestChain { block_ids: read_container(bytes, cursor, MAX_LIST_LEN)? })
    }
}

payload!(ResponseChainEntry {
    start_height: u32,
    total_height: u32,
    ids: Vec<BlockId>,
});

impl Encode for ResponseChainEntry {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, u64::from(self.start_height));
        write_varint(out, u64::from(self.total_height));
        write_container(out, &self.ids);
    }
}

impl Decode for ResponseChainEntry {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let start_height =
            u32::try_from(read_varint(bytes, cursor)?).map_err(|_| SerializationError::VarintOverflow)?;
        let total_height =
            u32::try_from(read_varint(bytes, cursor)?).map_err(|_| SerializationError::VarintOverflow)?;
        let ids = read_container(bytes, cursor, MAX_LIST_LEN)?;
        Ok(ResponseChainEntry { start_height, total_height, ids })
    }
}

payload!(RequestGetObjects {
    blocks: Vec<BlockId>,
    txs: Vec<TxId>,
});

impl Encode for RequestGetObjects {
    fn encode(&self, out: &mut Vec<u8>) {
        write_container(out, &self.blocks);
        write_container(out, &self.txs);
    }
}

impl Decode for RequestGetObjects {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        Ok(RequestGetObjects {
            blocks: read_container(bytes, cursor, MAX_LIST_LEN)?,
            txs: read_container(bytes, cursor, MAX_LIST_LEN)?,
        })
    }
}

payload!(ResponseGetObjects {
    blocks: Vec<RawBlock>,
    txs: Vec<Vec<u8>>,
    missed_ids: Vec<BlockId>,
    current_blockchain_height: u32,
});

impl Encode for ResponseGetObjects {
    fn encode(&self, out: &mut Vec<u8>) {
        write_container(out, &self.blocks);
        write_blob_container(out, &self.txs);
        write_container(out, &self.missed_ids);
        write_varint(out, u64::from(self.current_blockchain_height));
    }
}

impl Decode for ResponseGetObjects {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let blocks = read_container(bytes, cursor, MAX_LIST_LEN)?;
        let txs = read_blob_container(bytes, cursor)?;
        let missed_ids = read_container(bytes, cursor, MAX_LIST_LEN)?;
        let current_blockchain_height =
            u32::try_from(read_varint(bytes, cursor)?).map_err(|_| SerializationError::VarintOverflow)?;
        Ok(ResponseGetObjects { blocks, txs, missed_ids, current_blockchain_height })
    }
}

payload!(NewBlock {
    block: RawBlock,
    current_blockchain_height: u32,
    hop: u32,
});

impl Encode for NewBlock {
    fn encode(&self, out: &mut Vec<u8>) {
        self.block.encode(out);
        write_varint(out, u64::from(self.current_blockchain_height));
        write_varint(out, u64::from(self.hop));
    }
}

impl Decode for NewBlock {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let block = RawBlock::decode(bytes, cursor)?;
        let current_blockchain_height =
            u32::try_from(read_varint(bytes, cursor)?).map_err(|_| SerializationError::VarintOverflow)?;
        let hop = u32::try_from(read_varint(bytes, cursor)?).map_err(|_| SerializationError::VarintOverflow)?;
        Ok(NewBlock { block, current_blockchain_height, hop })
    }
}

payload!(NewLiteBlock {
    block_template: Vec<u8>,
    current_blockchain_height: u32,
    hop: u32,
});

impl Encode for NewLiteBlock {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint_bytes(out, &self.block_template);
        write_varint(out, u64::from(self.current_blockchain_height));
        write_varint(out, u64::from(self.hop));
    }
}

impl Decode for NewLiteBlock {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let block_template = read_varint_bytes(bytes, cursor, MAX_BLOB_LEN)?;
        let current_blockchain_height =
            u32::try_from(read_varint(bytes, cursor)?).map_err(|_| SerializationError::VarintOverflow)?;
        let hop = u32::try_from(read_varint(bytes, cursor)?).map_err(|_| SerializationError::VarintOverflow)?;
        Ok(NewLiteBlock { block_template, current_blockchain_height, hop })
    }
}

payload!(MissingTxs {
    current_blockchain_height: u32,
    block_hash: BlockId,
    missing_tx_ids: Vec<TxId>,
});

impl Encode for MissingTxs {
    fn encode(&self, out: &mut Vec<u8>) {
        write_varint(out, u64::from(self.current_blockchain_height));
        out.extend_from_slice(&self.block_hash);
        write_container(out, &self.missing_tx_ids);
    }
}

impl Decode for MissingTxs {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        let current_blockchain_height =
            u32::try_from(read_varint(bytes, cursor)?).map_err(|_| SerializationError::VarintOverflow)?;
        let block_hash = read_fixed_bytes(bytes, cursor)?;
        let missing_tx_ids = read_container(bytes, cursor, MAX_LIST_LEN)?;
        Ok(MissingTxs { current_blockchain_height, block_hash, missing_tx_ids })
    }
}

payload!(NewTransactions {
    txs: Vec<Vec<u8>>,
});

impl Encode for NewTransactions {
    fn encode(&self, out: &mut Vec<u8>) {
        write_blob_container(out, &self.txs);
    }
}

impl Decode for NewTransactions {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        Ok(NewTransactions { txs: read_blob_container(bytes, cursor)? })
    }
}

payload!(RequestTxPool {
    tx_ids: Vec<TxId>,
});

impl Encode for RequestTxPool {
    fn encode(&self, out: &mut Vec<u8>) {
        write_container(out, &self.tx_ids);
    }
}

impl Decode for RequestTxPool {
    fn decode(bytes: &[u8], cursor: &mut usize) -> Result<Self> {
        Ok(RequestTxPool { tx_ids: read_container(bytes, cursor, MAX_LIST_LEN)? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cryptonote_serial::io::decode_complete;

    #[test]
    fn handshake_request_round_trips() {
        let req = HandshakeRequest {
            node_data: NodeData {
                version: 1,
                network_id: [7u8; 16],
                peer_id: 42,
                my_port: 18080,
                local_time: 1_700_000_000,
                node_version: "core-0.1".to_string(),
            },
            sync_data: CoreSyncData { current_height: 1000, top_id: [1u8; 32] },
            local_peer_list: vec![PeerEntry { ip: 0x0100007f, port: 18080, peer_id: 1, last_seen: 10 }],
        };
        let encoded = req.encode_to_vec();
        let decoded: HandshakeRequest = decode_complete(&encoded).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn response_get_objects_round_trips_with_raw_blocks() {
        let rsp = ResponseGetObjects {
            blocks: vec![RawBlock { block: vec![1, 2, 3], transactions: vec![vec![4, 5], vec![6]] }],
            txs: vec![vec![9, 9]],
            missed_ids: vec![[3u8; 32]],
            current_blockchain_height: 500,
        };
        let encoded = rsp.encode_to_vec();
        let decoded: ResponseGetObjects = decode_complete(&encoded).unwrap();
        assert_eq!(decoded, rsp);
    }

    #[test]
    fn response_chain_entry_round_trips() {
        let entry = ResponseChainEntry { start_height: 0, total_height: 1000, ids: vec![[0u8; 32], [1u8; 32]] };
        let encoded = entry.encode_to_vec();
        let decoded: ResponseChainEntry = decode_complete(&encoded).unwrap();
        assert_eq!(decoded, entry);
    }
}
