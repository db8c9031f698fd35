//! Ties the wire format, peer state machine, chain sync, and peer list
//! together into the single entry point a connection's event loop
//! drives: decode one frame, update state, produce zero or more frames
//! to send back out.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use cryptonote_serial::io::{decode_complete, Encode};

use crate::commands::{
    HandshakeRequest, HandshakeResponse, MissingTxs, NewBlock, NewLiteBlock, NewTransactions, Ping,
    RawBlock, RequestChain, RequestGetObjects, RequestTxPool, ResponseChainEntry, ResponseGetObjects, TimedSync,
    TxId,
};
use crate::constants::{P2P_DEFAULT_PACKET_MAX_SIZE, P2P_LITE_BLOCKS_PROPAGATION_VERSION};
use crate::core::{Core, CoreChainView};
use crate::error::{ProtocolError, Result};
use crate::state::{Event, PeerState};
use crate::sync::{batch_for_get_objects, build_sparse_chain, reconcile_chain_entry};
use crate::wire::{CommandId, Flags, Frame};

/// A block template relayed via `NEW_LITE_BLOCK` whose referenced
/// transactions this node didn't already have — held until the sending
/// peer supplies them via `NEW_TRANSACTIONS`, or the connection is
/// dropped for failing to (§4.6 lite-block relay).
struct PendingLiteBlock {
    block_template: Vec<u8>,
    current_blockchain_height: u32,
    hop: u32,
    missing: HashSet<TxId>,
    collected: HashMap<TxId, Vec<u8>>,
}

struct PeerSession {
    state: PeerState,
    peer_id: u64,
    observed_height: u32,
    /// The peer's negotiated `NodeData.version`, used to decide whether a
    /// relayed block goes out as `NEW_LITE_BLOCK` or a full `NEW_BLOCK`.
    p2p_version: u8,
    pending_lite_block: Option<PendingLiteBlock>,
}

impl PeerSession {
    fn fresh() -> Self {
        PeerSession {
            state: PeerState::BeforeHandshake,
            peer_id: 0,
            observed_height: 0,
            p2p_version: 0,
            pending_lite_block: None,
        }
    }
}

/// One frame to deliver, and to whom.
pub enum Outbound {
    Send(SocketAddr, Frame),
    Drop(SocketAddr),
}

fn notify(command: CommandId, payload: &impl Encode) -> Frame {
    Frame { command, flags: Flags::Notify, return_code: 0, payload: payload.encode_to_vec() }
}

fn response(command: CommandId, payload: &impl Encode) -> Frame {
    Frame { command, flags: Flags::Response, return_code: 0, payload: payload.encode_to_vec() }
}

fn request(command: CommandId, payload: &impl Encode) -> Frame {
    Frame { command, flags: Flags::Request, return_code: 0, payload: payload.encode_to_vec() }
}

/// Drives every live connection against one shared [`Core`]. Stateless
/// across calls except for the per-peer session table and the observed
/// network height, both behind their own locks so connections can be
/// serviced concurrently.
pub struct ProtocolHandler {
    core: Arc<dyn Core>,
    peers: Mutex<HashMap<SocketAddr, PeerSession>>,
    observed_height: AtomicU32,
    my_peer_id: u64,
    node_version: String,
}

impl ProtocolHandler {
    #[must_use]
    pub fn new(core: Arc<dyn Core>, my_peer_id: u64, node_version: String) -> Self {
        ProtocolHandler { core, peers: Mutex::new(HashMap::new()), observed_height: AtomicU32::new(0), my_peer_id, node_version }
    }

    pub fn register_peer(&self, addr: SocketAddr) {
        self.peers.lock().unwrap().insert(addr, PeerSession::fresh());
    }

    pub fn drop_peer(&self, addr: SocketAddr) {
        self.peers.lock().unwrap().remove(&addr);
    }

    fn sync_data(&self) -> (u32, [u8; 32]) {
        (self.core.top_height(), self.core.top_block_hash())
    }

    fn update_observed_height(&self, peer_height: u32) {
        let mut current = self.observed_height.load(Ordering::Relaxed);
        while peer_height > current {
            match self.observed_height.compare_exchange_weak(
                current,
                peer_height,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    tracing::info!(peer_height, "observed height updated");
                    break;
                }
                Err(actual) => current = actual,
            }
        }
    }

    #[must_use]
    pub fn observed_height(&self) -> u32 {
        self.observed_height.load(Ordering::Relaxed)
    }

    fn transition(&self, addr: SocketAddr, event: Event) -> Result<PeerState> {
        let mut peers = self.peers.lock().unwrap();
        let session = peers.get_mut(&addr).ok_or(ProtocolError::OutOfOrder)?;
        session.state = session.state.apply(event);
        Ok(session.state)
    }

    /// Decodes and dispatches one inbound frame, returning the frames
    /// (if any) to write back to `addr` or to other peers.
    pub fn handle_frame(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        match frame.command {
            CommandId::Handshake => match frame.flags {
                Flags::Request => self.on_handshake_request(addr, frame),
                Flags::Response => self.on_handshake_response(addr, frame),
                Flags::Notify => Err(ProtocolError::OutOfOrder),
            },
            CommandId::TimedSync => self.on_timed_sync(addr, frame),
            CommandId::Ping => self.on_ping(addr, frame),
            CommandId::RequestChain => self.on_request_chain(addr, frame),
            CommandId::ResponseChainEntry => self.on_response_chain_entry(addr, frame),
            CommandId::RequestGetObjects => self.on_request_get_objects(addr, frame),
            CommandId::ResponseGetObjects => self.on_response_get_objects(addr, frame),
            CommandId::NewBlock => self.on_new_block(addr, frame),
            CommandId::NewLiteBlock => self.on_new_lite_block(addr, frame),
            CommandId::MissingTxs => self.on_missing_txs(addr, frame),
            CommandId::NewTransactions => self.on_new_transactions(addr, frame),
            CommandId::RequestTxPool => self.on_request_tx_pool(addr, frame),
        }
    }

    fn decode<T: cryptonote_serial::Decode>(payload: &[u8]) -> Result<T> {
        decode_complete(payload).map_err(ProtocolError::from)
    }

    fn on_handshake_request(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let req: HandshakeRequest = Self::decode(&frame.payload)?;
        {
            let mut peers = self.peers.lock().unwrap();
            let session = peers.entry(addr).or_insert_with(PeerSession::fresh);
            session.peer_id = req.node_data.peer_id;
            session.p2p_version = req.node_data.version;
        }
        self.update_observed_height(req.sync_data.current_height);

        let (height, top_id) = self.sync_data();
        let chain_known = self.core.height_of(&req.sync_data.top_id).is_some();
        let event = if chain_known { Event::HandshakeOkChainKnown } else { Event::HandshakeOkChainUnknown };
        self.transition(addr, event)?;

        let response_payload = HandshakeResponse {
            node_data: crate::commands::NodeData {
                version: 1,
                network_id: [0u8; 16],
                peer_id: self.my_peer_id,
                my_port: 0,
                local_time: current_unix_time(),
                node_version: self.node_version.clone(),
            },
            sync_data: crate::commands::CoreSyncData { current_height: height, top_id },
            local_peer_list: Vec::new(),
        };
        let mut out = vec![Outbound::Send(addr, response(CommandId::Handshake, &response_payload))];
        if !chain_known {
            out.push(Outbound::Send(addr, request(CommandId::RequestChain, &self.build_request_chain())));
            self.transition(addr, Event::StartSync)?;
        }
        Ok(out)
    }

    fn on_handshake_response(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let rsp: HandshakeResponse = Self::decode(&frame.payload)?;
        {
            let mut peers = self.peers.lock().unwrap();
            let session = peers.entry(addr).or_insert_with(PeerSession::fresh);
            session.peer_id = rsp.node_data.peer_id;
            session.p2p_version = rsp.node_data.version;
        }
        self.update_observed_height(rsp.sync_data.current_height);

        let chain_known = self.core.height_of(&rsp.sync_data.top_id).is_some();
        let event = if chain_known { Event::HandshakeOkChainKnown } else { Event::HandshakeOkChainUnknown };
        self.transition(addr, event)?;

        if chain_known {
            return Ok(Vec::new());
        }
        self.transition(addr, Event::StartSync)?;
        Ok(vec![Outbound::Send(addr, request(CommandId::RequestChain, &self.build_request_chain()))])
    }

    fn build_request_chain(&self) -> RequestChain {
        let view = CoreChainView(self.core.as_ref());
        RequestChain { block_ids: build_sparse_chain(&view) }
    }

    fn on_timed_sync(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let msg: TimedSync = Self::decode(&frame.payload)?;
        self.update_observed_height(msg.sync_data.current_height);
        let (height, top_id) = self.sync_data();
        let out = TimedSync {
            sync_data: crate::commands::CoreSyncData { current_height: height, top_id },
            local_peer_list: Vec::new(),
            local_time: current_unix_time(),
        };
        Ok(vec![Outbound::Send(addr, response(CommandId::TimedSync, &out))])
    }

    fn on_ping(&self, addr: SocketAddr, _frame: &Frame) -> Result<Vec<Outbound>> {
        let out = Ping { status: "OK".to_string(), peer_id: self.my_peer_id };
        Ok(vec![Outbound::Send(addr, response(CommandId::Ping, &out))])
    }

    fn on_request_chain(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let req: RequestChain = Self::decode(&frame.payload)?;
        let view = CoreChainView(self.core.as_ref());
        let ids = build_sparse_chain(&view);
        let start_height = req
            .block_ids
            .iter()
            .find_map(|id| self.core.height_of(id))
            .ok_or_else(|| ProtocolError::BadBlock("no common ancestor with the requester".into()))?;
        let response_payload =
            ResponseChainEntry { start_height, total_height: self.core.top_height(), ids };
        Ok(vec![Outbound::Send(addr, response(CommandId::ResponseChainEntry, &response_payload))])
    }

    fn on_response_chain_entry(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let entry: ResponseChainEntry = Self::decode(&frame.payload)?;
        let view = CoreChainView(self.core.as_ref());
        let reconciliation = reconcile_chain_entry(&view, &entry)?;
        self.update_observed_height(reconciliation.peer_total_height);

        if reconciliation.needed_block_ids.is_empty() {
            self.transition(addr, Event::ChainExhausted)?;
            return Ok(vec![Outbound::Send(addr, notify(CommandId::RequestTxPool, &RequestTxPool { tx_ids: Vec::new() }))]);
        }

        self.transition(addr, Event::ResponseWithUnknownBlocks)?;
        let batches = batch_for_get_objects(&reconciliation.needed_block_ids);
        let first = batches.into_iter().next().unwrap_or_default();
        let req = RequestGetObjects { blocks: first, txs: Vec::new() };
        Ok(vec![Outbound::Send(addr, request(CommandId::RequestGetObjects, &req))])
    }

    fn on_request_get_objects(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let req: RequestGetObjects = Self::decode(&frame.payload)?;
        let (blocks, missed_ids) = self.core.get_blocks(&req.blocks);
        let (txs, mut missed_txs) = self.core.get_transactions(&req.txs);
        let mut missed_ids = missed_ids;
        missed_ids.append(&mut missed_txs);
        let rsp = ResponseGetObjects { blocks, txs, missed_ids, current_blockchain_height: self.core.top_height() };
        Ok(vec![Outbound::Send(addr, response(CommandId::ResponseGetObjects, &rsp))])
    }

    fn on_response_get_objects(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let rsp: ResponseGetObjects = Self::decode(&frame.payload)?;
        self.update_observed_height(rsp.current_blockchain_height);
        let blocks_and_missed_were_empty = rsp.blocks.is_empty() && rsp.missed_ids.is_empty();

        for raw in rsp.blocks {
            let block_id_for_log = raw.block.len();
            match self.core.add_block(raw) {
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(bytes = block_id_for_log, %err, "rejected block from peer, dropping connection");
                    self.transition(addr, Event::ProtocolError)?;
                    return Ok(vec![Outbound::Drop(addr)]);
                }
            }
        }

        if blocks_and_missed_were_empty {
            self.transition(addr, Event::ChainExhausted)?;
            return Ok(vec![Outbound::Send(addr, notify(CommandId::RequestTxPool, &RequestTxPool { tx_ids: Vec::new() }))]);
        }

        let view = CoreChainView(self.core.as_ref());
        let ids = build_sparse_chain(&view);
        Ok(vec![Outbound::Send(addr, request(CommandId::RequestChain, &RequestChain { block_ids: ids }))])
    }

    /// Rebroadcasts an accepted block to every other connected peer,
    /// sending `NEW_LITE_BLOCK` to peers that negotiated a version
    /// supporting it and a full `NEW_BLOCK` to the rest (§4.6).
    fn relay_block(&self, exclude: SocketAddr, block: &RawBlock, current_blockchain_height: u32, hop: u32) -> Vec<Outbound> {
        let peers = self.peers.lock().unwrap();
        let mut out = Vec::new();
        for (&peer_addr, session) in peers.iter() {
            if peer_addr == exclude {
                continue;
            }
            if session.p2p_version >= P2P_LITE_BLOCKS_PROPAGATION_VERSION {
                let payload = NewLiteBlock { block_template: block.block.clone(), current_blockchain_height, hop };
                out.push(Outbound::Send(peer_addr, notify(CommandId::NewLiteBlock, &payload)));
            } else {
                let payload = NewBlock { block: block.clone(), current_blockchain_height, hop };
                out.push(Outbound::Send(peer_addr, notify(CommandId::NewBlock, &payload)));
            }
        }
        out
    }

    fn on_new_block(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let msg: NewBlock = Self::decode(&frame.payload)?;
        self.update_observed_height(msg.current_blockchain_height);
        match self.core.add_block(msg.block.clone()) {
            Ok(cryptonote_chain::AddBlockResult::Orphan) => {
                self.transition(addr, Event::HandshakeOkChainUnknown)?;
                self.transition(addr, Event::StartSync)?;
                let view = CoreChainView(self.core.as_ref());
                Ok(vec![Outbound::Send(
                    addr,
                    request(CommandId::RequestChain, &RequestChain { block_ids: build_sparse_chain(&view) }),
                )])
            }
            Ok(cryptonote_chain::AddBlockResult::Added) => {
                Ok(self.relay_block(addr, &msg.block, msg.current_blockchain_height, msg.hop + 1))
            }
            Ok(cryptonote_chain::AddBlockResult::AlreadyExists) => Ok(Vec::new()),
            Err(err) => {
                tracing::warn!(%err, "peer relayed an invalid block");
                self.transition(addr, Event::ProtocolError)?;
                Ok(vec![Outbound::Drop(addr)])
            }
        }
    }

    fn on_new_lite_block(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let msg: NewLiteBlock = Self::decode(&frame.payload)?;
        self.update_observed_height(msg.current_blockchain_height);

        let block: cryptonote_chain::Block =
            decode_complete(&msg.block_template).map_err(ProtocolError::from)?;
        let missing: HashSet<TxId> =
            block.transaction_hashes.iter().filter(|hash| self.core.height_of(hash).is_none()).copied().collect();

        if missing.is_empty() {
            let raw = RawBlock { block: msg.block_template, transactions: Vec::new() };
            return self.apply_lite_block(addr, raw, msg.current_blockchain_height, msg.hop + 1);
        }

        let mut peers = self.peers.lock().unwrap();
        let session = peers.entry(addr).or_insert_with(PeerSession::fresh);
        session.pending_lite_block = Some(PendingLiteBlock {
            block_template: msg.block_template,
            current_blockchain_height: msg.current_blockchain_height,
            hop: msg.hop,
            missing: missing.clone(),
            collected: HashMap::new(),
        });
        drop(peers);

        let block_hash = block.hash();
        let out = MissingTxs {
            current_blockchain_height: self.core.top_height(),
            block_hash,
            missing_tx_ids: missing.into_iter().collect(),
        };
        Ok(vec![Outbound::Send(addr, notify(CommandId::MissingTxs, &out))])
    }

    fn apply_lite_block(
        &self,
        addr: SocketAddr,
        raw: RawBlock,
        current_blockchain_height: u32,
        hop: u32,
    ) -> Result<Vec<Outbound>> {
        match self.core.add_block(raw.clone()) {
            Ok(cryptonote_chain::AddBlockResult::Added) => {
                Ok(self.relay_block(addr, &raw, current_blockchain_height, hop))
            }
            Ok(_) => Ok(Vec::new()),
            Err(err) => {
                tracing::warn!(%err, "lite block failed to apply once complete");
                self.transition(addr, Event::ProtocolError)?;
                Ok(vec![Outbound::Drop(addr)])
            }
        }
    }

    fn on_missing_txs(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let msg: MissingTxs = Self::decode(&frame.payload)?;
        self.update_observed_height(msg.current_blockchain_height);
        let (found, _missed) = self.core.get_transactions(&msg.missing_tx_ids);
        if found.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![Outbound::Send(addr, notify(CommandId::NewTransactions, &NewTransactions { txs: found }))])
    }

    fn on_new_transactions(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let msg: NewTransactions = Self::decode(&frame.payload)?;

        let pending_complete = {
            let mut peers = self.peers.lock().unwrap();
            let Some(session) = peers.get_mut(&addr) else { return Ok(Vec::new()) };
            let Some(pending) = session.pending_lite_block.as_mut() else {
                drop(peers);
                for raw_tx in &msg.txs {
                    let _ = self.core.add_transaction_to_pool(raw_tx);
                }
                return Ok(Vec::new());
            };
            for raw_tx in &msg.txs {
                let tx: cryptonote_chain::Transaction = match decode_complete(raw_tx) {
                    Ok(tx) => tx,
                    Err(_) => continue,
                };
                let hash = tx.hash();
                if pending.missing.remove(&hash) {
                    pending.collected.insert(hash, raw_tx.clone());
                }
            }
            if pending.missing.is_empty() {
                let pending = session.pending_lite_block.take().unwrap();
                Some(pending)
            } else {
                None
            }
        };

        let Some(pending) = pending_complete else { return Ok(Vec::new()) };
        let block: cryptonote_chain::Block =
            decode_complete(&pending.block_template).map_err(ProtocolError::from)?;
        let transactions = block
            .transaction_hashes
            .iter()
            .map(|hash| pending.collected.get(hash).cloned().unwrap_or_default())
            .collect();
        let raw = RawBlock { block: pending.block_template, transactions };
        self.apply_lite_block(addr, raw, pending.current_blockchain_height, pending.hop + 1)
    }

    fn on_request_tx_pool(&self, addr: SocketAddr, frame: &Frame) -> Result<Vec<Outbound>> {
        let req: RequestTxPool = Self::decode(&frame.payload)?;
        let (new_blobs, _deleted) = self.core.get_pool_changes(&req.tx_ids)?;
        if new_blobs.is_empty() {
            self.transition(addr, Event::MissingPoolTransactionsRequested)?;
            return Ok(Vec::new());
        }
        self.transition(addr, Event::MissingPoolTransactionsRequested)?;
        Ok(vec![Outbound::Send(addr, notify(CommandId::NewTransactions, &NewTransactions { txs: new_blobs }))])
    }

    pub const MAX_PACKET_SIZE: u32 = P2P_DEFAULT_PACKET_MAX_SIZE;
}

fn current_unix_time() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}
