//! Protocol/transport constants (§4.6/§4.7), carried bit-for-bit from the
//! reference network configuration where the retrieval pack exposes them.

/// Number of block hashes requested per `REQUEST_GET_OBJECTS` round.
pub const BLOCKS_SYNCHRONIZING_DEFAULT_COUNT: usize = 128;

/// Default outbound+inbound connection target per node.
pub const P2P_DEFAULT_CONNECTIONS_COUNT: usize = 8;

/// Percentage of `connections_count` reserved for white-list peers before
/// gray-list peers are drawn from.
pub const P2P_DEFAULT_WHITELIST_CONNECTIONS_PERCENT: usize = 70;

/// Per-connection write queue ceiling; exceeding it interrupts the peer.
pub const P2P_CONNECTION_MAX_WRITE_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Longest an in-flight write (or invoke waiting on a reply) may sit idle.
pub const P2P_DEFAULT_INVOKE_TIMEOUT_SECS: u64 = 120;

/// Handshake must complete within this window or the peer is dropped.
pub const P2P_DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 5;

/// Interval between unsolicited `TIMED_SYNC` pings to an idle peer.
pub const P2P_DEFAULT_HANDSHAKE_INTERVAL_SECS: u64 = 60;

/// Ceiling on a single decoded frame's payload, guarding against a peer
/// claiming an absurd length prefix.
pub const P2P_DEFAULT_PACKET_MAX_SIZE: u32 = 20 * 1024 * 1024;

/// Default number of peer-list entries exchanged on handshake.
pub const P2P_DEFAULT_PEERS_IN_HANDSHAKE: usize = 250;

/// Lowest negotiated `NodeData.version` a peer must report for this node
/// to relay `NEW_LITE_BLOCK` to it instead of a full `NEW_BLOCK`.
pub const P2P_LITE_BLOCKS_PROPAGATION_VERSION: u8 = 1;
