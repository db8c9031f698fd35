//! CryptoNote P2P protocol handler (§4.6-§4.7): Levin wire framing, the
//! twelve fixed protocol commands, per-peer state machine, chain sync
//! algorithm, peer-list management, connection transport, and the
//! [`handler::ProtocolHandler`] that ties them together against a
//! [`core::Core`].

pub mod commands;
pub mod constants;
pub mod core;
pub mod error;
pub mod handler;
pub mod peer_manager;
pub mod state;
pub mod sync;
pub mod transport;
pub mod wire;

pub use core::{Core, CoreChainView, NodeCore};
pub use error::{ProtocolError, Result};
pub use handler::{Outbound, ProtocolHandler};
pub use peer_manager::{PeerEntry as ManagedPeerEntry, PeerList};
pub use state::{Event, PeerState};
pub use sync::{build_sparse_chain, reconcile_chain_entry, ChainReconciliation, ChainView};
pub use transport::{Connection, PeerHandle};
pub use wire::{CommandId, Flags, Frame, LEVIN_SIGNATURE};
