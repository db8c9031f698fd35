//! Peer list management (§4.7): white (handshaked-before) and gray
//! (gossiped-about) peer lists, address selection biased toward the
//! freshest entries, and the white/gray connection-count split.

use std::net::SocketAddr;

use rand::Rng;

use crate::constants::{P2P_DEFAULT_CONNECTIONS_COUNT, P2P_DEFAULT_WHITELIST_CONNECTIONS_PERCENT};

/// Longest run of addresses `select_peer_to_connect` samples from before
/// giving up on finding a not-yet-tried one; mirrors the reference
/// implementation's cap on its random local-index range.
const MAX_RANDOM_INDEX: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEntry {
    pub addr: SocketAddr,
    pub peer_id: u64,
    pub last_seen_unix: i64,
}

/// Draws an index into `[0, max_index]`, biased toward the low end via
/// `(x^3) / max_index^2`, so that index 0 (freshest) is drawn far more
/// often than the tail.
fn biased_index<R: Rng + ?Sized>(rng: &mut R, max_index: usize) -> usize {
    if max_index == 0 {
        return 0;
    }
    let x = rng.gen_range(0..=max_index) as u128;
    let max_index = max_index as u128;
    ((x * x * x) / (max_index * max_index)) as usize
}

/// Ordered by recency: index 0 is the most-recently-seen entry.
#[derive(Debug, Default)]
pub struct PeerList {
    white: Vec<PeerEntry>,
    gray: Vec<PeerEntry>,
}

impl PeerList {
    #[must_use]
    pub fn new() -> Self {
        PeerList::default()
    }

    pub fn white_count(&self) -> usize {
        self.white.len()
    }

    pub fn gray_count(&self) -> usize {
        self.gray.len()
    }

    /// Moves (or inserts) `entry` to the front of the white list, the
    /// reference implementation's behavior on a successful handshake.
    pub fn mark_white(&mut self, entry: PeerEntry) {
        self.gray.retain(|p| p.addr != entry.addr);
        self.white.retain(|p| p.addr != entry.addr);
        self.white.insert(0, entry);
    }

    /// Adds `entry` to the gray list if it is not already known under
    /// either list, the behavior on receiving it inside a peer's
    /// gossiped peer list.
    pub fn offer_gray(&mut self, entry: PeerEntry) {
        if self.white.iter().any(|p| p.addr == entry.addr) || self.gray.iter().any(|p| p.addr == entry.addr) {
            return;
        }
        self.gray.push(entry);
    }

    pub fn remove(&mut self, addr: SocketAddr) {
        self.white.retain(|p| p.addr != addr);
        self.gray.retain(|p| p.addr != addr);
    }

    /// Picks one address to dial next, biased toward fresher entries,
    /// avoiding `excluded` (already connected or just tried this round).
    pub fn select_peer_to_connect<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        use_white_list: bool,
        excluded: &[SocketAddr],
    ) -> Option<PeerEntry> {
        let list = if use_white_list { &self.white } else { &self.gray };
        if list.is_empty() {
            return None;
        }
        let max_index = (list.len() - 1).min(MAX_RANDOM_INDEX);
        let attempts = (max_index + 1) * 3;
        for _ in 0..attempts {
            let index = biased_index(rng, max_index);
            if let Some(candidate) = list.get(index) {
                if !excluded.contains(&candidate.addr) {
                    return Some(candidate.clone());
                }
            }
        }
        None
    }

    /// How many more white-list connections a node with
    /// `current_white_connections` open (out of `connections_count`
    /// total) should still try to establish, per the 70% target split.
    #[must_use]
    pub fn expected_white_connections(connections_count: usize) -> usize {
        connections_count * P2P_DEFAULT_WHITELIST_CONNECTIONS_PERCENT / 100
    }

    #[must_use]
    pub fn needs_more_white_connections(&self, current_white_connections: usize) -> bool {
        current_white_connections < Self::expected_white_connections(P2P_DEFAULT_CONNECTIONS_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn entry(port: u16) -> PeerEntry {
        PeerEntry { addr: format!("127.0.0.1:{port}").parse().unwrap(), peer_id: u64::from(port), last_seen_unix: 0 }
    }

    #[test]
    fn expected_white_connections_is_seventy_percent() {
        assert_eq!(PeerList::expected_white_connections(10), 7);
        assert_eq!(PeerList::expected_white_connections(8), 5);
    }

    #[test]
    fn mark_white_moves_an_existing_gray_entry() {
        let mut list = PeerList::new();
        list.offer_gray(entry(1));
        assert_eq!(list.gray_count(), 1);
        list.mark_white(entry(1));
        assert_eq!(list.gray_count(), 0);
        assert_eq!(list.white_count(), 1);
    }

    #[test]
    fn offer_gray_ignores_duplicates_already_known() {
        let mut list = PeerList::new();
        list.mark_white(entry(1));
        list.offer_gray(entry(1));
        assert_eq!(list.gray_count(), 0);
    }

    #[test]
    fn selection_never_returns_an_excluded_address() {
        let mut list = PeerList::new();
        for port in 1..=5 {
            list.mark_white(entry(port));
        }
        let mut rng = StepRng::new(7, 3);
        let excluded: Vec<SocketAddr> = (1..=4).map(|p| entry(p).addr).collect();
        let chosen = list.select_peer_to_connect(&mut rng, true, &excluded);
        assert_eq!(chosen.unwrap().addr, entry(5).addr);
    }

    #[test]
    fn empty_list_has_nothing_to_select() {
        let list = PeerList::new();
        let mut rng = StepRng::new(1, 1);
        assert!(list.select_peer_to_connect(&mut rng, true, &[]).is_none());
    }
}
