//! Per-peer protocol state machine (§4.6). Transitions are driven by the
//! handler in response to frames and sync progress; any invariant
//! violation moves a peer straight to `Shutdown` regardless of its
//! current state.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    BeforeHandshake,
    Synchronizing,
    Idle,
    Normal,
    SyncRequired,
    PoolSyncRequired,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    HandshakeOkChainKnown,
    HandshakeOkChainUnknown,
    StartSync,
    ResponseWithUnknownBlocks,
    ChainExhausted,
    PoolDiffNeeded,
    MissingPoolTransactionsRequested,
    AlreadyExists,
    ProtocolError,
}

impl PeerState {
    /// Applies one transition, per the diagram in §4.6. Returns the peer's
    /// next state; `Shutdown` is terminal and absorbs every event.
    #[must_use]
    pub fn apply(self, event: Event) -> PeerState {
        use Event::*;
        use PeerState::*;

        if self == Shutdown {
            return Shutdown;
        }
        if event == ProtocolError {
            return Shutdown;
        }

        match (self, event) {
            (BeforeHandshake, HandshakeOkChainKnown) => Normal,
            (BeforeHandshake, HandshakeOkChainUnknown) => SyncRequired,
            (SyncRequired, StartSync) => Synchronizing,
            (Synchronizing, ResponseWithUnknownBlocks) => Synchronizing,
            (Synchronizing, ChainExhausted) => Normal,
            (Synchronizing, AlreadyExists) => Idle,
            (Normal, PoolDiffNeeded) => PoolSyncRequired,
            (PoolSyncRequired, MissingPoolTransactionsRequested) => Normal,
            (state, _) => state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_sync_walks_through_every_state() {
        let mut state = PeerState::BeforeHandshake;
        state = state.apply(Event::HandshakeOkChainUnknown);
        assert_eq!(state, PeerState::SyncRequired);
        state = state.apply(Event::StartSync);
        assert_eq!(state, PeerState::Synchronizing);
        state = state.apply(Event::ResponseWithUnknownBlocks);
        assert_eq!(state, PeerState::Synchronizing);
        state = state.apply(Event::ChainExhausted);
        assert_eq!(state, PeerState::Normal);
        state = state.apply(Event::PoolDiffNeeded);
        assert_eq!(state, PeerState::PoolSyncRequired);
        state = state.apply(Event::MissingPoolTransactionsRequested);
        assert_eq!(state, PeerState::Normal);
    }

    #[test]
    fn any_non_shutdown_state_drops_to_shutdown_on_protocol_error() {
        for state in [
            PeerState::BeforeHandshake,
            PeerState::Synchronizing,
            PeerState::Idle,
            PeerState::Normal,
            PeerState::SyncRequired,
            PeerState::PoolSyncRequired,
        ] {
            assert_eq!(state.apply(Event::ProtocolError), PeerState::Shutdown);
        }
    }

    #[test]
    fn shutdown_is_terminal() {
        assert_eq!(PeerState::Shutdown.apply(Event::HandshakeOkChainKnown), PeerState::Shutdown);
    }

    #[test]
    fn an_already_known_chain_goes_straight_to_normal() {
        let state = PeerState::BeforeHandshake.apply(Event::HandshakeOkChainKnown);
        assert_eq!(state, PeerState::Normal);
    }
}
