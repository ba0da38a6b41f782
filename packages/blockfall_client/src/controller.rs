//! Bridges one local game to a relay session.
//!
//! Outbound, every change event of the local game becomes a full `state`
//! envelope. Inbound, relay envelopes are folded into one [`PeerProxy`] per
//! remote connection id. Nothing here ever touches the local game, so losing
//! the relay never interrupts play.

use std::collections::BTreeMap;

use blockfall_core::{
    BoardShape, ClientEnvelope, Game, GameEvent, PeerProxy, SerializedGameState, ServerEnvelope,
    validate_state,
};
use tracing::{debug, info, warn};

use crate::link::{ClientMessage, ServerMessage};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionIntent {
    Create,
    Join(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerPhase {
    /// Local play only
    Offline,
    /// create-session or join sent, no answer yet
    Pending,
    Joined { session_id: String },
}

pub struct ClientSessionController {
    phase: ControllerPhase,
    peers: BTreeMap<String, PeerProxy>,
    shape: BoardShape,
}

impl ClientSessionController {
    pub fn new(shape: BoardShape) -> Self {
        Self {
            phase: ControllerPhase::Offline,
            peers: BTreeMap::new(),
            shape,
        }
    }

    pub fn phase(&self) -> &ControllerPhase {
        &self.phase
    }

    pub fn session_id(&self) -> Option<&str> {
        match &self.phase {
            ControllerPhase::Joined { session_id } => Some(session_id),
            _ => None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.phase != ControllerPhase::Offline
    }

    pub fn peer(&self, id: &str) -> Option<&PeerProxy> {
        self.peers.get(id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &PeerProxy> {
        self.peers.values()
    }

    /// Opening envelope for a freshly connected link. Carries the current
    /// local state so peers can draw this player immediately.
    pub fn begin(&mut self, intent: SessionIntent, game: &Game) -> ClientMessage {
        self.phase = ControllerPhase::Pending;
        self.peers.clear();
        let state = game.serialize();
        match intent {
            SessionIntent::Create => ClientEnvelope::CreateSession { state: Some(state) },
            SessionIntent::Join(session_id) => ClientEnvelope::Join { session_id, state },
        }
    }

    /// One full-state envelope per change event while online.
    pub fn on_game_event(&self, event: GameEvent, game: &Game) -> Option<ClientMessage> {
        if !self.is_online() {
            return None;
        }
        debug!(?event, "Publishing local state");
        Some(ClientEnvelope::State {
            state: game.serialize(),
        })
    }

    pub fn on_server_envelope(&mut self, envelope: ServerMessage) {
        match envelope {
            ServerEnvelope::SessionCreated { id } => {
                info!(session = %id, "Session created");
                self.phase = ControllerPhase::Joined { session_id: id };
            }
            ServerEnvelope::JoinAck { id } => {
                info!(session = %id, "Joined session");
                self.phase = ControllerPhase::Joined { session_id: id };
            }
            ServerEnvelope::JoinFailed { reason } => {
                warn!(reason = %reason, "Join failed, continuing offline");
                self.phase = ControllerPhase::Offline;
                self.peers.clear();
            }
            ServerEnvelope::Join { id, state } | ServerEnvelope::State { id, state } => {
                self.apply_peer_state(id, state);
            }
            ServerEnvelope::Leave { id } => {
                if self.peers.remove(&id).is_some() {
                    info!(peer = %id, "Peer left");
                }
            }
        }
    }

    /// Transport loss: forget the session and its peers, keep playing.
    pub fn on_disconnected(&mut self) {
        if self.is_online() {
            warn!("Relay link lost, continuing offline");
        }
        self.phase = ControllerPhase::Offline;
        self.peers.clear();
    }

    fn apply_peer_state(&mut self, id: String, state: SerializedGameState) {
        if !self.is_online() {
            debug!(peer = %id, "Peer state while offline ignored");
            return;
        }
        // A peer only gets a proxy once it has sent one usable state.
        if let Err(e) = validate_state(&state, self.shape) {
            warn!(peer = %id, "Rejected peer state: {}", e);
            return;
        }
        let shape = self.shape;
        let proxy = self.peers.entry(id.clone()).or_insert_with(|| {
            info!(peer = %id, "Peer appeared");
            PeerProxy::new(id.as_str(), shape)
        });
        if let Err(e) = proxy.apply(state) {
            warn!(peer = %id, "Rejected peer state: {}", e);
        }
    }
}
