//! One client's link to the relay.

use std::borrow::Borrow;
use std::fmt;

use blockfall_core::ServerEnvelope;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use crate::error::RelayError;
use crate::session::SessionId;

/// Game state as the relay sees it: opaque JSON, never inspected.
pub type StatePayload = serde_json::Value;

/// Envelope on its way from the relay to a client.
pub type Outbound = ServerEnvelope<StatePayload>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for ConnectionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Unjoined,
    Joined,
}

/// Relay-side record of a connected client.
///
/// The relay owns every `Connection`; sessions only list their ids.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<Outbound>,
    session: Option<SessionId>,
    state: Option<StatePayload>,
}

impl Connection {
    pub fn new(id: ConnectionId, outbound: mpsc::Sender<Outbound>) -> Self {
        Self {
            id,
            outbound,
            session: None,
            state: None,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    pub(crate) fn set_session(&mut self, session: Option<SessionId>) {
        self.session = session;
    }

    pub fn phase(&self) -> ConnectionPhase {
        if self.session.is_some() {
            ConnectionPhase::Joined
        } else {
            ConnectionPhase::Unjoined
        }
    }

    /// Last state this client reported, replayed to late joiners.
    pub fn state(&self) -> Option<&StatePayload> {
        self.state.as_ref()
    }

    pub fn set_state(&mut self, state: StatePayload) {
        self.state = Some(state);
    }

    /// Queues an envelope for the socket writer without waiting.
    ///
    /// Fire-and-forget: a full or closed queue drops the envelope.
    pub fn send(&self, envelope: Outbound) -> Result<(), RelayError> {
        match self.outbound.try_send(envelope) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(conn_id = %self.id, "Outbound queue full, dropping envelope");
                Err(RelayError::OutboundFull)
            }
            Err(TrySendError::Closed(_)) => {
                debug!(conn_id = %self.id, "Connection closed, dropping envelope");
                Err(RelayError::TransportClosed)
            }
        }
    }
}
