//! Sessions and the registry that owns them.

use std::borrow::Borrow;
use std::collections::{HashMap, HashSet};
use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::connection::{Connection, ConnectionId, Outbound};
use crate::error::RelayError;

pub const SESSION_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
pub const DEFAULT_SESSION_ID_LEN: usize = 6;
/// Shortest id length the relay accepts from configuration.
pub const MIN_SESSION_ID_LEN: usize = 4;

/// Random draws spent on one id before the registry gives up.
pub const MAX_ID_ATTEMPTS: usize = 1024;

/// Live connections, keyed by id. Owned by the relay.
pub type ConnectionTable = HashMap<ConnectionId, Connection>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A named group of connections that see each other's state.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    members: HashSet<ConnectionId>,
}

impl Session {
    fn new(id: SessionId) -> Self {
        Self {
            id,
            members: HashSet::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn members(&self) -> impl Iterator<Item = &ConnectionId> {
        self.members.iter()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// What `leave` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub session: SessionId,
    /// The session had no members left and was removed.
    pub destroyed: bool,
}

/// Every live session. Mutated only from the relay task.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
    id_len: usize,
    rng: StdRng,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_ID_LEN)
    }
}

impl SessionRegistry {
    pub fn new(id_len: usize) -> Self {
        Self::with_rng(id_len, StdRng::from_os_rng())
    }

    pub fn with_seed(id_len: usize, seed: u64) -> Self {
        Self::with_rng(id_len, StdRng::seed_from_u64(seed))
    }

    fn with_rng(id_len: usize, rng: StdRng) -> Self {
        Self {
            sessions: HashMap::new(),
            id_len: id_len.max(1),
            rng,
        }
    }

    /// Registers an empty session under a fresh random id.
    ///
    /// The caller must join a member before handing control back, otherwise
    /// the registry holds an empty session.
    ///
    /// Fails with [`RelayError::SessionIdsExhausted`] when every id of the
    /// configured length is taken or no free one turned up within
    /// [`MAX_ID_ATTEMPTS`] draws.
    pub fn create_session(&mut self) -> Result<SessionId, RelayError> {
        if self.sessions.len() >= self.id_capacity() {
            return Err(RelayError::SessionIdsExhausted);
        }
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = SessionId(self.random_token());
            if !self.sessions.contains_key(&id) {
                self.sessions.insert(id.clone(), Session::new(id.clone()));
                return Ok(id);
            }
            debug!(session = %id, "Session id collision, regenerating");
        }
        Err(RelayError::SessionIdsExhausted)
    }

    /// Number of distinct ids of the configured length.
    fn id_capacity(&self) -> usize {
        u32::try_from(self.id_len)
            .ok()
            .and_then(|len| SESSION_ID_ALPHABET.len().checked_pow(len))
            .unwrap_or(usize::MAX)
    }

    fn random_token(&mut self) -> String {
        (0..self.id_len)
            .map(|_| {
                let idx = self.rng.random_range(0..SESSION_ID_ALPHABET.len());
                SESSION_ID_ALPHABET[idx] as char
            })
            .collect()
    }

    /// Adds `conn` to the session `session_id`. Joining the session the
    /// connection is already in changes nothing. A connection that sits in a
    /// different session is moved out of it first.
    pub fn join(
        &mut self,
        session_id: &str,
        conn: &mut Connection,
    ) -> Result<SessionId, RelayError> {
        if !self.sessions.contains_key(session_id) {
            return Err(RelayError::SessionNotFound(session_id.to_string()));
        }
        if conn.session().is_some_and(|current| current.as_str() != session_id) {
            self.leave(conn);
        }
        let session = self
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RelayError::SessionNotFound(session_id.to_string()))?;
        session.members.insert(conn.id().clone());
        conn.set_session(Some(session.id.clone()));
        Ok(session.id.clone())
    }

    /// Removes `conn` from its session, destroying the session when it
    /// empties. `None` when the connection was not in a session.
    pub fn leave(&mut self, conn: &mut Connection) -> Option<Departure> {
        let session_id = conn.session()?.clone();
        conn.set_session(None);

        let session = self.sessions.get_mut(&session_id)?;
        session.members.remove(conn.id());
        let destroyed = session.is_empty();
        if destroyed {
            self.sessions.remove(&session_id);
        }
        Some(Departure {
            session: session_id,
            destroyed,
        })
    }

    /// Queues `envelope` to every member except `exclude`. Returns the number
    /// of members it was queued to. A missing session is a no-op.
    pub fn broadcast(
        &self,
        session_id: &str,
        envelope: &Outbound,
        exclude: Option<&ConnectionId>,
        connections: &ConnectionTable,
    ) -> usize {
        let Some(session) = self.sessions.get(session_id) else {
            debug!(session = %session_id, "Broadcast to vanished session ignored");
            return 0;
        };
        session
            .members
            .iter()
            .filter(|member| Some(*member) != exclude)
            .filter_map(|member| connections.get(member))
            .filter(|conn| conn.send(envelope.clone()).is_ok())
            .count()
    }

    pub fn get(&self, session_id: &str) -> Option<&Session> {
        self.sessions.get(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }
}
