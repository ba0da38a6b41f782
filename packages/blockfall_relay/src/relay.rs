//! The relay actor.
//!
//! A single task owns the connection table and the session registry and
//! handles connect, message and close events strictly one at a time, so none
//! of that state needs a lock. Socket tasks talk to it through a
//! [`RelayHandle`].

use std::sync::Arc;

use blockfall_core::{ClientEnvelope, EnvelopeError, parse_client_envelope};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::connection::{Connection, ConnectionId, Outbound, StatePayload};
use crate::error::RelayError;
use crate::metrics::RelayMetrics;
use crate::session::{ConnectionTable, SessionRegistry};

/// Capacity of the event queue between socket tasks and the relay task.
pub const RELAY_QUEUE_CAPACITY: usize = 1024;

/// Events fed to the relay task
#[derive(Debug)]
pub enum RelayEvent {
    /// A transport was accepted; `outbound` feeds its socket writer
    Connected {
        id: ConnectionId,
        outbound: mpsc::Sender<Outbound>,
    },
    /// One text frame from the client
    Message { id: ConnectionId, text: String },
    /// The transport ended, gracefully or not
    Closed { id: ConnectionId },
}

pub struct Relay {
    connections: ConnectionTable,
    registry: SessionRegistry,
    metrics: Arc<RelayMetrics>,
}

impl Relay {
    pub fn new(registry: SessionRegistry, metrics: Arc<RelayMetrics>) -> Self {
        Self {
            connections: ConnectionTable::new(),
            registry,
            metrics,
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Moves the relay onto its own task and returns the handle to feed it.
    pub fn spawn(self) -> RelayHandle {
        let (sender, receiver) = mpsc::channel(RELAY_QUEUE_CAPACITY);
        tokio::spawn(self.run(receiver));
        RelayHandle { sender }
    }

    async fn run(mut self, mut receiver: mpsc::Receiver<RelayEvent>) {
        info!("Relay started");
        while let Some(event) = receiver.recv().await {
            self.handle_event(event);
        }
        info!(
            connections = self.connections.len(),
            sessions = self.registry.len(),
            "Relay stopped"
        );
    }

    pub fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Connected { id, outbound } => self.on_connected(id, outbound),
            RelayEvent::Message { id, text } => self.on_message(&id, &text),
            RelayEvent::Closed { id } => self.on_closed(&id),
        }
    }

    fn on_connected(&mut self, id: ConnectionId, outbound: mpsc::Sender<Outbound>) {
        if self.connections.contains_key(&id) {
            warn!(conn_id = %id, "Duplicate connection id ignored");
            return;
        }
        debug!(conn_id = %id, "Connection registered");
        self.connections
            .insert(id.clone(), Connection::new(id, outbound));
        self.metrics.connection_opened();
    }

    /// A bad frame is dropped and logged; the connection stays open.
    fn on_message(&mut self, id: &ConnectionId, text: &str) {
        if !self.connections.contains_key(id) {
            debug!(conn_id = %id, "Message for unknown connection ignored");
            return;
        }
        self.metrics.envelope_received();

        match parse_client_envelope::<StatePayload>(text) {
            Ok(envelope) => self.dispatch(id, envelope),
            Err(EnvelopeError::UnknownKind(kind)) => {
                debug!(conn_id = %id, kind = %kind, "Ignoring unknown envelope type");
            }
            Err(e) => {
                warn!(conn_id = %id, "Dropping malformed envelope: {}", e);
                self.metrics.envelope_malformed();
            }
        }
    }

    fn dispatch(&mut self, id: &ConnectionId, envelope: ClientEnvelope<StatePayload>) {
        debug!(conn_id = %id, kind = envelope.kind(), "Dispatching envelope");
        match envelope {
            ClientEnvelope::CreateSession { state } => self.create_session(id, state),
            ClientEnvelope::Join { session_id, state } => self.join(id, &session_id, state),
            ClientEnvelope::State { state } => self.update_state(id, state),
            ClientEnvelope::Leave => self.leave(id),
        }
    }

    /// Cleanup runs once; a second close for the same id is a no-op.
    fn on_closed(&mut self, id: &ConnectionId) {
        if !self.connections.contains_key(id) {
            return;
        }
        self.leave(id);
        self.connections.remove(id);
        self.metrics.connection_closed();
        debug!(conn_id = %id, "Connection removed");
    }

    fn create_session(&mut self, id: &ConnectionId, state: Option<StatePayload>) {
        self.leave(id);
        let Some(conn) = self.connections.get_mut(id) else {
            return;
        };

        let session_id = match self.registry.create_session() {
            Ok(session_id) => session_id,
            Err(e) => {
                warn!(conn_id = %id, "Session not created: {}", e);
                self.metrics.join_failed();
                self.send_to(
                    id,
                    Outbound::JoinFailed {
                        reason: e.to_string(),
                    },
                );
                return;
            }
        };
        self.metrics.session_created();
        if let Err(e) = self.registry.join(session_id.as_str(), conn) {
            error!(conn_id = %id, session = %session_id, "Failed to join fresh session: {}", e);
            return;
        }
        if let Some(state) = state {
            conn.set_state(state);
        }

        info!(conn_id = %id, session = %session_id, "Session created");
        self.send_to(
            id,
            Outbound::SessionCreated {
                id: session_id.to_string(),
            },
        );
    }

    fn join(&mut self, id: &ConnectionId, session_id: &str, state: StatePayload) {
        // Only give up the current session once the target is known to exist.
        let switching = self
            .connections
            .get(id)
            .and_then(Connection::session)
            .is_some_and(|current| current.as_str() != session_id);
        if switching && self.registry.contains(session_id) {
            self.leave(id);
        }

        let Some(conn) = self.connections.get_mut(id) else {
            return;
        };
        let joined = match self.registry.join(session_id, conn) {
            Ok(joined) => joined,
            Err(e) => {
                info!(conn_id = %id, session = %session_id, "Join rejected: {}", e);
                self.metrics.join_failed();
                self.send_to(
                    id,
                    Outbound::JoinFailed {
                        reason: e.to_string(),
                    },
                );
                return;
            }
        };
        conn.set_state(state.clone());

        self.send_to(
            id,
            Outbound::JoinAck {
                id: joined.to_string(),
            },
        );

        // Existing members' last known states, so the joiner can draw them at once.
        let snapshots: Vec<Outbound> = self
            .registry
            .get(joined.as_str())
            .into_iter()
            .flat_map(|session| session.members())
            .filter(|member| *member != id)
            .filter_map(|member| self.connections.get(member))
            .filter_map(|peer| {
                peer.state().map(|state| Outbound::Join {
                    id: peer.id().to_string(),
                    state: state.clone(),
                })
            })
            .collect();
        for snapshot in snapshots {
            self.send_to(id, snapshot);
        }

        let announce = Outbound::Join {
            id: id.to_string(),
            state,
        };
        let sent = self
            .registry
            .broadcast(joined.as_str(), &announce, Some(id), &self.connections);
        self.metrics.envelopes_sent(sent as u64);

        info!(
            conn_id = %id,
            session = %joined,
            members = self.registry.get(joined.as_str()).map_or(0, |s| s.len()),
            "Joined session"
        );
    }

    fn update_state(&mut self, id: &ConnectionId, state: StatePayload) {
        let Some(conn) = self.connections.get_mut(id) else {
            return;
        };
        let Some(session_id) = conn.session().cloned() else {
            debug!(conn_id = %id, "State from connection outside any session dropped");
            self.metrics.envelope_dropped();
            return;
        };
        conn.set_state(state.clone());

        let envelope = Outbound::State {
            id: id.to_string(),
            state,
        };
        let sent = self
            .registry
            .broadcast(session_id.as_str(), &envelope, Some(id), &self.connections);
        self.metrics.envelopes_sent(sent as u64);
    }

    /// Returns the connection to `Unjoined`. Remaining members are told the
    /// peer is gone; an emptied session is destroyed.
    fn leave(&mut self, id: &ConnectionId) {
        let Some(conn) = self.connections.get_mut(id) else {
            return;
        };
        let Some(departure) = self.registry.leave(conn) else {
            return;
        };

        if departure.destroyed {
            self.metrics.session_destroyed();
            info!(conn_id = %id, session = %departure.session, "Session empty, destroyed");
            return;
        }

        let envelope = Outbound::Leave { id: id.to_string() };
        let sent = self.registry.broadcast(
            departure.session.as_str(),
            &envelope,
            Some(id),
            &self.connections,
        );
        self.metrics.envelopes_sent(sent as u64);
        info!(conn_id = %id, session = %departure.session, "Left session");
    }

    fn send_to(&self, id: &ConnectionId, envelope: Outbound) {
        let Some(conn) = self.connections.get(id) else {
            return;
        };
        if conn.send(envelope).is_ok() {
            self.metrics.envelopes_sent(1);
        } else {
            self.metrics.envelope_dropped();
        }
    }
}

/// Cloneable front door to a running relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    sender: mpsc::Sender<RelayEvent>,
}

impl RelayHandle {
    /// Registers a new connection and returns its id.
    pub async fn connect(
        &self,
        outbound: mpsc::Sender<Outbound>,
    ) -> Result<ConnectionId, RelayError> {
        let id = ConnectionId::new();
        self.send(RelayEvent::Connected {
            id: id.clone(),
            outbound,
        })
        .await?;
        Ok(id)
    }

    pub async fn deliver(&self, id: &ConnectionId, text: String) -> Result<(), RelayError> {
        self.send(RelayEvent::Message {
            id: id.clone(),
            text,
        })
        .await
    }

    pub async fn close(&self, id: &ConnectionId) -> Result<(), RelayError> {
        self.send(RelayEvent::Closed { id: id.clone() }).await
    }

    async fn send(&self, event: RelayEvent) -> Result<(), RelayError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| RelayError::RelayStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionPhase;
    use serde_json::{Value, json};

    struct Client {
        id: ConnectionId,
        rx: mpsc::Receiver<Outbound>,
    }

    impl Client {
        fn drain(&mut self) -> Vec<Outbound> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn relay() -> Relay {
        Relay::new(
            SessionRegistry::with_seed(6, 42),
            Arc::new(RelayMetrics::new()),
        )
    }

    fn connect(relay: &mut Relay, name: &str) -> Client {
        let (tx, rx) = mpsc::channel(64);
        let id = ConnectionId::from(name);
        relay.handle_event(RelayEvent::Connected {
            id: id.clone(),
            outbound: tx,
        });
        Client { id, rx }
    }

    fn send(relay: &mut Relay, client: &Client, msg: Value) {
        send_text(relay, client, &msg.to_string());
    }

    fn send_text(relay: &mut Relay, client: &Client, text: &str) {
        relay.handle_event(RelayEvent::Message {
            id: client.id.clone(),
            text: text.to_string(),
        });
    }

    fn close(relay: &mut Relay, client: &Client) {
        relay.handle_event(RelayEvent::Closed {
            id: client.id.clone(),
        });
    }

    fn create(relay: &mut Relay, client: &mut Client, state: Option<Value>) -> String {
        let msg = match state {
            Some(state) => json!({"type": "create-session", "state": state}),
            None => json!({"type": "create-session"}),
        };
        send(relay, client, msg);
        match client.drain().as_slice() {
            [Outbound::SessionCreated { id }] => id.clone(),
            other => panic!("Expected SessionCreated, got {other:?}"),
        }
    }

    fn join(relay: &mut Relay, client: &Client, session: &str, state: Value) {
        send(
            relay,
            client,
            json!({"type": "join", "sessionId": session, "state": state}),
        );
    }

    #[test]
    fn test_create_then_join() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");
        let mut b = connect(&mut relay, "B");

        let session = create(&mut relay, &mut a, None);
        assert_eq!(
            relay.connection("A").unwrap().phase(),
            ConnectionPhase::Joined
        );

        join(&mut relay, &b, &session, json!({"s": 1}));
        assert_eq!(b.drain(), vec![Outbound::JoinAck { id: session.clone() }]);
        assert_eq!(
            a.drain(),
            vec![Outbound::Join {
                id: "B".into(),
                state: json!({"s": 1})
            }]
        );
        assert_eq!(relay.registry().get(&session).unwrap().len(), 2);
    }

    #[test]
    fn test_late_joiner_receives_existing_states() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");
        let mut b = connect(&mut relay, "B");
        let session = create(&mut relay, &mut a, Some(json!({"who": "A"})));

        join(&mut relay, &b, &session, json!({"who": "B"}));
        assert_eq!(
            b.drain(),
            vec![
                Outbound::JoinAck { id: session.clone() },
                Outbound::Join {
                    id: "A".into(),
                    state: json!({"who": "A"})
                },
            ]
        );
    }

    #[test]
    fn test_state_fans_out_to_everyone_but_sender() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");
        let mut b = connect(&mut relay, "B");
        let mut c = connect(&mut relay, "C");
        let session = create(&mut relay, &mut a, None);
        join(&mut relay, &b, &session, json!(1));
        join(&mut relay, &c, &session, json!(2));
        a.drain();
        b.drain();
        c.drain();

        send(
            &mut relay,
            &a,
            json!({"type": "state", "id": "A", "state": {"v": 2}}),
        );
        let expected = Outbound::State {
            id: "A".into(),
            state: json!({"v": 2}),
        };
        assert!(a.drain().is_empty());
        assert_eq!(b.drain(), vec![expected.clone()]);
        assert_eq!(c.drain(), vec![expected]);
        assert_eq!(
            relay.connection("A").unwrap().state(),
            Some(&json!({"v": 2}))
        );
    }

    #[test]
    fn test_sender_id_is_stamped_by_relay() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");
        let mut b = connect(&mut relay, "B");
        let session = create(&mut relay, &mut a, None);
        join(&mut relay, &b, &session, json!(0));
        b.drain();

        send(&mut relay, &a, json!({"type": "state", "id": "B", "state": 5}));
        assert_eq!(
            b.drain(),
            vec![Outbound::State {
                id: "A".into(),
                state: json!(5)
            }]
        );
    }

    #[test]
    fn test_disconnect_cleanup() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");
        let mut b = connect(&mut relay, "B");
        let session = create(&mut relay, &mut a, None);
        join(&mut relay, &b, &session, json!(0));
        b.drain();

        close(&mut relay, &a);
        assert_eq!(b.drain(), vec![Outbound::Leave { id: "A".into() }]);
        assert_eq!(relay.registry().get(&session).unwrap().len(), 1);

        close(&mut relay, &b);
        assert!(!relay.registry().contains(&session));
        assert_eq!(relay.connection_count(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");
        create(&mut relay, &mut a, None);
        close(&mut relay, &a);
        close(&mut relay, &a);
        assert!(relay.registry().is_empty());
        assert_eq!(relay.metrics.snapshot().connections.active, 0);
    }

    #[test]
    fn test_join_unknown_session_fails_and_stays_unjoined() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");
        join(&mut relay, &a, "doesnotexist", json!({}));

        match a.drain().as_slice() {
            [Outbound::JoinFailed { reason }] => assert!(reason.contains("doesnotexist")),
            other => panic!("Expected JoinFailed, got {other:?}"),
        }
        let conn = relay.connection("A").unwrap();
        assert_eq!(conn.phase(), ConnectionPhase::Unjoined);
        assert!(conn.state().is_none());
    }

    #[test]
    fn test_create_fails_cleanly_when_session_ids_run_out() {
        let mut relay = Relay::new(
            SessionRegistry::with_seed(1, 3),
            Arc::new(RelayMetrics::new()),
        );
        let mut hosts: Vec<Client> = (0..36)
            .map(|n| connect(&mut relay, &format!("host-{n}")))
            .collect();
        for host in &mut hosts {
            create(&mut relay, host, None);
        }
        assert_eq!(relay.registry().len(), 36);

        let mut late = connect(&mut relay, "late");
        send(&mut relay, &late, json!({"type": "create-session"}));
        match late.drain().as_slice() {
            [Outbound::JoinFailed { reason }] => assert_eq!(reason, "no free session id"),
            other => panic!("Expected JoinFailed, got {other:?}"),
        }
        assert_eq!(
            relay.connection("late").unwrap().phase(),
            ConnectionPhase::Unjoined
        );
        let snapshot = relay.metrics.snapshot();
        assert_eq!(snapshot.sessions.created, 36);
        assert_eq!(snapshot.sessions.failed_joins, 1);

        // A departing host frees its id and the relay keeps serving.
        close(&mut relay, &hosts[0]);
        create(&mut relay, &mut late, None);
        assert_eq!(relay.registry().len(), 36);
    }

    #[test]
    fn test_failed_join_keeps_current_session() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");
        let session = create(&mut relay, &mut a, None);
        join(&mut relay, &a, "missing", json!({}));
        a.drain();
        assert_eq!(
            relay.connection("A").unwrap().session().map(|s| s.as_str()),
            Some(session.as_str())
        );
    }

    #[test]
    fn test_malformed_envelopes_are_dropped() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");

        send_text(&mut relay, &a, "{not json");
        send(&mut relay, &a, json!({"type": "join", "sessionId": "x"}));
        send(&mut relay, &a, json!({"type": "warp", "level": 9}));
        assert!(a.drain().is_empty());
        assert_eq!(relay.metrics.snapshot().envelopes.malformed, 2);

        // Still usable afterwards.
        create(&mut relay, &mut a, None);
    }

    #[test]
    fn test_state_before_join_is_dropped() {
        let mut relay = relay();
        let a = connect(&mut relay, "A");
        send(&mut relay, &a, json!({"type": "state", "state": 1}));
        assert!(relay.connection("A").unwrap().state().is_none());
        assert_eq!(relay.metrics.snapshot().envelopes.dropped, 1);
    }

    #[test]
    fn test_explicit_leave_returns_to_unjoined() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");
        let session = create(&mut relay, &mut a, None);
        send(&mut relay, &a, json!({"type": "leave"}));
        assert_eq!(
            relay.connection("A").unwrap().phase(),
            ConnectionPhase::Unjoined
        );
        assert!(!relay.registry().contains(&session));
        // Second leave is a no-op.
        send(&mut relay, &a, json!({"type": "leave"}));
        assert!(a.drain().is_empty());
    }

    #[test]
    fn test_rejoin_moves_between_sessions() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");
        let mut b = connect(&mut relay, "B");
        let mut c = connect(&mut relay, "C");
        let first = create(&mut relay, &mut a, None);
        join(&mut relay, &b, &first, json!("b"));
        let second = create(&mut relay, &mut c, None);
        a.drain();
        b.drain();

        join(&mut relay, &a, &second, json!("a"));
        assert_eq!(b.drain(), vec![Outbound::Leave { id: "A".into() }]);
        assert_eq!(
            c.drain(),
            vec![Outbound::Join {
                id: "A".into(),
                state: json!("a")
            }]
        );
        assert_eq!(relay.registry().get(&first).unwrap().len(), 1);
        assert_eq!(relay.registry().get(&second).unwrap().len(), 2);
    }

    #[test]
    fn test_create_while_joined_leaves_previous_session() {
        let mut relay = relay();
        let mut a = connect(&mut relay, "A");
        let first = create(&mut relay, &mut a, None);
        let second = create(&mut relay, &mut a, None);
        assert_ne!(first, second);
        assert!(!relay.registry().contains(&first));
        assert_eq!(relay.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_handle_drives_spawned_relay() {
        let handle = relay().spawn();
        let (tx, mut rx) = mpsc::channel(8);
        let id = handle.connect(tx).await.unwrap();
        handle
            .deliver(&id, r#"{"type":"create-session"}"#.to_string())
            .await
            .unwrap();

        let msg = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(msg, Outbound::SessionCreated { .. }));
        handle.close(&id).await.unwrap();
    }
}
