//! Relay wire protocol.
//!
//! One JSON object per text frame, discriminated by `type`. The state payload
//! is a type parameter: the relay carries it as an opaque `serde_json::Value`,
//! clients decode it as [`SerializedGameState`](crate::SerializedGameState).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::EnvelopeError;

/// Messages sent FROM a client TO the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientEnvelope<S> {
    /// Open a new session and join it. The optional state is kept so that
    /// later joiners can see this player straight away.
    CreateSession {
        #[serde(skip_serializing_if = "Option::is_none")]
        state: Option<S>,
    },

    /// Join an existing session
    Join {
        #[serde(rename = "sessionId")]
        session_id: String,
        state: S,
    },

    /// Full-state update, fanned out to the rest of the session
    State { state: S },

    /// Leave the current session but keep the connection open
    Leave,
}

impl<S> ClientEnvelope<S> {
    pub const KINDS: &'static [&'static str] = &["create-session", "join", "state", "leave"];

    pub fn kind(&self) -> &'static str {
        match self {
            ClientEnvelope::CreateSession { .. } => "create-session",
            ClientEnvelope::Join { .. } => "join",
            ClientEnvelope::State { .. } => "state",
            ClientEnvelope::Leave => "leave",
        }
    }
}

/// Messages sent FROM the relay TO a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEnvelope<S> {
    SessionCreated { id: String },
    JoinAck { id: String },
    JoinFailed { reason: String },

    /// A peer is in the session: either it just joined, or it was already
    /// there when the recipient joined.
    Join { id: String, state: S },

    /// Latest state of the peer `id`
    State { id: String, state: S },

    /// The peer `id` left the session or disconnected
    Leave { id: String },
}

impl<S> ServerEnvelope<S> {
    pub const KINDS: &'static [&'static str] = &[
        "session-created",
        "join-ack",
        "join-failed",
        "join",
        "state",
        "leave",
    ];
}

pub fn parse_client_envelope<S: DeserializeOwned>(
    text: &str,
) -> Result<ClientEnvelope<S>, EnvelopeError> {
    parse_tagged(text, ClientEnvelope::<S>::KINDS)
}

pub fn parse_server_envelope<S: DeserializeOwned>(
    text: &str,
) -> Result<ServerEnvelope<S>, EnvelopeError> {
    parse_tagged(text, ServerEnvelope::<S>::KINDS)
}

/// Unknown kinds are reported separately from malformed known kinds so the
/// caller can ignore the former quietly.
fn parse_tagged<T: DeserializeOwned>(text: &str, known: &[&str]) -> Result<T, EnvelopeError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or(EnvelopeError::MissingKind)?;
    if !known.contains(&kind) {
        return Err(EnvelopeError::UnknownKind(kind.to_string()));
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_client_create_session_without_state() {
        let msg: ClientEnvelope<Value> = parse_client_envelope(r#"{"type":"create-session"}"#).unwrap();
        assert_eq!(msg, ClientEnvelope::CreateSession { state: None });
    }

    #[test]
    fn test_client_join() {
        let json = r#"{"type":"join","sessionId":"abc123","state":{"score":1}}"#;
        let msg: ClientEnvelope<Value> = parse_client_envelope(json).unwrap();
        match msg {
            ClientEnvelope::Join { session_id, state } => {
                assert_eq!(session_id, "abc123");
                assert_eq!(state, json!({"score": 1}));
            }
            _ => panic!("Expected Join message"),
        }
    }

    #[test]
    fn test_client_state_ignores_client_supplied_id() {
        let json = r#"{"type":"state","id":"spoofed","state":[1,2]}"#;
        let msg: ClientEnvelope<Value> = parse_client_envelope(json).unwrap();
        assert_eq!(msg, ClientEnvelope::State { state: json!([1, 2]) });
        assert_eq!(msg.kind(), "state");
    }

    #[test]
    fn test_client_leave() {
        let msg: ClientEnvelope<Value> = parse_client_envelope(r#"{"type":"leave"}"#).unwrap();
        assert_eq!(msg, ClientEnvelope::Leave);
    }

    #[test]
    fn test_join_without_state_is_malformed() {
        let err = parse_client_envelope::<Value>(r#"{"type":"join","sessionId":"x"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed(_)));
    }

    #[test]
    fn test_unknown_kind() {
        let err = parse_client_envelope::<Value>(r#"{"type":"chat","text":"hi"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::UnknownKind(kind) if kind == "chat"));
    }

    #[test]
    fn test_missing_type_and_garbage() {
        assert!(matches!(
            parse_client_envelope::<Value>(r#"{"state":1}"#),
            Err(EnvelopeError::MissingKind)
        ));
        assert!(matches!(
            parse_client_envelope::<Value>("not json"),
            Err(EnvelopeError::Malformed(_))
        ));
    }

    #[test]
    fn test_server_envelopes_serialization() {
        let created: ServerEnvelope<Value> = ServerEnvelope::SessionCreated { id: "abc123".into() };
        assert_eq!(
            serde_json::to_value(&created).unwrap(),
            json!({"type": "session-created", "id": "abc123"})
        );

        let ack: ServerEnvelope<Value> = ServerEnvelope::JoinAck { id: "abc123".into() };
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            json!({"type": "join-ack", "id": "abc123"})
        );

        let failed: ServerEnvelope<Value> = ServerEnvelope::JoinFailed {
            reason: "session not found".into(),
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"type": "join-failed", "reason": "session not found"})
        );

        let state: ServerEnvelope<Value> = ServerEnvelope::State {
            id: "A".into(),
            state: json!({"player": {"score": 5}}),
        };
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({"type": "state", "id": "A", "state": {"player": {"score": 5}}})
        );
    }

    #[test]
    fn test_server_envelope_typed_payload() {
        use crate::game::{DEFAULT_HEIGHT, DEFAULT_WIDTH, Game};
        use crate::state::SerializedGameState;

        let (game, _rx) = Game::with_seed(DEFAULT_WIDTH, DEFAULT_HEIGHT, 2);
        let opaque: ServerEnvelope<Value> = ServerEnvelope::Join {
            id: "B".into(),
            state: serde_json::to_value(game.serialize()).unwrap(),
        };
        let text = serde_json::to_string(&opaque).unwrap();
        let typed: ServerEnvelope<SerializedGameState> = parse_server_envelope(&text).unwrap();
        assert_eq!(
            typed,
            ServerEnvelope::Join {
                id: "B".into(),
                state: game.serialize(),
            }
        );
    }
}
