//! Blockfall core: the falling-block simulation, its serialized state, and the
//! envelopes exchanged with the session relay.

pub mod arena;
pub mod error;
pub mod game;
pub mod matrix;
pub mod peer;
pub mod piece;
pub mod player;
pub mod protocol;
pub mod state;

pub use arena::Arena;
pub use error::{EnvelopeError, StateError};
pub use game::{DEFAULT_HEIGHT, DEFAULT_WIDTH, Game, GameEvent, GameEvents};
pub use matrix::Matrix;
pub use peer::{BoardShape, PeerProxy, validate_state};
pub use piece::PieceKind;
pub use player::Player;
pub use protocol::{ClientEnvelope, ServerEnvelope, parse_client_envelope, parse_server_envelope};
pub use state::{ArenaState, PlayerState, Position, SerializedGameState};
