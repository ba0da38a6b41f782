//! Headless blockfall player.
//!
//! Runs a local game, mirrors it into a relay session when one is reachable,
//! and keeps a read-only proxy of every other player in that session.

pub mod autoplay;
pub mod controller;
pub mod error;
pub mod link;
pub mod play;

pub use controller::{ClientSessionController, ControllerPhase, SessionIntent};
pub use error::ClientError;
pub use link::{DEFAULT_CONNECT_TIMEOUT, LinkEvent, RelayLink, relay_url};
pub use play::{PlayOptions, PlaySummary, run};
