use std::time::Duration;

use tokio_tungstenite::tungstenite;

/// Why a relay link could not be established or used. Every variant leaves
/// local play unaffected.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("timed out connecting to relay after {0:?}")]
    Timeout(Duration),

    #[error("connection attempt cancelled")]
    Cancelled,

    #[error("relay is unavailable")]
    Unavailable,

    #[error("relay link is closed")]
    LinkClosed,

    #[error("transport error: {0}")]
    Transport(#[source] tungstenite::Error),
}

impl ClientError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        let is_connect = match &err {
            tungstenite::Error::Io(io_err) => matches!(
                io_err.kind(),
                std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        };
        if is_connect {
            Self::Unavailable
        } else {
            Self::Transport(err)
        }
    }
}
