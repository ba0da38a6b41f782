/// Errors surfaced by relay operations. None of them is fatal to the relay
/// process; they are contained at the connection they concern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("outbound queue is full")]
    OutboundFull,

    #[error("connection is closed")]
    TransportClosed,

    #[error("relay is not running")]
    RelayStopped,

    #[error("no free session id")]
    SessionIdsExhausted,
}
