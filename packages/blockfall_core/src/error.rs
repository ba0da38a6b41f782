/// Failure to turn an inbound text frame into an envelope.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("envelope has no type")]
    MissingKind,

    #[error("unknown envelope type: {0}")]
    UnknownKind(String),
}

/// A peer state that cannot be rendered against the local board.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error(
        "board is {width}x{height}, expected {expected_width}x{expected_height}"
    )]
    ShapeMismatch {
        expected_width: usize,
        expected_height: usize,
        width: usize,
        height: usize,
    },

    #[error("{0} matrix has rows of different lengths")]
    RaggedMatrix(&'static str),

    #[error("piece matrix is empty")]
    EmptyPiece,

    #[error("cell value {0} is not a colour id")]
    InvalidCell(u8),
}
