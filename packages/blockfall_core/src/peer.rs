//! Local copies of remote players' games.

use crate::error::StateError;
use crate::game::{DEFAULT_HEIGHT, DEFAULT_WIDTH};
use crate::matrix::{MAX_COLOR, Matrix};
use crate::state::SerializedGameState;

/// Board dimensions a renderer expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardShape {
    pub width: usize,
    pub height: usize,
}

impl Default for BoardShape {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
        }
    }
}

/// Checks that a peer's state can be drawn on a board of `shape`.
pub fn validate_state(state: &SerializedGameState, shape: BoardShape) -> Result<(), StateError> {
    let board = &state.arena.matrix;
    if !board.is_rectangular() {
        return Err(StateError::RaggedMatrix("board"));
    }
    if board.width() != shape.width || board.height() != shape.height {
        return Err(StateError::ShapeMismatch {
            expected_width: shape.width,
            expected_height: shape.height,
            width: board.width(),
            height: board.height(),
        });
    }

    let piece = &state.player.matrix;
    if piece.height() == 0 || piece.width() == 0 {
        return Err(StateError::EmptyPiece);
    }
    if !piece.is_rectangular() {
        return Err(StateError::RaggedMatrix("piece"));
    }

    check_cells(board)?;
    check_cells(piece)
}

fn check_cells(matrix: &Matrix) -> Result<(), StateError> {
    match matrix.cells().find(|&(_, _, v)| v > MAX_COLOR) {
        Some((_, _, v)) => Err(StateError::InvalidCell(v)),
        None => Ok(()),
    }
}

/// Non-authoritative mirror of one remote player, used only for display.
#[derive(Debug, Clone)]
pub struct PeerProxy {
    id: String,
    shape: BoardShape,
    state: Option<SerializedGameState>,
}

impl PeerProxy {
    pub fn new(id: impl Into<String>, shape: BoardShape) -> Self {
        Self {
            id: id.into(),
            shape,
            state: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> Option<&SerializedGameState> {
        self.state.as_ref()
    }

    pub fn score(&self) -> Option<u64> {
        self.state.as_ref().map(|s| s.player.score)
    }

    /// Replaces the mirrored state. A state that fails validation is
    /// rejected and the last good one is kept.
    pub fn apply(&mut self, state: SerializedGameState) -> Result<(), StateError> {
        validate_state(&state, self.shape)?;
        self.state = Some(state);
        Ok(())
    }
}
