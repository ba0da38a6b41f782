use crate::matrix::Matrix;
use crate::state::Position;

/// Gravity interval while no drop key is held.
pub const DROP_SLOW_MS: u64 = 1000;
/// Gravity interval while soft-dropping.
pub const DROP_FAST_MS: u64 = 50;

/// The falling piece and the player's running score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    pub pos: Position,
    pub matrix: Matrix,
    pub score: u64,
    pub(crate) drop_counter: u64,
    pub(crate) drop_interval: u64,
}

impl Player {
    pub(crate) fn new(matrix: Matrix) -> Self {
        Self {
            pos: Position::default(),
            matrix,
            score: 0,
            drop_counter: 0,
            drop_interval: DROP_SLOW_MS,
        }
    }

    pub fn drop_interval(&self) -> u64 {
        self.drop_interval
    }

    pub fn is_fast_dropping(&self) -> bool {
        self.drop_interval == DROP_FAST_MS
    }
}
