use crate::matrix::{EMPTY, Matrix};
use crate::state::Position;

/// Points for the first row of a sweep; each further row doubles.
pub const LINE_SCORE: u64 = 10;

/// The playfield: locked cells only, the falling piece lives on the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arena {
    matrix: Matrix,
}

impl Arena {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            matrix: Matrix::new(width, height),
        }
    }

    pub fn matrix(&self) -> &Matrix {
        &self.matrix
    }

    pub fn width(&self) -> usize {
        self.matrix.width()
    }

    pub fn height(&self) -> usize {
        self.matrix.height()
    }

    pub fn clear(&mut self) {
        self.matrix.fill(EMPTY);
    }

    /// True when any solid cell of `piece` at `pos` is off the board or
    /// overlaps a locked cell.
    pub fn collide(&self, piece: &Matrix, pos: Position) -> bool {
        piece
            .cells()
            .filter(|&(_, _, value)| value != EMPTY)
            .any(|(x, y, _)| {
                self.matrix.get(x as i32 + pos.x, y as i32 + pos.y) != Some(EMPTY)
            })
    }

    /// Locks the solid cells of `piece` into the board.
    pub fn merge(&mut self, piece: &Matrix, pos: Position) {
        for (x, y, value) in piece.cells() {
            if value != EMPTY {
                self.matrix.set(x as i32 + pos.x, y as i32 + pos.y, value);
            }
        }
    }

    /// Clears full rows and returns the points earned. Row 0 is never swept.
    pub fn sweep(&mut self) -> u64 {
        let mut multiplier = 1;
        let mut score = 0;
        let mut y = self.height().saturating_sub(1);
        while y > 0 {
            if self.matrix.is_row_full(y) {
                self.matrix.collapse_row(y);
                score += multiplier * LINE_SCORE;
                multiplier *= 2;
            } else {
                y -= 1;
            }
        }
        score
    }
}
