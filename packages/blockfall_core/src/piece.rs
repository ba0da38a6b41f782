use rand::Rng;

use crate::matrix::Matrix;

/// The seven tetromino kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PieceKind {
    I,
    L,
    J,
    O,
    T,
    S,
    Z,
}

impl PieceKind {
    pub const ALL: [PieceKind; 7] = [
        PieceKind::I,
        PieceKind::L,
        PieceKind::J,
        PieceKind::O,
        PieceKind::T,
        PieceKind::S,
        PieceKind::Z,
    ];

    /// Colour id written into the board when this piece locks.
    pub fn color(self) -> u8 {
        match self {
            PieceKind::T => 1,
            PieceKind::O => 2,
            PieceKind::L => 3,
            PieceKind::J => 4,
            PieceKind::I => 5,
            PieceKind::S => 6,
            PieceKind::Z => 7,
        }
    }

    /// Spawn orientation.
    pub fn matrix(self) -> Matrix {
        let c = self.color();
        let rows = match self {
            PieceKind::T => vec![vec![0, 0, 0], vec![c, c, c], vec![0, c, 0]],
            PieceKind::O => vec![vec![c, c], vec![c, c]],
            PieceKind::L => vec![vec![0, c, 0], vec![0, c, 0], vec![0, c, c]],
            PieceKind::J => vec![vec![0, c, 0], vec![0, c, 0], vec![c, c, 0]],
            PieceKind::I => vec![
                vec![0, c, 0, 0],
                vec![0, c, 0, 0],
                vec![0, c, 0, 0],
                vec![0, c, 0, 0],
            ],
            PieceKind::S => vec![vec![0, c, c], vec![c, c, 0], vec![0, 0, 0]],
            PieceKind::Z => vec![vec![c, c, 0], vec![0, c, c], vec![0, 0, 0]],
        };
        Matrix::from_rows(rows)
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }
}
