use serde::{Deserialize, Serialize};

/// Cell value for an empty square.
pub const EMPTY: u8 = 0;
/// Highest colour id a cell may hold.
pub const MAX_COLOR: u8 = 7;

/// Row-major grid of colour ids. Serializes as a plain `number[][]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Matrix(Vec<Vec<u8>>);

impl Matrix {
    /// An all-empty grid.
    pub fn new(width: usize, height: usize) -> Self {
        Self(vec![vec![EMPTY; width]; height])
    }

    pub fn from_rows(rows: Vec<Vec<u8>>) -> Self {
        Self(rows)
    }

    pub fn rows(&self) -> &[Vec<u8>] {
        &self.0
    }

    pub fn height(&self) -> usize {
        self.0.len()
    }

    /// Width of the first row (0 for an empty matrix).
    pub fn width(&self) -> usize {
        self.0.first().map_or(0, Vec::len)
    }

    pub fn is_rectangular(&self) -> bool {
        let width = self.width();
        self.0.iter().all(|row| row.len() == width)
    }

    /// Cell at `(x, y)`, or `None` when the coordinate is outside the grid.
    pub fn get(&self, x: i32, y: i32) -> Option<u8> {
        if x < 0 || y < 0 {
            return None;
        }
        self.0
            .get(y as usize)
            .and_then(|row| row.get(x as usize))
            .copied()
    }

    /// Writes a cell; out-of-range coordinates are ignored.
    pub fn set(&mut self, x: i32, y: i32, value: u8) {
        if x < 0 || y < 0 {
            return;
        }
        if let Some(cell) = self
            .0
            .get_mut(y as usize)
            .and_then(|row| row.get_mut(x as usize))
        {
            *cell = value;
        }
    }

    pub fn fill(&mut self, value: u8) {
        for row in &mut self.0 {
            row.fill(value);
        }
    }

    /// Iterates `(x, y, value)` over every cell.
    pub fn cells(&self) -> impl Iterator<Item = (usize, usize, u8)> + '_ {
        self.0.iter().enumerate().flat_map(|(y, row)| {
            row.iter()
                .enumerate()
                .map(move |(x, &value)| (x, y, value))
        })
    }

    pub fn is_row_full(&self, y: usize) -> bool {
        self.0
            .get(y)
            .is_some_and(|row| row.iter().all(|&cell| cell != EMPTY))
    }

    /// Removes row `y` and inserts a fresh empty row at the top.
    pub fn collapse_row(&mut self, y: usize) {
        if y >= self.0.len() {
            return;
        }
        let mut row = self.0.remove(y);
        row.fill(EMPTY);
        self.0.insert(0, row);
    }

    /// Quarter turn: clockwise for `dir > 0`, counter-clockwise otherwise.
    pub fn rotate(&mut self, dir: i32) {
        let (width, height) = (self.width(), self.height());
        let mut turned = vec![vec![EMPTY; height]; width];
        for (x, y, value) in self.cells() {
            turned[x][y] = value;
        }
        if dir > 0 {
            turned.iter_mut().for_each(|row| row.reverse());
        } else {
            turned.reverse();
        }
        self.0 = turned;
    }
}
