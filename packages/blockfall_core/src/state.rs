//! Wire shape of one player's game, as broadcast through the relay.

use serde::{Deserialize, Serialize};

use crate::matrix::Matrix;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaState {
    pub matrix: Matrix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerState {
    pub matrix: Matrix,
    pub pos: Position,
    pub score: u64,
}

/// Full snapshot of a game: `{arena: {matrix}, player: {matrix, pos, score}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedGameState {
    pub arena: ArenaState,
    pub player: PlayerState,
}
