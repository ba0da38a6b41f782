//! One local game: arena, falling piece and the change-event stream.
//!
//! Every mutation that a remote viewer could notice emits exactly one
//! [`GameEvent`] per observable change, in the order the changes happen.
//! The receiving half is handed out once, at construction.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::mpsc;
use tracing::debug;

use crate::arena::Arena;
use crate::piece::PieceKind;
use crate::player::{DROP_FAST_MS, DROP_SLOW_MS, Player};
use crate::state::{ArenaState, PlayerState, Position, SerializedGameState};

pub const DEFAULT_WIDTH: usize = 12;
pub const DEFAULT_HEIGHT: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEvent {
    PositionChanged(Position),
    PieceChanged,
    BoardChanged,
    ScoreChanged(u64),
}

/// Single subscriber for a game's change events.
pub type GameEvents = mpsc::UnboundedReceiver<GameEvent>;

pub struct Game {
    arena: Arena,
    player: Player,
    rng: StdRng,
    events: mpsc::UnboundedSender<GameEvent>,
}

impl Game {
    pub fn new(width: usize, height: usize) -> (Self, GameEvents) {
        Self::with_rng(width, height, StdRng::from_os_rng())
    }

    /// Deterministic piece sequence for a given seed.
    pub fn with_seed(width: usize, height: usize, seed: u64) -> (Self, GameEvents) {
        Self::with_rng(width, height, StdRng::seed_from_u64(seed))
    }

    fn with_rng(width: usize, height: usize, mut rng: StdRng) -> (Self, GameEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let piece = PieceKind::random(&mut rng).matrix();
        let mut game = Self {
            arena: Arena::new(width, height),
            player: Player::new(piece),
            rng,
            events,
        };
        game.center_piece();
        (game, rx)
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn player(&self) -> &Player {
        &self.player
    }

    pub fn serialize(&self) -> SerializedGameState {
        SerializedGameState {
            arena: ArenaState {
                matrix: self.arena.matrix().clone(),
            },
            player: PlayerState {
                matrix: self.player.matrix.clone(),
                pos: self.player.pos,
                score: self.player.score,
            },
        }
    }

    /// Advances gravity by `delta_ms`.
    pub fn update(&mut self, delta_ms: u64) {
        self.player.drop_counter += delta_ms;
        if self.player.drop_counter > self.player.drop_interval {
            self.drop_piece();
        }
    }

    pub fn set_fast_drop(&mut self, fast: bool) {
        self.player.drop_interval = if fast { DROP_FAST_MS } else { DROP_SLOW_MS };
    }

    /// Moves the piece one row down, locking it when it lands.
    pub fn drop_piece(&mut self) {
        self.player.pos.y += 1;
        self.player.drop_counter = 0;
        if self.collides() {
            self.player.pos.y -= 1;
            self.arena.merge(&self.player.matrix, self.player.pos);
            self.emit(GameEvent::BoardChanged);
            self.reset();
            let earned = self.arena.sweep();
            self.emit(GameEvent::BoardChanged);
            self.player.score += earned;
            self.emit(GameEvent::ScoreChanged(self.player.score));
            return;
        }
        self.emit(GameEvent::PositionChanged(self.player.pos));
    }

    /// Shifts the piece horizontally; blocked moves are silent.
    pub fn shift(&mut self, dir: i32) {
        self.player.pos.x += dir;
        if self.collides() {
            self.player.pos.x -= dir;
            return;
        }
        self.emit(GameEvent::PositionChanged(self.player.pos));
    }

    /// Rotates with a simple wall kick. Reverts when no kick fits.
    pub fn rotate(&mut self, dir: i32) {
        let start_x = self.player.pos.x;
        let mut offset: i32 = 1;
        self.player.matrix.rotate(dir);
        while self.collides() {
            self.player.pos.x += offset;
            offset = -(offset + if offset > 0 { 1 } else { -1 });
            if offset > self.player.matrix.width() as i32 {
                self.player.matrix.rotate(-dir);
                self.player.pos.x = start_x;
                return;
            }
        }
        self.emit(GameEvent::PieceChanged);
    }

    /// Spawns a new random piece at the top. A blocked spawn ends the round:
    /// the board is cleared and the score resets.
    pub fn reset(&mut self) {
        self.player.matrix = PieceKind::random(&mut self.rng).matrix();
        if self.center_piece() {
            debug!(score = self.player.score, "Spawn blocked, round over");
            self.arena.clear();
            self.emit(GameEvent::BoardChanged);
            self.player.score = 0;
            self.emit(GameEvent::ScoreChanged(0));
        }
        self.emit(GameEvent::PositionChanged(self.player.pos));
        self.emit(GameEvent::PieceChanged);
    }

    /// Places the current piece at the spawn point; returns whether it collides there.
    fn center_piece(&mut self) -> bool {
        self.player.pos = Position {
            x: (self.arena.width() / 2) as i32 - (self.player.matrix.width() / 2) as i32,
            y: 0,
        };
        self.collides()
    }

    fn collides(&self) -> bool {
        self.arena.collide(&self.player.matrix, self.player.pos)
    }

    fn emit(&self, event: GameEvent) {
        // A dropped receiver means nobody is watching; the game keeps running.
        let _ = self.events.send(event);
    }
}
