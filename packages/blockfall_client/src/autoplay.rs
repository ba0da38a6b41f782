//! Keeps a headless game busy: picks a random column and rotation for each
//! new piece, steers toward it, then soft-drops.

use blockfall_core::Game;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    Rotate,
    Left,
    Right,
    SoftDrop,
    Wait,
}

#[derive(Debug, Clone, Copy)]
struct Plan {
    target_x: i32,
    rotations: u8,
}

pub struct AutoPlayer {
    rng: StdRng,
    plan: Option<Plan>,
    last_y: i32,
}

impl AutoPlayer {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            plan: None,
            last_y: 0,
        }
    }

    /// Makes at most one input on `game`.
    pub fn step(&mut self, game: &mut Game) -> Move {
        let pos = game.player().pos;
        // A fresh piece spawns back at the top.
        if pos.y < self.last_y {
            self.plan = None;
        }
        self.last_y = pos.y;

        let plan = match self.plan {
            Some(plan) => plan,
            None => {
                game.set_fast_drop(false);
                let width = game.arena().width() as i32;
                let piece = game.player().matrix.width() as i32;
                let plan = Plan {
                    target_x: self.rng.random_range(0..=(width - piece).max(0)),
                    rotations: self.rng.random_range(0..4),
                };
                self.plan = Some(plan);
                plan
            }
        };

        if plan.rotations > 0 {
            game.rotate(1);
            self.plan = Some(Plan {
                rotations: plan.rotations - 1,
                ..plan
            });
            return Move::Rotate;
        }

        let dir = (plan.target_x - pos.x).signum();
        if dir != 0 {
            game.shift(dir);
            if game.player().pos.x != pos.x {
                return if dir < 0 { Move::Left } else { Move::Right };
            }
            // Blocked; settle for where the piece is.
            self.plan = Some(Plan {
                target_x: pos.x,
                ..plan
            });
        }

        if game.player().is_fast_dropping() {
            Move::Wait
        } else {
            game.set_fast_drop(true);
            Move::SoftDrop
        }
    }
}
