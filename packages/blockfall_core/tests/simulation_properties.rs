use proptest::prelude::*;

use blockfall_core::{
    Arena, BoardShape, DEFAULT_HEIGHT, DEFAULT_WIDTH, Game, Matrix, PeerProxy, PieceKind, Position,
    SerializedGameState,
};

#[derive(Debug, Clone, Copy)]
enum Input {
    Left,
    Right,
    RotateCw,
    RotateCcw,
    Drop,
    Tick(u64),
    Fast(bool),
}

fn arb_input() -> impl Strategy<Value = Input> {
    prop_oneof![
        Just(Input::Left),
        Just(Input::Right),
        Just(Input::RotateCw),
        Just(Input::RotateCcw),
        Just(Input::Drop),
        (0..1500u64).prop_map(Input::Tick),
        any::<bool>().prop_map(Input::Fast),
    ]
}

fn play(game: &mut Game, input: Input) {
    match input {
        Input::Left => game.shift(-1),
        Input::Right => game.shift(1),
        Input::RotateCw => game.rotate(1),
        Input::RotateCcw => game.rotate(-1),
        Input::Drop => game.drop_piece(),
        Input::Tick(ms) => game.update(ms),
        Input::Fast(fast) => game.set_fast_drop(fast),
    }
}

fn arb_piece() -> impl Strategy<Value = PieceKind> {
    proptest::sample::select(PieceKind::ALL.to_vec())
}

proptest! {
    #[test]
    fn four_turns_restore_a_piece(kind in arb_piece(), dir in prop_oneof![Just(1), Just(-1)]) {
        let original = kind.matrix();
        let mut m = original.clone();
        for _ in 0..4 {
            m.rotate(dir);
        }
        prop_assert_eq!(m, original);
    }

    #[test]
    fn opposite_turns_cancel(kind in arb_piece()) {
        let original = kind.matrix();
        let mut m = original.clone();
        m.rotate(1);
        m.rotate(-1);
        prop_assert_eq!(m, original);
    }

    #[test]
    fn sweep_scores_double_per_row(rows in proptest::sample::subsequence((1..20i32).collect::<Vec<_>>(), 0..5)) {
        let mut arena = Arena::new(12, 20);
        let full = Matrix::from_rows(vec![vec![3; 12]]);
        for &y in &rows {
            arena.merge(&full, Position { x: 0, y });
        }

        let k = rows.len() as u32;
        let expected = 10 * (2u64.pow(k) - 1);
        prop_assert_eq!(arena.sweep(), expected);
        prop_assert!(arena.matrix().cells().all(|(_, _, v)| v == 0));
    }

    #[test]
    fn shift_and_rotate_never_overlap(
        seed in any::<u64>(),
        inputs in proptest::collection::vec(
            prop_oneof![Just(Input::Left), Just(Input::Right), Just(Input::RotateCw), Just(Input::RotateCcw)],
            1..80,
        ),
    ) {
        let (mut game, _events) = Game::with_seed(DEFAULT_WIDTH, DEFAULT_HEIGHT, seed);
        for input in inputs {
            play(&mut game, input);
            prop_assert!(!game.arena().collide(&game.player().matrix, game.player().pos));
        }
    }

    #[test]
    fn serialized_state_survives_the_wire(
        seed in any::<u64>(),
        inputs in proptest::collection::vec(arb_input(), 0..200),
    ) {
        let (mut game, _events) = Game::with_seed(DEFAULT_WIDTH, DEFAULT_HEIGHT, seed);
        for input in inputs {
            play(&mut game, input);
        }
        let sent = game.serialize();
        let wire = serde_json::to_string(&sent).unwrap();

        let mut proxy = PeerProxy::new("remote", BoardShape::default());
        let received: SerializedGameState = serde_json::from_str(&wire).unwrap();
        prop_assert!(proxy.apply(received).is_ok());
        let got = proxy.state().unwrap();
        prop_assert_eq!(&got.arena.matrix, &sent.arena.matrix);
        prop_assert_eq!(&got.player.matrix, &sent.player.matrix);
        prop_assert_eq!(got.player.pos, sent.player.pos);
        prop_assert_eq!(got.player.score, sent.player.score);
    }
}
