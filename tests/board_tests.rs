//! Board-level properties: FEN round trips, key stability, copy-on-move.

use castellan::board::{Board, GenKind, Move};
use castellan::nnue::StateInfo;
use proptest::prelude::*;

#[test]
fn fen_round_trip_along_a_game() {
    let mut b = Board::start_pos();
    let mut si = StateInfo::default();
    for lan in [
        "e2e4", "e7e5", "g1f3", "b8c6", "f1b5", "a7a6", "b5a4", "g8f6", "e1g1",
    ] {
        let m = b.parse_lan(lan).unwrap();
        b = b.do_move(m, &mut si);

        let reparsed = Board::load_fen(&b.get_fen()).unwrap();
        assert_eq!(reparsed, b, "after {lan}");
        assert_eq!(reparsed.key(), b.key());
        assert_eq!(b.key(), b.computed_key());
    }
}

#[test]
fn copy_on_move_leaves_parent_intact() {
    let b = Board::load_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1")
        .unwrap();
    let fen_before = b.get_fen();
    let key_before = b.key();

    let mut si = StateInfo::default();
    for m in b.generate(GenKind::Legal).iter() {
        let child = b.do_move(m, &mut si);
        assert!(child.is_valid(), "child of {m} is consistent");
        assert_ne!(child.key(), key_before, "{m} must change the key");
    }

    assert_eq!(b.get_fen(), fen_before);
    assert_eq!(b.key(), key_before);
}

#[test]
fn castling_scenario() {
    let b = Board::load_fen("8/8/8/8/8/8/6k1/4K2R w K - 0 1").unwrap();
    let castle = b.parse_lan("e1g1").unwrap();
    assert!(b.is_valid_move(castle));

    let mut si = StateInfo::default();
    let after = b.do_move(castle, &mut si);
    assert_eq!(
        after.piece_on("f1".parse().unwrap()).map(|p| p.kind),
        Some(castellan::board::PieceType::Rook)
    );
    assert!(!after.castling().any());
}

#[test]
fn key_stable_across_make_cycles() {
    // Scenario: after the opening moves the key is identical no matter which
    // legal continuation is explored and abandoned.
    let mut b = Board::start_pos();
    let mut si = StateInfo::default();
    for lan in ["e2e4", "e7e5", "g1f3", "b8c6", "f1b5"] {
        let m = b.parse_lan(lan).unwrap();
        b = b.do_move(m, &mut si);
    }
    let key = b.key();

    for m in b.generate(GenKind::Legal).iter() {
        let child = b.do_move(m, &mut si);
        assert_eq!(child.key(), child.computed_key());
        // The parent is a value; nothing to unmake.
        assert_eq!(b.key(), key);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Random playouts: every reachable position round-trips through FEN and
    /// keeps its incremental key consistent.
    #[test]
    fn random_playout_invariants(seed in 0u64..5000) {
        use rand::prelude::*;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut b = Board::start_pos();
        let mut si = StateInfo::default();

        for _ in 0..60 {
            let moves = b.generate(GenKind::Legal);
            if moves.is_empty() {
                break;
            }
            let m: Move = moves.get(rng.gen_range(0..moves.len())).unwrap();
            b = b.do_move(m, &mut si);

            prop_assert!(b.is_valid());
            prop_assert_eq!(b.key(), b.computed_key());
            let reparsed = Board::load_fen(&b.get_fen()).unwrap();
            prop_assert_eq!(reparsed.key(), b.key());
            prop_assert_eq!(reparsed, b);
        }
    }
}
