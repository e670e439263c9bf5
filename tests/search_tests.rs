//! End-to-end search behavior.

use std::sync::Arc;

use castellan::board::{Board, GenKind};
use castellan::search::{format_score, Search, SearchLimits, MATE_BOUND, VALUE_MATE};
use castellan::tt::TranspositionTable;

fn searcher() -> Search {
    let mut s = Search::new(Arc::new(TranspositionTable::new(16)));
    s.set_silent(true);
    s
}

fn best_at_depth(fen: &str, depth: i32, multipv: usize) -> (Search, castellan::search::RootMove) {
    let board = Board::load_fen(fen).unwrap();
    let mut s = searcher();
    s.setup(board, SearchLimits::depth(depth), None, false, multipv);
    let rm = s.iterative_deepening().expect("position has legal moves");
    (s, rm)
}

#[test]
fn depth_one_picks_a_legal_move() {
    let board = Board::start_pos();
    let (_, rm) = best_at_depth(
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        1,
        1,
    );
    assert!(board.is_valid_move(rm.mv));
    assert!(board.generate(GenKind::Legal).contains(rm.mv));
}

#[test]
fn kpk_is_winning_for_the_pawn_side() {
    let (_, rm) = best_at_depth("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1", 10, 1);
    assert!(rm.score >= 50, "score {}", rm.score);
    let board = Board::load_fen("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1").unwrap();
    assert!(board.is_valid_move(rm.mv));
}

#[test]
fn finds_mate_in_two() {
    let fen = "r1bq1rk1/ppp2ppp/2n5/2bp4/3Qn3/2N2N2/PP2PPPP/R1B1KB1R w KQ - 0 1";
    let (_, rm) = best_at_depth(fen, 6, 1);

    assert!(rm.score > MATE_BOUND, "score {}", rm.score);
    assert_eq!(VALUE_MATE - rm.score, 3, "mate three plies out");
    assert_eq!(format_score(rm.score), "mate 2");

    let board = Board::load_fen(fen).unwrap();
    assert!(board.is_valid_move(rm.mv));
}

#[test]
fn finds_back_rank_mate_in_one() {
    let fen = "6k1/5ppp/8/8/8/8/r4PPP/6K1 b - - 0 1";
    let (_, rm) = best_at_depth(fen, 4, 1);
    assert!(rm.score > MATE_BOUND, "score {}", rm.score);
    assert_eq!(VALUE_MATE - rm.score, 1);
    assert_eq!(format_score(rm.score), "mate 1");
    assert_eq!(rm.mv.to_string(), "a2a1");
}

#[test]
fn single_threaded_search_is_deterministic() {
    let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
    let (_, a) = best_at_depth(fen, 6, 1);
    let (_, b) = best_at_depth(fen, 6, 1);
    assert_eq!(a.mv, b.mv);
    assert_eq!(a.score, b.score);
}

#[test]
fn multipv_reports_distinct_lines() {
    let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
    let (s, _) = best_at_depth(fen, 5, 3);
    assert_eq!(s.num_pvs(), 3);

    let moves: Vec<_> = (0..3).map(|i| s.pv_start(i).mv).collect();
    assert_ne!(moves[0], moves[1]);
    assert_ne!(moves[1], moves[2]);
    assert_ne!(moves[0], moves[2]);
    // Sorted best-first.
    assert!(s.pv_start(0).score >= s.pv_start(1).score);
    assert!(s.pv_start(1).score >= s.pv_start(2).score);
}

#[test]
fn stalemate_scores_zero() {
    // Black to move is stalemated after any non-progress; search from the
    // stalemated side's parent: here black has no moves and is not in check.
    let fen = "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1";
    let board = Board::load_fen(fen).unwrap();
    assert!(board.generate(GenKind::Legal).is_empty());
    assert!(board.checkers().is_empty());

    let mut s = searcher();
    s.setup(board, SearchLimits::depth(3), None, false, 1);
    assert!(s.iterative_deepening().is_none());
}

#[test]
fn node_limit_stops_the_search() {
    let board = Board::start_pos();
    let mut s = searcher();
    s.setup(board, SearchLimits::nodes(20_000), None, false, 1);
    let rm = s.iterative_deepening().expect("legal moves exist");
    assert!(board.is_valid_move(rm.mv));
    // A small overshoot is fine (the budget is checked every 2048 nodes).
    assert!(s.stats().nodes < 40_000, "nodes {}", s.stats().nodes);
}

#[test]
fn repetition_draws_are_scored_zero_from_history() {
    // Play a shuffle into the search history; the search must see the draw.
    use castellan::nnue::StateInfo;
    use castellan::search::Stack;

    let mut board = Board::start_pos();
    let mut stack = Stack::new();
    let mut si = StateInfo::default();
    for lan in ["g1f3", "g8f6", "f3g1", "f6g8", "g1f3", "g8f6", "f3g1"] {
        let m = board.parse_lan(lan).unwrap();
        stack.push(board.key(), m, 0);
        board = board.do_move(m, &mut si);
    }

    // Ng8 now completes the threefold.
    let mut s = searcher();
    s.setup(board, SearchLimits::depth(4), Some(&stack), false, 1);
    let _ = s.iterative_deepening();
    // The draw line must not be scored as winning material for either side.
    let rm = s.pv_start(0);
    assert!(rm.score.abs() < 200, "score {}", rm.score);
}
