//! Quantized NNUE-style evaluator.
//!
//! A small feature-transformer network: 3072 king-bucketed piece-square
//! features into a 256-wide int16 hidden layer per perspective, clamped and
//! fed through per-side int16 output rows, plus a learned per-feature PSQT
//! scalar. Accumulators update incrementally from per-ply piece deltas and
//! refresh from scratch when the king changes bucket.

mod network;
mod state;

pub use network::{material_eval, Evaluator, Network, HIDDEN, N_FEATURES, S_A, S_W};
pub use state::{refresh_accumulator, update_accumulator, Accumulator, Delta, StateInfo};

use crate::board::{Color, Piece, Square};

pub const N_KING_BUCKETS: usize = 4;

#[rustfmt::skip]
const KING_BUCKETS: [usize; 64] = [
    0, 0, 1, 1, 1, 1, 0, 0,
    2, 2, 2, 2, 2, 2, 2, 2,
    3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3,
    3, 3, 3, 3, 3, 3, 3, 3,
];

/// Feature index of `piece` on `sq` from `pov`'s perspective with the
/// perspective king on `ksq`. Black's view is vertically flipped.
#[inline]
#[must_use]
pub fn feature_index(pov: Color, sq: Square, piece: Piece, ksq: Square) -> usize {
    let p_idx = 2 * piece.kind.index() + usize::from(piece.color != pov);
    let flip = pov.index() * 56;
    let o_sq = sq.index() ^ flip;
    let o_ksq = ksq.index() ^ flip;
    o_sq + 64 * p_idx + 64 * 12 * KING_BUCKETS[o_ksq]
}

/// Do two king squares share a bucket from `pov`'s perspective?
#[inline]
#[must_use]
pub fn same_king_bucket(pov: Color, s1: Square, s2: Square) -> bool {
    let flip = pov.index() * 56;
    KING_BUCKETS[s1.index() ^ flip] == KING_BUCKETS[s2.index() ^ flip]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::PieceType;

    #[test]
    fn feature_indices_in_range() {
        for color in [Color::White, Color::Black] {
            for sq_idx in 0..64 {
                let sq = Square::from_index(sq_idx);
                let p = Piece::new(color, PieceType::Queen);
                let idx = feature_index(Color::White, sq, p, Square::E1);
                assert!(idx < N_FEATURES);
                let idx = feature_index(Color::Black, sq, p, Square::E8);
                assert!(idx < N_FEATURES);
            }
        }
    }

    #[test]
    fn perspective_flip_is_symmetric() {
        let wp = Piece::new(Color::White, PieceType::Pawn);
        let bp = Piece::new(Color::Black, PieceType::Pawn);
        let from_white = feature_index(Color::White, "e4".parse().unwrap(), wp, Square::E1);
        let from_black = feature_index(
            Color::Black,
            "e5".parse().unwrap(),
            bp,
            "e8".parse().unwrap(),
        );
        assert_eq!(from_white, from_black);
    }

    #[test]
    fn bucket_boundaries() {
        assert!(same_king_bucket(Color::White, Square::E1, "f1".parse().unwrap()));
        assert!(!same_king_bucket(Color::White, Square::E1, "a1".parse().unwrap()));
        assert!(!same_king_bucket(Color::White, Square::E1, "e2".parse().unwrap()));
    }
}
