//! Zobrist hashing for positions.
//!
//! Keys are generated from a fixed seed so that hashes are reproducible
//! across runs and across the pack codec.

use once_cell::sync::Lazy;
use rand::prelude::*;

use crate::board::{CastlingRights, Piece, Square};

const ZOBRIST_SEED: u64 = 0xDEAD_BEEF;

pub struct ZobristKeys {
    // psq[color][piece kind][square]
    psq: [[[u64; 64]; 6]; 2],
    castling: [u64; 16],
    en_passant: [u64; 8],
    side: u64,
}

impl ZobristKeys {
    fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(ZOBRIST_SEED);
        let mut psq = [[[0u64; 64]; 6]; 2];
        let mut castling = [0u64; 16];
        let mut en_passant = [0u64; 8];

        for color in &mut psq {
            for kind in color.iter_mut() {
                for key in kind.iter_mut() {
                    *key = rng.gen();
                }
            }
        }
        for key in &mut castling {
            *key = rng.gen();
        }
        for key in &mut en_passant {
            *key = rng.gen();
        }
        let side = rng.gen();

        ZobristKeys {
            psq,
            castling,
            en_passant,
            side,
        }
    }

    #[inline]
    #[must_use]
    pub fn psq(&self, p: Piece, sq: Square) -> u64 {
        self.psq[p.color.index()][p.kind.index()][sq.index()]
    }

    #[inline]
    #[must_use]
    pub fn castling(&self, cr: CastlingRights) -> u64 {
        self.castling[cr.index()]
    }

    #[inline]
    #[must_use]
    pub fn en_passant(&self, sq: Square) -> u64 {
        self.en_passant[sq.file()]
    }

    #[inline]
    #[must_use]
    pub fn side(&self) -> u64 {
        self.side
    }
}

pub static ZOBRIST: Lazy<ZobristKeys> = Lazy::new(ZobristKeys::new);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Color, PieceType};

    #[test]
    fn keys_are_deterministic() {
        let a = ZobristKeys::new();
        let p = Piece::new(Color::White, PieceType::Knight);
        assert_eq!(a.psq(p, Square::A1), ZOBRIST.psq(p, Square::A1));
        assert_eq!(a.side, ZOBRIST.side);
    }

    #[test]
    fn keys_are_distinct() {
        let p = Piece::new(Color::White, PieceType::Pawn);
        let q = Piece::new(Color::Black, PieceType::Pawn);
        assert_ne!(ZOBRIST.psq(p, Square::E1), ZOBRIST.psq(q, Square::E1));
        assert_ne!(ZOBRIST.side(), 0);
    }
}
