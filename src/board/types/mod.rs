//! Core chess types: squares, pieces, bitboards, moves, castling rights.

mod bitboard;
mod castling;
mod moves;
mod piece;
mod square;

pub use bitboard::{
    Bitboard, FILE_A_BB, FILE_H_BB, RANK_1_BB, RANK_2_BB, RANK_4_BB, RANK_5_BB, RANK_7_BB,
    RANK_8_BB,
};
pub use castling::CastlingRights;
pub use moves::{ExtMove, Move, MoveKind, MoveList, MAX_MOVES};
pub use piece::{Color, Piece, PieceType, ALL_PIECE_TYPES, PROMOTION_TYPES};
pub use square::Square;
