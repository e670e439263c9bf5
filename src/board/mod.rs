//! Board representation and game rules.
//!
//! Bitboard-based position with copy-on-move semantics: `do_move` returns the
//! child position and records evaluator deltas into the caller's per-ply
//! state. Move generation is fully legal and staged by move class.

pub mod attacks;
mod error;
mod fen;
mod make_move;
mod movegen;
mod see;
mod state;
mod types;

pub use error::{FenError, MoveParseError, SquareError};
pub use movegen::GenKind;
pub use state::{Board, PIECE_VALUES};
pub use types::{
    Bitboard, CastlingRights, Color, ExtMove, Move, MoveKind, MoveList, Piece, PieceType, Square,
    ALL_PIECE_TYPES, MAX_MOVES, PROMOTION_TYPES,
};
