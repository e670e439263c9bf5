//! Error types for board-boundary parsing.

use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SquareError {
    InvalidNotation { notation: String },
}

impl fmt::Display for SquareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SquareError::InvalidNotation { notation } => {
                write!(f, "invalid square notation: {notation:?}")
            }
        }
    }
}

impl Error for SquareError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FenError {
    TooFewParts { found: usize },
    InvalidPiece { ch: char },
    InvalidRankLayout,
    InvalidSideToMove { found: String },
    InvalidCastling { ch: char },
    InvalidEnPassant { found: String },
    InconsistentPosition,
}

impl fmt::Display for FenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FenError::TooFewParts { found } => {
                write!(f, "FEN needs at least 4 fields, found {found}")
            }
            FenError::InvalidPiece { ch } => write!(f, "invalid piece character {ch:?}"),
            FenError::InvalidRankLayout => write!(f, "rank description does not fit the board"),
            FenError::InvalidSideToMove { found } => {
                write!(f, "invalid side to move {found:?}")
            }
            FenError::InvalidCastling { ch } => write!(f, "invalid castling character {ch:?}"),
            FenError::InvalidEnPassant { found } => {
                write!(f, "invalid en passant square {found:?}")
            }
            FenError::InconsistentPosition => write!(f, "position fails validation"),
        }
    }
}

impl Error for FenError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveParseError {
    InvalidLength { len: usize },
    InvalidSquare { notation: String },
    InvalidPromotion { ch: char },
    IllegalMove { notation: String },
}

impl fmt::Display for MoveParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveParseError::InvalidLength { len } => {
                write!(f, "move must be 4 or 5 characters, got {len}")
            }
            MoveParseError::InvalidSquare { notation } => {
                write!(f, "invalid square in move {notation:?}")
            }
            MoveParseError::InvalidPromotion { ch } => {
                write!(f, "invalid promotion piece {ch:?}")
            }
            MoveParseError::IllegalMove { notation } => {
                write!(f, "move {notation:?} is not legal in this position")
            }
        }
    }
}

impl Error for MoveParseError {}
