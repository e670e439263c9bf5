//! FEN parsing and formatting, plus long-algebraic move parsing.

use super::error::{FenError, MoveParseError};
use super::movegen::GenKind;
use super::state::Board;
use super::types::{CastlingRights, Color, Move, MoveKind, Piece, PieceType, Square};
use crate::zobrist::ZOBRIST;

impl Board {
    /// Parse a FEN string. The half-move and full-move counters are read when
    /// present and default to 0 and 1 otherwise.
    pub fn load_fen(fen: &str) -> Result<Board, FenError> {
        let mut b = Board::empty();
        let mut parts = fen.split_whitespace();

        let placement = parts.next().ok_or(FenError::TooFewParts { found: 0 })?;
        let mut rank = 7usize;
        let mut file = 0usize;
        for ch in placement.chars() {
            match ch {
                '/' => {
                    if file != 8 || rank == 0 {
                        return Err(FenError::InvalidRankLayout);
                    }
                    rank -= 1;
                    file = 0;
                }
                '1'..='8' => {
                    file += ch as usize - '0' as usize;
                    if file > 8 {
                        return Err(FenError::InvalidRankLayout);
                    }
                }
                _ => {
                    let p = Piece::from_char(ch).ok_or(FenError::InvalidPiece { ch })?;
                    if file >= 8 {
                        return Err(FenError::InvalidRankLayout);
                    }
                    b.put_piece(p, Square::new(file, rank));
                    file += 1;
                }
            }
        }
        if rank != 0 || file != 8 {
            return Err(FenError::InvalidRankLayout);
        }

        let stm = parts.next().ok_or(FenError::TooFewParts { found: 1 })?;
        b.stm = match stm {
            "w" => Color::White,
            "b" => Color::Black,
            other => {
                return Err(FenError::InvalidSideToMove {
                    found: other.to_string(),
                })
            }
        };
        if b.stm == Color::Black {
            b.key ^= ZOBRIST.side();
        }

        let castling = parts.next().ok_or(FenError::TooFewParts { found: 2 })?;
        if castling != "-" {
            for ch in castling.chars() {
                let right = match ch {
                    'K' => CastlingRights::WHITE_KINGSIDE,
                    'Q' => CastlingRights::WHITE_QUEENSIDE,
                    'k' => CastlingRights::BLACK_KINGSIDE,
                    'q' => CastlingRights::BLACK_QUEENSIDE,
                    _ => return Err(FenError::InvalidCastling { ch }),
                };
                b.castling.add(right);
            }
        }
        b.key ^= ZOBRIST.castling(b.castling);

        let ep = parts.next().ok_or(FenError::TooFewParts { found: 3 })?;
        if ep != "-" {
            let sq: Square = ep.parse().map_err(|_| FenError::InvalidEnPassant {
                found: ep.to_string(),
            })?;
            b.en_passant = Some(sq);
            b.key ^= ZOBRIST.en_passant(sq);
        }

        if let Some(half) = parts.next() {
            b.half_moves = half.parse().unwrap_or(0);
        }
        if let Some(full) = parts.next() {
            b.full_moves = full.parse().unwrap_or(1).max(1);
        }

        if b.pieces(Color::White, PieceType::King).count() != 1
            || b.pieces(Color::Black, PieceType::King).count() != 1
        {
            return Err(FenError::InconsistentPosition);
        }
        b.update_pin_info();

        if !b.is_valid() {
            return Err(FenError::InconsistentPosition);
        }
        Ok(b)
    }

    #[must_use]
    pub fn get_fen(&self) -> String {
        let mut fen = String::with_capacity(90);
        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.piece_on(Square::new(file, rank)) {
                    Some(p) => {
                        if empty > 0 {
                            fen.push((b'0' + empty) as char);
                            empty = 0;
                        }
                        fen.push(p.to_char());
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                fen.push((b'0' + empty) as char);
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(if self.stm == Color::White { 'w' } else { 'b' });
        fen.push(' ');
        fen.push_str(&self.castling.to_string());
        fen.push(' ');
        match self.en_passant {
            Some(sq) => fen.push_str(&sq.to_string()),
            None => fen.push('-'),
        }
        fen.push_str(&format!(" {} {}", self.half_moves, self.full_moves));
        fen
    }

    /// Parse a long-algebraic move ("e2e4", "e7e8q") against the legal moves
    /// of this position.
    pub fn parse_lan(&self, lan: &str) -> Result<Move, MoveParseError> {
        let bytes = lan.as_bytes();
        if bytes.len() < 4 || bytes.len() > 5 || !lan.is_ascii() {
            return Err(MoveParseError::InvalidLength { len: bytes.len() });
        }

        let from: Square = lan[0..2]
            .parse()
            .map_err(|_| MoveParseError::InvalidSquare {
                notation: lan.to_string(),
            })?;
        let to: Square = lan[2..4]
            .parse()
            .map_err(|_| MoveParseError::InvalidSquare {
                notation: lan.to_string(),
            })?;

        let promotion = if bytes.len() == 5 {
            let ch = bytes[4] as char;
            let kind =
                PieceType::from_char(ch).ok_or(MoveParseError::InvalidPromotion { ch })?;
            if kind == PieceType::Pawn || kind == PieceType::King {
                return Err(MoveParseError::InvalidPromotion { ch });
            }
            Some(kind)
        } else {
            None
        };

        for m in self.generate(GenKind::Legal).iter() {
            if m.from() != from || m.to() != to {
                continue;
            }
            let m_promo = (m.kind() == MoveKind::Promotion).then(|| m.promotion_kind());
            if m_promo == promotion {
                return Ok(m);
            }
        }

        Err(MoveParseError::IllegalMove {
            notation: lan.to_string(),
        })
    }
}
