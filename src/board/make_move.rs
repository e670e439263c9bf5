//! Making moves: `do_move`, `do_null_move` and external-move validation.

use super::attacks;
use super::state::Board;
use super::types::{
    Bitboard, CastlingRights, Color, Move, MoveKind, Piece, PieceType, Square, RANK_2_BB,
    RANK_4_BB, RANK_5_BB, RANK_7_BB,
};
use crate::nnue::StateInfo;
use crate::zobrist::ZOBRIST;

// Squares whose vacation or occupation cancels a castling right.
const KINGSIDE_RIGHTS_BB: [Bitboard; 2] = [
    Bitboard(1 << 4 | 1 << 7),   // e1, h1
    Bitboard(1 << 60 | 1 << 63), // e8, h8
];
const QUEENSIDE_RIGHTS_BB: [Bitboard; 2] = [
    Bitboard(1 << 4 | 1),        // e1, a1
    Bitboard(1 << 60 | 1 << 56), // e8, a8
];

// Squares between king and rook that must be empty to castle.
const KINGSIDE_PATH: [Bitboard; 2] = [
    Bitboard(1 << 5 | 1 << 6),   // f1, g1
    Bitboard(1 << 61 | 1 << 62), // f8, g8
];
const QUEENSIDE_PATH: [Bitboard; 2] = [
    Bitboard(1 << 1 | 1 << 2 | 1 << 3),    // b1, c1, d1
    Bitboard(1 << 57 | 1 << 58 | 1 << 59), // b8, c8, d8
];

impl Board {
    /// Play `m`, producing the child position. Evaluator deltas for the moved,
    /// captured and promoted pieces are recorded into `st`; the caller links
    /// `st` to its parent.
    #[must_use]
    pub fn do_move(&self, m: Move, st: &mut StateInfo) -> Board {
        let mut result = *self;
        result.en_passant = None;
        result.checkers = Bitboard::EMPTY;
        st.reset();

        let (from, to) = (m.from(), m.to());
        let us = self.stm;
        let them = !us;
        let from_bb = Bitboard::from_square(from);
        let to_bb = Bitboard::from_square(to);

        let moved = result.remove_piece(from);
        debug_assert_eq!(moved.color, us);

        if m.kind() == MoveKind::Promotion {
            st.remove_piece(moved, from);
            st.add_piece(Piece::new(us, m.promotion_kind()), to);
        } else {
            st.move_piece(moved, from, to);
        }

        let captured = result.piece_on(to);
        if let Some(cap) = captured {
            result.remove_piece(to);
            st.remove_piece(cap, to);
        }

        let placed = if m.kind() == MoveKind::Promotion {
            Piece::new(us, m.promotion_kind())
        } else {
            moved
        };
        result.put_piece(placed, to);

        let mbb = from_bb | to_bb;
        let mut disabled = CastlingRights::NONE;
        for c in [Color::White, Color::Black] {
            if (mbb & KINGSIDE_RIGHTS_BB[c.index()]).any() {
                disabled.add(CastlingRights::kingside(c));
            }
            if (mbb & QUEENSIDE_RIGHTS_BB[c.index()]).any() {
                disabled.add(CastlingRights::queenside(c));
            }
        }
        result.castling.remove(disabled);

        let their_ksq = result.king_square(them);

        match moved.kind {
            PieceType::Knight => {
                result.checkers |= attacks::knight_attacks(their_ksq) & to_bb;
            }
            PieceType::Pawn => match m.kind() {
                MoveKind::EnPassant => {
                    let cap_sq = Square::new(to.file(), from.rank());
                    result.remove_piece(cap_sq);
                    st.remove_piece(Piece::new(them, PieceType::Pawn), cap_sq);
                    result.checkers |= attacks::pawn_attacks(them, their_ksq) & to_bb;
                }
                MoveKind::Promotion => {
                    if m.promotion_kind() == PieceType::Knight {
                        result.checkers |= attacks::knight_attacks(their_ksq) & to_bb;
                    }
                    // Slider promotions fall out of the sniper scan below.
                }
                _ => {
                    let double_push = (from_bb & (RANK_2_BB | RANK_7_BB)).any()
                        && (to_bb & (RANK_4_BB | RANK_5_BB)).any();
                    if double_push {
                        let behind = (from_bb & RANK_2_BB) | (to_bb & RANK_5_BB);
                        result.en_passant = Some((behind << 8).lsb());
                    }
                    result.checkers |= attacks::pawn_attacks(them, their_ksq) & to_bb;
                }
            },
            PieceType::King if m.kind() == MoveKind::Castling => {
                let rank = to.rank();
                let queenside = to.file() == 2;
                let (rk_from, rk_to) = if queenside {
                    (Square::new(0, rank), Square::new(3, rank))
                } else {
                    (Square::new(7, rank), Square::new(5, rank))
                };
                let rook = result.remove_piece(rk_from);
                result.put_piece(rook, rk_to);
                st.move_piece(rook, rk_from, rk_to);
            }
            _ => {}
        }

        let (blockers, pinners) =
            result.slider_blockers(result.pieces_of(them), result.king_square(us));
        result.king_blockers[us.index()] = blockers;
        result.pinners[them.index()] = pinners;

        let mut checkers = result.checkers;
        let (blockers, pinners) =
            result.slider_blockers_and_checkers(result.pieces_of(us), their_ksq, &mut checkers);
        result.checkers = checkers;
        result.king_blockers[them.index()] = blockers;
        result.pinners[us.index()] = pinners;

        result.stm = them;
        // half_moves may saturate in deep quiescence lines; the fifty-move
        // counter is meaningless there anyway.
        result.half_moves = result.half_moves.saturating_add(1);
        result.plies_from_null = result.plies_from_null.saturating_add(1);
        if us == Color::Black {
            result.full_moves += 1;
        }
        if moved.kind == PieceType::Pawn || captured.is_some() {
            result.half_moves = 0;
        }

        result.key ^= ZOBRIST.side();
        result.key ^= ZOBRIST.castling(self.castling) ^ ZOBRIST.castling(result.castling);
        if let Some(ep) = self.en_passant {
            result.key ^= ZOBRIST.en_passant(ep);
        }
        if let Some(ep) = result.en_passant {
            result.key ^= ZOBRIST.en_passant(ep);
        }

        result
    }

    /// Pass the move. Only legal when not in check.
    #[must_use]
    pub fn do_null_move(&self, st: &mut StateInfo) -> Board {
        debug_assert!(self.checkers.is_empty());

        let mut result = *self;
        st.reset();

        result.stm = !self.stm;
        result.en_passant = None;
        result.plies_from_null = 0;
        result.half_moves = result.half_moves.saturating_add(1);
        result.update_pin_info();

        result.key ^= ZOBRIST.side();
        if let Some(ep) = self.en_passant {
            result.key ^= ZOBRIST.en_passant(ep);
        }

        result
    }

    /// Full pseudo-legality plus legality check for a move from an external
    /// source: the transposition table, killer slots, or the wire. Never
    /// relies on the generator.
    #[must_use]
    pub fn is_valid_move(&self, m: Move) -> bool {
        if !m.is_some() || m == Move::NULL {
            return false;
        }

        let us = self.stm;
        let them = !us;
        let (from, to) = (m.from(), m.to());
        let from_bb = Bitboard::from_square(from);
        let to_bb = Bitboard::from_square(to);

        let moved = match self.piece_on(from) {
            Some(p) if p.color == us => p,
            _ => return false,
        };
        let captured = self.piece_on(to);
        if let Some(cap) = captured {
            if cap.color != them || cap.kind == PieceType::King {
                return false;
            }
        }

        // Occupancy and enemy set as they stand after the move; used for the
        // final discovered-check test.
        let mut occupied = self.occupied ^ from_bb;
        if captured.is_none() {
            occupied ^= to_bb;
        }
        let mut enemies = self.pieces_of(them);
        if captured.is_some() {
            enemies ^= to_bb;
        }

        let mut ksq = self.king_square(us);
        let mut dsts = Bitboard::EMPTY;

        match moved.kind {
            PieceType::Pawn => {
                let my_r3 = Bitboard::relative_rank(us, 2);
                let my_r8 = Bitboard::relative_rank(us, 7);
                match m.kind() {
                    MoveKind::Normal | MoveKind::Promotion => {
                        dsts = attacks::pawn_pushes(us, from) & !self.occupied;
                        // A blocked single push also blocks the double push.
                        let blocked = (my_r3 & self.occupied) & !from_bb;
                        dsts &= !((blocked << 8) | (blocked >> 8));
                        dsts |= attacks::pawn_attacks(us, from) & self.pieces_of(them);

                        if m.kind() == MoveKind::Promotion {
                            dsts &= my_r8;
                        } else {
                            dsts &= !my_r8;
                        }
                    }
                    MoveKind::EnPassant => {
                        if let Some(ep) = self.en_passant {
                            dsts = Bitboard::from_square(ep) & attacks::pawn_attacks(us, from);
                        }
                        let cap_bb =
                            Bitboard::from_square(Square::new(to.file(), from.rank()));
                        occupied ^= cap_bb;
                        enemies ^= cap_bb;
                    }
                    MoveKind::Castling => return false,
                }
            }
            PieceType::Knight => {
                if m.kind() != MoveKind::Normal {
                    return false;
                }
                dsts = attacks::knight_attacks(from) & !self.pieces_of(us);
            }
            PieceType::King => {
                ksq = to;
                match m.kind() {
                    MoveKind::Normal => {
                        dsts = attacks::king_attacks(from) & !self.pieces_of(us);
                    }
                    MoveKind::Castling => {
                        if self.checkers.any() || to.relative_rank(us) != 0 {
                            return false;
                        }
                        let kingside_free = (KINGSIDE_PATH[us.index()] & self.occupied).is_empty();
                        let queenside_free =
                            (QUEENSIDE_PATH[us.index()] & self.occupied).is_empty();
                        let can_kingside = self.castling.has(CastlingRights::kingside(us));
                        let can_queenside = self.castling.has(CastlingRights::queenside(us));

                        let rank = to.rank();
                        let (rk_from, rk_to);
                        if to.file() == 6 && can_kingside && kingside_free {
                            rk_from = Square::new(7, rank);
                            rk_to = Square::new(5, rank);
                            if self
                                .attackers_to_by(them, from.offset(1), self.occupied)
                                .any()
                            {
                                return false;
                            }
                        } else if to.file() == 2 && can_queenside && queenside_free {
                            rk_from = Square::new(0, rank);
                            rk_to = Square::new(3, rank);
                            if self
                                .attackers_to_by(them, from.offset(-1), self.occupied)
                                .any()
                            {
                                return false;
                            }
                        } else {
                            return false;
                        }

                        occupied ^= Bitboard::from_square(rk_from) ^ Bitboard::from_square(rk_to);
                        dsts |= to_bb;
                    }
                    _ => return false,
                }
            }
            _ => {
                if m.kind() != MoveKind::Normal {
                    return false;
                }
                dsts = attacks::piece_attacks(moved.kind, from, self.occupied)
                    & !self.pieces_of(us);
            }
        }

        if (dsts & to_bb).is_empty() {
            return false;
        }

        (self.attackers_to_by(them, ksq, occupied) & enemies).is_empty()
    }

    /// Does `m` give direct check? Discovered checks are not detected; the
    /// search only uses this as a cheap pre-filter.
    #[must_use]
    pub fn gives_check(&self, m: Move) -> bool {
        let Some(moved) = self.piece_on(m.from()) else {
            return false;
        };
        let us = self.stm;
        let them = !us;
        let ksq = self.king_square(them);
        let to_bb = Bitboard::from_square(m.to());
        let blockers = self.occupied ^ Bitboard::from_square(m.from()) ^ to_bb;

        match moved.kind {
            PieceType::Pawn => (attacks::pawn_attacks(them, ksq) & to_bb).any(),
            PieceType::Knight => (attacks::knight_attacks(ksq) & to_bb).any(),
            PieceType::Bishop | PieceType::Rook | PieceType::Queen => {
                (attacks::piece_attacks(moved.kind, ksq, blockers) & to_bb).any()
            }
            PieceType::King => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_move_updates_state() {
        let b = Board::start_pos();
        let mut st = StateInfo::default();
        let m: Move = {
            let from: Square = "e2".parse().unwrap();
            let to: Square = "e4".parse().unwrap();
            Move::normal(from, to)
        };
        assert!(b.is_valid_move(m));
        let child = b.do_move(m, &mut st);

        assert_eq!(child.side_to_move(), Color::Black);
        assert_eq!(child.en_passant(), Some("e3".parse().unwrap()));
        assert_eq!(child.half_moves(), 0);
        assert_eq!(child.key(), child.computed_key());
        assert!(child.is_valid());
        // Parent untouched.
        assert_eq!(b.side_to_move(), Color::White);
        assert!(b.piece_on("e2".parse().unwrap()).is_some());
    }

    #[test]
    fn castling_moves_the_rook() {
        let b = Board::load_fen("8/8/8/8/8/8/6k1/4K2R w K - 0 1").unwrap();
        let m = Move::castling(Square::E1, Square::G1);
        assert!(b.is_valid_move(m));

        let mut st = StateInfo::default();
        let child = b.do_move(m, &mut st);
        assert_eq!(
            child.piece_on(Square::F1),
            Some(Piece::new(Color::White, PieceType::Rook))
        );
        assert_eq!(
            child.piece_on(Square::G1),
            Some(Piece::new(Color::White, PieceType::King))
        );
        assert!(child.is_valid());
    }

    #[test]
    fn en_passant_capture_removes_pawn() {
        let b = Board::load_fen("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2").unwrap();
        let m = Move::en_passant("e5".parse().unwrap(), "d6".parse().unwrap());
        assert!(b.is_valid_move(m));

        let mut st = StateInfo::default();
        let child = b.do_move(m, &mut st);
        assert!(child.piece_on("d5".parse().unwrap()).is_none());
        assert!(child.is_valid());
    }

    #[test]
    fn null_move_flips_side_and_key() {
        let b = Board::start_pos();
        let mut st = StateInfo::default();
        let nb = b.do_null_move(&mut st);
        assert_eq!(nb.side_to_move(), Color::Black);
        assert_eq!(nb.plies_from_null(), 0);
        assert_eq!(nb.key(), nb.computed_key());
    }

    #[test]
    fn rejects_garbage_moves() {
        let b = Board::start_pos();
        // Move an empty square.
        assert!(!b.is_valid_move(Move::normal(
            "e4".parse().unwrap(),
            "e5".parse().unwrap()
        )));
        // Capture own piece.
        assert!(!b.is_valid_move(Move::normal(
            "d1".parse().unwrap(),
            "d2".parse().unwrap()
        )));
        // Move the opponent's piece.
        assert!(!b.is_valid_move(Move::normal(
            "e7".parse().unwrap(),
            "e5".parse().unwrap()
        )));
        assert!(!b.is_valid_move(Move::NONE));
        assert!(!b.is_valid_move(Move::NULL));
    }

    #[test]
    fn move_must_resolve_check() {
        let b = Board::load_fen("4k3/8/8/8/8/8/3Pq3/3K4 w - - 0 1").unwrap();
        assert!(b.checkers().any());
        // Pushing the pawn leaves the king in check.
        let push = Move::normal("d2".parse().unwrap(), "d3".parse().unwrap());
        assert!(!b.is_valid_move(push));
        assert!(b.is_valid_move(Move::normal(
            "d1".parse().unwrap(),
            "e2".parse().unwrap()
        )));
    }

    #[test]
    fn gives_check_direct() {
        let b = Board::load_fen("4k3/8/8/8/8/8/8/R3K3 w - - 0 1").unwrap();
        let m = Move::normal("a1".parse().unwrap(), "a8".parse().unwrap());
        assert!(b.gives_check(m));
        let m = Move::normal("a1".parse().unwrap(), "a2".parse().unwrap());
        assert!(!b.gives_check(m));
    }
}
