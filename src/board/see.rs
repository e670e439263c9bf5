//! Static Exchange Evaluation.

use super::attacks;
use super::state::{Board, PIECE_VALUES};
use super::types::{Bitboard, Move, MoveKind, PieceType};

impl Board {
    fn value_on(&self, sq: super::types::Square) -> i32 {
        self.piece_on(sq)
            .map_or(0, |p| PIECE_VALUES[p.kind.index()])
    }

    /// Does the exchange started by `m` gain at least `threshold` centipawns?
    ///
    /// Swap-off simulation in least-valuable-attacker order with x-ray
    /// attackers revealed through vacated squares. Attackers pinned to their
    /// own king are excluded while any pinner survives, and a final king
    /// recapture is ruled out when the opponent still has a defender.
    #[must_use]
    pub fn see_ge(&self, m: Move, threshold: i32) -> bool {
        // Castling, promotions and en passant do not swap off cleanly; treat
        // them as break-even.
        if m.kind() != MoveKind::Normal {
            return threshold >= 0;
        }

        let (from, to) = (m.from(), m.to());

        let mut balance = self.value_on(to) - threshold;
        if balance < 0 {
            return false;
        }

        balance = self.value_on(from) - balance;
        if balance <= 0 {
            return true;
        }

        let mut occupied =
            self.occupied ^ Bitboard::from_square(from) ^ Bitboard::from_square(to);
        let mut stm = self.side_to_move();
        let mut attackers = self.attackers_to(to, occupied);

        let mut res = 1;
        loop {
            stm = !stm;
            attackers &= occupied;

            let mut stm_attackers = attackers & self.pieces_of(stm);
            if stm_attackers.is_empty() {
                break;
            }

            if (self.pinners(!stm) & occupied).any() {
                stm_attackers &= !self.king_blockers(stm);
            }
            if stm_attackers.is_empty() {
                break;
            }

            res ^= 1;

            let diag = self.pieces2(PieceType::Bishop, PieceType::Queen);
            let straight = self.pieces2(PieceType::Rook, PieceType::Queen);

            let bb = stm_attackers & self.pieces_kind(PieceType::Pawn);
            if bb.any() {
                balance = PIECE_VALUES[PieceType::Pawn.index()] - balance;
                if balance < res {
                    break;
                }
                occupied ^= bb.lsb_bb();
                attackers |= attacks::bishop_attacks(to, occupied) & diag;
                continue;
            }

            let bb = stm_attackers & self.pieces_kind(PieceType::Knight);
            if bb.any() {
                balance = PIECE_VALUES[PieceType::Knight.index()] - balance;
                if balance < res {
                    break;
                }
                occupied ^= bb.lsb_bb();
                continue;
            }

            let bb = stm_attackers & self.pieces_kind(PieceType::Bishop);
            if bb.any() {
                balance = PIECE_VALUES[PieceType::Bishop.index()] - balance;
                if balance < res {
                    break;
                }
                occupied ^= bb.lsb_bb();
                attackers |= attacks::bishop_attacks(to, occupied) & diag;
                continue;
            }

            let bb = stm_attackers & self.pieces_kind(PieceType::Rook);
            if bb.any() {
                balance = PIECE_VALUES[PieceType::Rook.index()] - balance;
                if balance < res {
                    break;
                }
                occupied ^= bb.lsb_bb();
                attackers |= attacks::rook_attacks(to, occupied) & straight;
                continue;
            }

            let bb = stm_attackers & self.pieces_kind(PieceType::Queen);
            if bb.any() {
                balance = PIECE_VALUES[PieceType::Queen.index()] - balance;
                if balance < res {
                    break;
                }
                occupied ^= bb.lsb_bb();
                attackers |= attacks::bishop_attacks(to, occupied) & diag;
                attackers |= attacks::rook_attacks(to, occupied) & straight;
                continue;
            }

            // Only the king is left. The recapture stands unless the other
            // side still has an attacker aimed at the square.
            return if (attackers & !self.pieces_of(stm)).any() {
                res ^ 1 != 0
            } else {
                res != 0
            };
        }

        res != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::types::{Move, Square};

    fn mv(from: &str, to: &str) -> Move {
        let from: Square = from.parse().unwrap();
        let to: Square = to.parse().unwrap();
        Move::normal(from, to)
    }

    #[test]
    fn queen_takes_defended_pawn_loses() {
        // Pawn d5 is defended by the pawn on e6.
        let b = Board::load_fen("4k3/8/4p3/3p4/8/8/3Q4/4K3 w - - 0 1").unwrap();
        assert!(!b.see_ge(mv("d2", "d5"), 0));
    }

    #[test]
    fn queen_takes_undefended_pawn_wins() {
        let b = Board::load_fen("4k3/8/8/3p4/8/8/3Q4/4K3 w - - 0 1").unwrap();
        assert!(b.see_ge(mv("d2", "d5"), 0));
        assert!(b.see_ge(mv("d2", "d5"), 100));
        assert!(!b.see_ge(mv("d2", "d5"), 101));
    }

    #[test]
    fn pawn_takes_defended_pawn_is_even() {
        let b = Board::load_fen("4k3/8/4p3/3p4/4P3/8/8/4K3 w - - 0 1").unwrap();
        assert!(b.see_ge(mv("e4", "d5"), 0));
    }

    #[test]
    fn xray_recapture_counts() {
        // Rxd5 is met by Rxd5, backed up by our doubled rook: an even rook
        // trade with a pawn in the till.
        let b = Board::load_fen("3r3k/8/8/3p4/8/8/8/3RR2K w - - 0 1").unwrap();
        assert!(b.see_ge(mv("d1", "d5"), 100));
    }

    #[test]
    fn pinned_defender_does_not_count() {
        // The e6 knight "defends" d5 but is pinned to the e8 king by the e1 rook.
        let b = Board::load_fen("4k3/8/4n3/3p4/8/8/8/3QR1K1 w - - 0 1").unwrap();
        assert!(b.see_ge(mv("d1", "d5"), 0));
    }

    #[test]
    fn quiet_move_see_threshold() {
        let b = Board::start_pos();
        assert!(b.see_ge(mv("g1", "f3"), 0));
        assert!(!b.see_ge(mv("g1", "f3"), 1));
    }
}
