//! Quiet-move history heuristic.

use crate::board::{Board, Move};

/// Butterfly-style main history indexed by (piece, to-square), with the
/// saturating update `h += 32*bonus - h*|bonus|/512` that keeps entries
/// inside +-16384 without explicit clamping.
pub struct Histories {
    main: Box<[[i16; 64]; 12]>,
}

impl Histories {
    #[must_use]
    pub fn new() -> Self {
        Histories {
            main: Box::new([[0; 64]; 12]),
        }
    }

    pub fn reset(&mut self) {
        for row in self.main.iter_mut() {
            row.fill(0);
        }
    }

    #[inline]
    #[must_use]
    pub fn score(&self, b: &Board, m: Move) -> i32 {
        match b.piece_on(m.from()) {
            Some(p) => i32::from(self.main[p.index()][m.to().index()]),
            None => 0,
        }
    }

    pub fn add_bonus(&mut self, b: &Board, m: Move, bonus: i32) {
        let Some(p) = b.piece_on(m.from()) else {
            return;
        };
        let entry = &mut self.main[p.index()][m.to().index()];
        let h = i32::from(*entry);
        let updated = h + 32 * bonus - h * bonus.abs() / 512;
        *entry = updated.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
    }

    /// Reward the cutoff move and penalize the quiets tried before it.
    pub fn update(&mut self, b: &Board, best: Move, depth: i32, quiets: &[Move]) {
        let bonus = depth * depth;
        self.add_bonus(b, best, bonus);
        for &m in quiets {
            if m != best {
                self.add_bonus(b, m, -bonus);
            }
        }
    }
}

impl Default for Histories {
    fn default() -> Self {
        Histories::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Square;

    #[test]
    fn bonus_saturates() {
        let mut hist = Histories::new();
        let b = Board::start_pos();
        let m = Move::normal("g1".parse::<Square>().unwrap(), "f3".parse().unwrap());

        for _ in 0..1000 {
            hist.add_bonus(&b, m, 400);
        }
        let high = hist.score(&b, m);
        assert!(high > 0 && high <= 16384);

        for _ in 0..1000 {
            hist.add_bonus(&b, m, -400);
        }
        let low = hist.score(&b, m);
        assert!(low < 0 && low >= -16384);
    }

    #[test]
    fn update_penalizes_tried_quiets() {
        let mut hist = Histories::new();
        let b = Board::start_pos();
        let best = Move::normal("g1".parse::<Square>().unwrap(), "f3".parse().unwrap());
        let other = Move::normal("b1".parse::<Square>().unwrap(), "c3".parse().unwrap());

        hist.update(&b, best, 4, &[other, best]);
        assert!(hist.score(&b, best) > 0);
        assert!(hist.score(&b, other) < 0);
    }
}
