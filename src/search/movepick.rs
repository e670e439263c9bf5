//! Staged move ordering.
//!
//! Emission order: TT move, winning tacticals by MVV/LVA, the two killers,
//! the counter move, the follow-up move, losing tacticals, then quiets by
//! center-gain plus history. Heuristic moves are validated against the board
//! and deduplicated against everything emitted before them.

use super::history::Histories;
use crate::board::{Board, ExtMove, GenKind, Move, MoveList, PieceType, MAX_MOVES};
use crate::tt::TranspositionTable;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    TtMove,
    InitTactical,
    GoodTactical,
    Killer1,
    Killer2,
    Counter,
    FollowUp,
    BadTactical,
    InitNonTactical,
    NonTactical,
}

// MVV/LVA, indexed [victim][attacker]. Non-capture promotions score with the
// promoted piece as the victim.
#[rustfmt::skip]
const MVV_LVA: [[i16; 6]; 6] = [
    [ 7,  6,  6,  5,  4, 0], // ?xPawn
    [11, 10, 10,  9,  8, 0], // ?xKnight
    [11, 10, 10,  9,  8, 0], // ?xBishop
    [15, 14, 14, 13, 12, 0], // ?xRook
    [19, 18, 18, 17, 16, 0], // ?xQueen
    [ 0,  0,  0,  0,  0, 0],
];

// Quiet ordering: piece-type weight times the centralization gain.
const SORTING_TYPES: [i16; 6] = [10, 8, 8, 4, 3, 1];

#[rustfmt::skip]
const SORTING_TABLE: [i16; 64] = [
    0, 0, 0, 0, 0, 0, 0, 0,
    1, 2, 2, 2, 2, 2, 2, 1,
    1, 2, 4, 4, 4, 4, 2, 1,
    1, 2, 4, 6, 6, 4, 2, 1,
    1, 2, 4, 6, 6, 4, 2, 1,
    1, 2, 4, 4, 4, 4, 2, 1,
    1, 2, 2, 2, 2, 2, 2, 1,
    0, 0, 0, 0, 0, 0, 0, 0,
];

fn insertion_sort_desc(moves: &mut [ExtMove]) {
    for i in 1..moves.len() {
        let x = moves[i];
        let mut j = i;
        while j > 0 && moves[j - 1].score < x.score {
            moves[j] = moves[j - 1];
            j -= 1;
        }
        moves[j] = x;
    }
}

pub struct MovePicker {
    ttm: Move,
    killers: [Move; 2],
    counter: Move,
    followup: Move,
    stage: Stage,

    moves: [ExtMove; MAX_MOVES],
    cur: usize,
    end: usize,
    // Losing tacticals are buffered at the front of `moves`; `cur` has always
    // advanced past the slots they overwrite.
    end_bad: usize,
}

impl MovePicker {
    /// Picker for the main search.
    #[must_use]
    pub fn new(ttm: Move, killers: [Move; 2], counter: Move, followup: Move) -> Self {
        MovePicker {
            ttm,
            killers,
            counter,
            followup,
            stage: if ttm != Move::NONE {
                Stage::TtMove
            } else {
                Stage::InitTactical
            },
            moves: [ExtMove::default(); MAX_MOVES],
            cur: 0,
            end: 0,
            end_bad: 0,
        }
    }

    /// Picker for quiescence: no TT move, no quiet-ordering heuristics.
    #[must_use]
    pub fn new_quiescence() -> Self {
        MovePicker::new(Move::NONE, [Move::NONE; 2], Move::NONE, Move::NONE)
    }

    #[inline]
    #[must_use]
    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Next move, or `Move::NONE` when exhausted. With `tacticals_only` the
    /// picker stops after the winning tacticals (quiescence mode).
    pub fn next(&mut self, b: &Board, hist: Option<&Histories>, tacticals_only: bool) -> Move {
        loop {
            match self.stage {
                Stage::TtMove => {
                    self.stage = Stage::InitTactical;
                    return self.ttm;
                }
                Stage::InitTactical => {
                    let mut list = MoveList::new();
                    b.generate_into(GenKind::Tactical, &mut list);
                    self.end = list.len();
                    self.moves[..self.end].copy_from_slice(list.as_slice());
                    self.cur = 0;
                    self.end_bad = 0;
                    self.score_tactical(b);
                    insertion_sort_desc(&mut self.moves[..self.end]);
                    self.stage = Stage::GoodTactical;
                }
                Stage::GoodTactical => {
                    while self.cur < self.end {
                        let em = self.moves[self.cur];
                        self.cur += 1;
                        if em.mv == self.ttm {
                            continue;
                        }
                        if b.see_ge(em.mv, 0) {
                            return em.mv;
                        }
                        self.moves[self.end_bad] = em;
                        self.end_bad += 1;
                    }
                    if tacticals_only {
                        return Move::NONE;
                    }
                    self.stage = Stage::Killer1;
                }
                Stage::Killer1 => {
                    self.stage = Stage::Killer2;
                    let k = self.killers[0];
                    if k != self.ttm && b.is_valid_move(k) {
                        return k;
                    }
                }
                Stage::Killer2 => {
                    self.stage = Stage::Counter;
                    let k = self.killers[1];
                    if k != self.ttm && b.is_valid_move(k) {
                        return k;
                    }
                }
                Stage::Counter => {
                    self.stage = Stage::FollowUp;
                    let c = self.counter;
                    if c != self.ttm
                        && c != self.killers[0]
                        && c != self.killers[1]
                        && b.is_valid_move(c)
                    {
                        return c;
                    }
                }
                Stage::FollowUp => {
                    self.stage = Stage::BadTactical;
                    self.cur = 0;
                    self.end = self.end_bad;
                    let f = self.followup;
                    if f != self.ttm
                        && f != self.killers[0]
                        && f != self.killers[1]
                        && f != self.counter
                        && b.is_valid_move(f)
                    {
                        return f;
                    }
                }
                Stage::BadTactical => {
                    while self.cur < self.end {
                        let em = self.moves[self.cur];
                        self.cur += 1;
                        if em.mv != self.ttm {
                            return em.mv;
                        }
                    }
                    self.stage = Stage::InitNonTactical;
                }
                Stage::InitNonTactical => {
                    let mut list = MoveList::new();
                    b.generate_into(GenKind::NonTactical, &mut list);
                    self.end = list.len();
                    self.moves[..self.end].copy_from_slice(list.as_slice());
                    self.cur = 0;
                    self.score_nontactical(b, hist);
                    insertion_sort_desc(&mut self.moves[..self.end]);
                    self.stage = Stage::NonTactical;
                }
                Stage::NonTactical => {
                    while self.cur < self.end {
                        let m = self.moves[self.cur].mv;
                        self.cur += 1;
                        if m != self.ttm
                            && m != self.killers[0]
                            && m != self.killers[1]
                            && m != self.counter
                            && m != self.followup
                        {
                            return m;
                        }
                    }
                    return Move::NONE;
                }
            }
        }
    }

    fn score_tactical(&mut self, b: &Board) {
        for em in &mut self.moves[..self.end] {
            let attacker = b
                .piece_on(em.mv.from())
                .map_or(PieceType::Pawn, |p| p.kind);
            let victim = match b.piece_on(em.mv.to()) {
                Some(p) => p.kind,
                // Empty destination: a promotion scores as the promoted
                // piece, en passant falls into the knight row.
                None => em.mv.promotion_kind(),
            };
            em.score = MVV_LVA[victim.index()][attacker.index()];
        }
    }

    fn score_nontactical(&mut self, b: &Board, hist: Option<&Histories>) {
        for em in &mut self.moves[..self.end] {
            let m = em.mv;
            let k = b
                .piece_on(m.from())
                .map_or(0, |p| SORTING_TYPES[p.kind.index()]);
            em.score = k * (SORTING_TABLE[m.to().index()] - SORTING_TABLE[m.from().index()]);
            if let Some(h) = hist {
                em.score = em.score.saturating_add(h.score(b, m) as i16);
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct RootMove {
    pub mv: Move,
    pub score: i32,
}

/// Root move list: all legal moves enumerated once, re-sorted by bringing the
/// iteration's best move to the front, with an exclusion prefix for multi-PV.
pub struct RootMovePicker {
    moves: Vec<RootMove>,
    cur: usize,
    mpv_start: usize,
}

impl RootMovePicker {
    #[must_use]
    pub fn new() -> Self {
        RootMovePicker {
            moves: Vec::new(),
            cur: 0,
            mpv_start: 0,
        }
    }

    /// Enumerate the root moves in picker order.
    pub fn reset(&mut self, root: &Board, tt: &TranspositionTable) {
        let ttm = tt
            .probe(root.key())
            .map(|e| e.mv)
            .filter(|&m| root.is_valid_move(m))
            .unwrap_or(Move::NONE);

        self.moves.clear();
        self.cur = 0;
        self.mpv_start = 0;

        let mut mp = MovePicker::new(ttm, [Move::NONE; 2], Move::NONE, Move::NONE);
        loop {
            let m = mp.next(root, None, false);
            if m == Move::NONE {
                break;
            }
            self.moves.push(RootMove { mv: m, score: 0 });
        }
    }

    pub fn next(&mut self) -> Move {
        if self.cur >= self.moves.len() {
            return Move::NONE;
        }
        let m = self.moves[self.cur].mv;
        self.cur += 1;
        m
    }

    #[must_use]
    pub fn num_moves(&self) -> usize {
        self.moves.len()
    }

    /// Rotate the iteration's best move to the front of the active window and
    /// rewind for the next iteration.
    pub fn complete_iter(&mut self, best_move_idx: usize) {
        let best = best_move_idx + self.mpv_start;
        if best < self.moves.len() {
            self.moves[self.mpv_start..=best].rotate_right(1);
        }
        self.cur = self.mpv_start;
    }

    pub fn mpv_reset(&mut self) {
        self.mpv_start = 0;
        self.cur = 0;
    }

    /// Freeze the current front move with its score and shrink the window;
    /// subsequent multi-PV passes skip it.
    pub fn exclude_top_move(&mut self, score: i32) {
        debug_assert!(self.mpv_start < self.moves.len());
        self.moves[self.mpv_start].score = score;
        self.mpv_start += 1;
        self.cur = self.mpv_start;
    }

    #[must_use]
    pub fn num_excluded(&self) -> usize {
        self.mpv_start
    }

    #[must_use]
    pub fn get(&self, idx: usize) -> RootMove {
        self.moves[idx]
    }

    #[must_use]
    pub fn best_move(&self) -> Option<RootMove> {
        self.moves.first().copied()
    }
}

impl Default for RootMovePicker {
    fn default() -> Self {
        RootMovePicker::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Square;

    #[test]
    fn emits_each_legal_move_exactly_once() {
        let b = Board::load_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let legal = b.generate(GenKind::Legal);
        let hist = Histories::new();

        // Seed the picker with a TT move and a killer that are both legal.
        let ttm = b.parse_lan("e2a6").unwrap();
        let killer = b.parse_lan("a2a3").unwrap();
        let mut mp = MovePicker::new(ttm, [killer, Move::NONE], Move::NONE, Move::NONE);

        let mut seen = Vec::new();
        loop {
            let m = mp.next(&b, Some(&hist), false);
            if m == Move::NONE {
                break;
            }
            assert!(!seen.contains(&m), "{m} emitted twice");
            assert!(b.is_valid_move(m), "{m} is not legal");
            seen.push(m);
        }
        assert_eq!(seen.len(), legal.len());
        assert_eq!(seen[0], ttm);
    }

    #[test]
    fn good_captures_come_before_bad() {
        // Queen can take a defended pawn (bad) or an undefended rook (good).
        let b = Board::load_fen("4k3/2p5/3p4/r7/8/8/3Q4/4K3 w - - 0 1").unwrap();
        let mut mp = MovePicker::new(Move::NONE, [Move::NONE; 2], Move::NONE, Move::NONE);
        let mut order = Vec::new();
        loop {
            let m = mp.next(&b, None, true);
            if m == Move::NONE {
                break;
            }
            order.push(m.to_string());
        }
        // Rook capture passes SEE, pawn capture is buffered out of q-mode.
        assert!(order.contains(&"d2a5".to_string()));
        assert!(!order.contains(&"d2d6".to_string()));
    }

    #[test]
    fn quiescence_mode_stops_after_good_tacticals() {
        let b = Board::start_pos();
        let mut mp = MovePicker::new_quiescence();
        assert_eq!(mp.next(&b, None, true), Move::NONE);
    }

    #[test]
    fn root_picker_rotation() {
        let b = Board::start_pos();
        let tt = TranspositionTable::new(1);
        let mut rmp = RootMovePicker::new();
        rmp.reset(&b, &tt);
        assert_eq!(rmp.num_moves(), 20);

        // Consume three moves, declare the third best.
        let _ = rmp.next();
        let _ = rmp.next();
        let third = rmp.next();
        rmp.complete_iter(2);
        assert_eq!(rmp.next(), third);

        rmp.complete_iter(0);
        rmp.exclude_top_move(55);
        assert_eq!(rmp.num_excluded(), 1);
        assert_eq!(rmp.get(0).mv, third);
        assert_eq!(rmp.get(0).score, 55);
        // The excluded move is skipped on the next pass.
        assert_ne!(rmp.next(), third);
    }

    #[test]
    fn killer_must_be_valid() {
        let b = Board::start_pos();
        // A killer from some other position: pseudo-legal nonsense here.
        let bogus = Move::normal("a8".parse::<Square>().unwrap(), "a1".parse().unwrap());
        let mut mp = MovePicker::new(Move::NONE, [bogus, Move::NONE], Move::NONE, Move::NONE);
        loop {
            let m = mp.next(&b, None, false);
            if m == Move::NONE {
                break;
            }
            assert_ne!(m, bogus);
        }
    }
}
