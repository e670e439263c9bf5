//! Iterative-deepening principal-variation search.
//!
//! The driver here owns everything a search worker needs: root move list,
//! ply stack, evaluator state arena, history tables, eval cache and a handle
//! to the shared transposition table. The node recursion lives in
//! `alphabeta.rs`.

mod alphabeta;
mod history;
mod movepick;
mod params;
mod stack;

pub use history::Histories;
pub use movepick::{MovePicker, RootMove, RootMovePicker, Stage};
pub use params::{LmrTable, SearchParams};
pub use stack::{Stack, StackEntry};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::board::{Board, Color, Move};
use crate::eval_cache::EvalCache;
use crate::nnue::{Evaluator, StateInfo};
use crate::tt::TranspositionTable;

pub const VALUE_MATE: i32 = 32000;
pub const MATE_BOUND: i32 = 30000;
pub const MAX_DEPTH: i32 = 64;
pub const MAX_PLIES: usize = 1024;

#[inline]
#[must_use]
pub const fn mate_in(ply: i32) -> i32 {
    VALUE_MATE - ply
}

#[inline]
#[must_use]
pub const fn mated_in(ply: i32) -> i32 {
    -VALUE_MATE + ply
}

/// Format a score the UCI way: `cp N`, or `mate N` in full moves.
#[must_use]
pub fn format_score(score: i32) -> String {
    if score.abs() > MATE_BOUND {
        let plies = VALUE_MATE - score.abs();
        let moves = (plies + 1) / 2;
        if score > 0 {
            format!("mate {moves}")
        } else {
            format!("mate -{moves}")
        }
    } else {
        format!("cp {score}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LimitKind {
    Unlimited,
    Nodes,
    Depth,
    Time,
}

/// What bounds this search.
#[derive(Clone)]
pub struct SearchLimits {
    pub kind: LimitKind,
    pub start: Instant,
    /// Maximum depth under `Depth`, minimum depth before time-based early
    /// stops under `Time`.
    pub depth: i32,
    pub min_depth: i32,
    pub time: [i64; 2],
    pub inc: [i64; 2],
    pub move_time: i64,
    pub nodes: u64,
}

impl SearchLimits {
    #[must_use]
    pub fn unlimited() -> Self {
        SearchLimits {
            kind: LimitKind::Unlimited,
            start: Instant::now(),
            depth: MAX_DEPTH,
            min_depth: 0,
            time: [0; 2],
            inc: [0; 2],
            move_time: 0,
            nodes: 0,
        }
    }

    #[must_use]
    pub fn depth(depth: i32) -> Self {
        SearchLimits {
            kind: LimitKind::Depth,
            depth,
            ..SearchLimits::unlimited()
        }
    }

    #[must_use]
    pub fn nodes(nodes: u64) -> Self {
        SearchLimits {
            kind: LimitKind::Nodes,
            nodes,
            ..SearchLimits::unlimited()
        }
    }
}

impl Default for SearchLimits {
    fn default() -> Self {
        SearchLimits::unlimited()
    }
}

/// One deadline computed at search start; checked every ~2048 nodes.
pub struct TimeMan {
    start: Instant,
    max_time_ms: i64,
}

impl TimeMan {
    fn new() -> Self {
        TimeMan {
            start: Instant::now(),
            max_time_ms: 0,
        }
    }

    pub fn init(&mut self, limits: &SearchLimits, us: Color, overhead: i64) {
        self.start = limits.start;
        if limits.kind != LimitKind::Time {
            self.max_time_ms = 0;
            return;
        }
        self.max_time_ms = if limits.move_time > 0 {
            limits.move_time - overhead
        } else {
            limits.time[us.index()] / 30 + limits.inc[us.index()] - overhead
        }
        .max(1);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }

    #[must_use]
    pub fn out_of_time(&self) -> bool {
        self.elapsed_ms() >= self.max_time_ms
    }

    #[must_use]
    pub fn time_left_ms(&self) -> i64 {
        self.max_time_ms - self.elapsed_ms()
    }
}

#[derive(Default)]
pub struct SearchStats {
    pub nodes: u64,
    pub qnodes: u64,
    pub fail_high: u64,
    pub fail_high_first: u64,
    pub sel_depth: i32,
    pub id_depth: i32,
}

impl SearchStats {
    pub fn reset(&mut self) {
        *self = SearchStats::default();
    }
}

/// One search worker. Self-play spawns one per thread; UCI uses a single
/// instance behind the engine. Only the transposition table is shared.
pub struct Search {
    pub(crate) root: Board,
    pub(crate) stack: Stack,
    pub(crate) sis: Vec<StateInfo>,

    pub(crate) rmp: RootMovePicker,
    pv_moves: Vec<RootMove>,
    n_pvs: usize,

    pub(crate) hist: Histories,
    pub(crate) counters: Box<[Move; 4096]>,
    pub(crate) followups: Box<[Move; 4096]>,

    pub(crate) man: TimeMan,
    pub(crate) limits: SearchLimits,
    pub(crate) stats: SearchStats,

    pub(crate) ev_cache: EvalCache,
    pub(crate) params: SearchParams,
    pub(crate) lmr: LmrTable,
    pub(crate) tt: Arc<TranspositionTable>,
    pub(crate) evaluator: Evaluator,

    silent: bool,
    keep_going: Arc<AtomicBool>,
    pondering: Arc<AtomicBool>,
}

impl Search {
    #[must_use]
    pub fn new(tt: Arc<TranspositionTable>) -> Self {
        let params = SearchParams::default();
        let lmr = LmrTable::new(params.lmr_coeff);
        Search {
            root: Board::start_pos(),
            stack: Stack::new(),
            sis: vec![StateInfo::default(); MAX_PLIES + 8],
            rmp: RootMovePicker::new(),
            pv_moves: Vec::new(),
            n_pvs: 0,
            hist: Histories::new(),
            counters: Box::new([Move::NONE; 4096]),
            followups: Box::new([Move::NONE; 4096]),
            man: TimeMan::new(),
            limits: SearchLimits::unlimited(),
            stats: SearchStats::default(),
            ev_cache: EvalCache::new(),
            params,
            lmr,
            tt,
            evaluator: Evaluator::Material,
            silent: false,
            keep_going: Arc::new(AtomicBool::new(true)),
            pondering: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_silent(&mut self, silent: bool) {
        self.silent = silent;
    }

    pub fn set_evaluator(&mut self, evaluator: Evaluator) {
        self.evaluator = evaluator;
        self.ev_cache.clear();
    }

    pub fn set_params(&mut self, params: SearchParams) {
        self.lmr = LmrTable::new(params.lmr_coeff);
        self.params = params;
    }

    #[must_use]
    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn set_tt(&mut self, tt: Arc<TranspositionTable>) {
        self.tt = tt;
    }

    /// Handles for stopping this search from another thread.
    #[must_use]
    pub fn stop_handles(&self) -> (Arc<AtomicBool>, Arc<AtomicBool>) {
        (Arc::clone(&self.keep_going), Arc::clone(&self.pondering))
    }

    pub fn new_game(&mut self) {
        self.tt.new_search();
        self.hist.reset();
        self.counters.fill(Move::NONE);
        self.followups.fill(Move::NONE);
        self.ev_cache.clear();
    }

    /// Prepare a search from `root`. `history` carries the pre-root game
    /// moves for repetition detection; `multipv` caps the PV count.
    pub fn setup(
        &mut self,
        root: Board,
        limits: SearchLimits,
        history: Option<&Stack>,
        ponder: bool,
        multipv: usize,
    ) {
        self.pondering.store(ponder, Ordering::Relaxed);
        self.root = root;
        self.limits = limits;
        self.stats.reset();

        self.rmp.reset(&self.root, &self.tt);
        self.n_pvs = self.rmp.num_moves().min(multipv.max(1));

        match history {
            Some(st) => {
                self.stack = st.clone();
                self.stack.set_start(self.stack.total_height());
            }
            None => self.stack.reset(),
        }

        self.sis[0].reset();
        self.man
            .init(&self.limits, root.side_to_move(), self.params.move_overhead);
        self.keep_going.store(true, Ordering::Relaxed);
    }

    pub fn atomic_stop(&self) {
        self.keep_going.store(false, Ordering::Relaxed);
        self.pondering.store(false, Ordering::Relaxed);
    }

    pub fn stop_pondering(&self) {
        self.pondering.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn num_pvs(&self) -> usize {
        self.n_pvs
    }

    /// First move and score of the i-th PV, best first.
    #[must_use]
    pub fn pv_start(&self, i: usize) -> RootMove {
        self.pv_moves[i]
    }

    #[must_use]
    pub fn stats(&self) -> &SearchStats {
        &self.stats
    }

    /// Periodic stop check; the clock and node budget are consulted every
    /// 2048 nodes. While pondering, time never stops the search.
    pub(crate) fn keep_going(&mut self) -> bool {
        if self.stats.nodes % 2048 == 0 && self.keep_going.load(Ordering::Relaxed) {
            let ok = match self.limits.kind {
                LimitKind::Unlimited | LimitKind::Depth => true,
                LimitKind::Nodes => self.stats.nodes < self.limits.nodes,
                LimitKind::Time => {
                    self.pondering.load(Ordering::Relaxed) || !self.man.out_of_time()
                }
            };
            if !ok {
                self.keep_going.store(false, Ordering::Relaxed);
            }
        }
        self.keep_going.load(Ordering::Relaxed)
    }

    /// Memoized static evaluation of `b`, whose state lives at `sis[si_idx]`.
    pub(crate) fn evaluate(&mut self, b: &Board, si_idx: usize) -> i16 {
        if let Some(cached) = self.ev_cache.probe(b.key()) {
            return cached;
        }
        let eval = self
            .evaluator
            .evaluate(b, &mut self.sis, si_idx)
            .clamp(-MATE_BOUND + 1, MATE_BOUND - 1) as i16;
        self.ev_cache.store(b.key(), eval);
        eval
    }

    pub(crate) fn is_board_drawn(&self, b: &Board) -> bool {
        b.half_moves() >= 100
            || (b.checkers().is_empty() && b.is_material_draw())
            || self.stack.is_repetition(b)
    }

    /// Run the search to completion and return the best root move.
    pub fn iterative_deepening(&mut self) -> Option<RootMove> {
        let mut score = 0;

        if self.n_pvs == 0 {
            if !self.silent {
                println!("bestmove 0000");
            }
            return None;
        }

        if self.rmp.num_moves() == 1 && !self.silent && !self.pondering.load(Ordering::Relaxed) {
            let rm = self.rmp.best_move().expect("one legal move");
            println!("bestmove {}", rm.mv);
            return Some(rm);
        }

        self.stats.id_depth = 1;
        self.rmp.mpv_reset();
        for _ in 0..self.n_pvs {
            score = self.search_node::<true>(self.root, -VALUE_MATE, VALUE_MATE, 1);
            self.rmp.exclude_top_move(score);
        }
        self.extract_pv_moves();
        self.report();

        let max_depth = if self.limits.kind == LimitKind::Depth {
            self.limits.depth
        } else {
            MAX_DEPTH
        };

        for d in 2..=max_depth {
            self.stats.id_depth = d;
            let prev_score = score;
            let iter_start = Instant::now();

            self.rmp.mpv_reset();
            let mut aborted = false;
            for _ in 0..self.n_pvs {
                score = self.aspiration_window(score, d);
                if !self.keep_going() {
                    aborted = true;
                    break;
                }
                self.rmp.exclude_top_move(score);
            }
            if aborted || !self.keep_going() {
                break;
            }

            debug_assert_eq!(self.rmp.num_excluded(), self.n_pvs);
            self.extract_pv_moves();
            self.report();

            if self.limits.kind != LimitKind::Time {
                continue;
            }

            // Not worth starting an iteration we cannot finish.
            let iter_ms = iter_start.elapsed().as_millis() as i64;
            if (score - prev_score).abs() < 8
                && self.limits.move_time == 0
                && iter_ms >= self.man.time_left_ms()
                && d >= self.limits.min_depth
            {
                break;
            }

            if self.n_pvs == 1 && score.abs() >= VALUE_MATE - d {
                break;
            }
        }

        while self.pondering.load(Ordering::Relaxed) && self.keep_going.load(Ordering::Relaxed) {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }

        let rm = self.rmp.best_move()?;
        if !self.silent {
            let mut line = format!("bestmove {}", rm.mv);
            let mut st = StateInfo::default();
            let after = self.root.do_move(rm.mv, &mut st);
            if let Some(entry) = self.tt.probe(after.key()) {
                if after.is_valid_move(entry.mv) {
                    line.push_str(&format!(" ponder {}", entry.mv));
                }
            }
            println!("{line}");
        }
        Some(rm)
    }

    /// Search depth `d` inside a window around the previous score, widening
    /// on fail-high or fail-low. Below `asp_min_depth` the window is full.
    fn aspiration_window(&mut self, mut score: i32, depth: i32) -> i32 {
        if depth < self.params.asp_min_depth {
            return self.search_node::<true>(self.root, -VALUE_MATE, VALUE_MATE, depth);
        }

        let mut delta = self.params.asp_init_delta;
        let mut alpha = score - delta;
        let mut beta = score + delta;

        while self.keep_going() {
            if alpha <= -3000 {
                alpha = -VALUE_MATE;
            }
            if beta >= 3000 {
                beta = VALUE_MATE;
            }

            score = self.search_node::<true>(self.root, alpha, beta, depth);

            if score <= alpha {
                beta = (alpha + beta) / 2;
                alpha = (alpha - delta).max(-VALUE_MATE);
            } else if score >= beta {
                beta = (beta + delta).min(VALUE_MATE);
            } else {
                break;
            }

            delta += delta / 2;
        }

        score
    }

    fn extract_pv_moves(&mut self) {
        debug_assert_eq!(self.n_pvs, self.rmp.num_excluded());
        self.pv_moves.clear();
        for i in 0..self.n_pvs {
            self.pv_moves.push(self.rmp.get(i));
        }
        self.pv_moves.sort_by_key(|rm| -rm.score);
    }

    fn report(&self) {
        if self.silent {
            return;
        }

        let elapsed = self.man.start.elapsed().as_millis() as u64;
        let nps = self.stats.nodes * 1000 / (elapsed + 1);

        for (i, rm) in self.pv_moves.iter().enumerate() {
            let mut line = format!(
                "info multipv {} score {} depth {} seldepth {} nodes {} time {} nps {} hashfull {} pv",
                i + 1,
                format_score(rm.score),
                self.stats.id_depth,
                self.stats.sel_depth,
                self.stats.nodes,
                elapsed,
                nps,
                self.tt.hashfull(),
            );

            line.push_str(&format!(" {}", rm.mv));
            let mut st = StateInfo::default();
            let b = self.root.do_move(rm.mv, &mut st);
            let tail = self.tt.extract_pv(b, self.stats.id_depth.max(1) as usize - 1);
            for m in tail {
                line.push_str(&format!(" {m}"));
            }
            println!("{line}");
        }
    }
}
