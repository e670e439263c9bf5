//! Parallel self-play game generation.
//!
//! Worker threads play games against themselves and push finished chains
//! into a bounded queue; the writer serializes them and maintains the
//! companion hash file. Each worker owns its full search state; only the
//! transposition table is shared.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use rand::distributions::WeightedIndex;
use rand::prelude::*;

use crate::board::{Board, Color, GenKind, Move};
use crate::nnue::{Evaluator, StateInfo};
use crate::pack::{write_hash_file, MoveScore, PosChain, BLACK_WINS, DRAW, WHITE_WINS};
use crate::search::{LimitKind, Search, SearchLimits, Stack, MAX_PLIES};
use crate::tt::TranspositionTable;

#[derive(Clone)]
pub struct SelfplayConfig {
    pub num_pos: u64,
    pub min_depth: i32,
    pub move_time: i64,
    pub multipv: usize,
    pub max_ld_moves: usize,
    pub threads: usize,
}

struct Entry {
    pc: PosChain,
    hash: u64,
}

/// End-of-game adjudication.
struct Judge {
    draw_score_plies: i32,
    result: Option<u8>,
}

impl Judge {
    fn new() -> Self {
        Judge {
            draw_score_plies: 0,
            result: None,
        }
    }

    fn outcome_for(c: Color) -> u8 {
        match c {
            Color::White => WHITE_WINS,
            Color::Black => BLACK_WINS,
        }
    }

    fn adjudicate(&mut self, b: &Board, m: Move, score: i32, ply: usize) {
        let stm = b.side_to_move();

        if score.abs() > 10 {
            self.draw_score_plies = 0;
        } else if ply >= 50 {
            self.draw_score_plies += 1;
        }

        if m == Move::NONE {
            self.result = Some(if b.checkers().any() {
                Judge::outcome_for(!stm)
            } else {
                DRAW
            });
            return;
        }

        if score.abs() > 10000 {
            self.result = Some(if score > 0 {
                Judge::outcome_for(stm)
            } else {
                Judge::outcome_for(!stm)
            });
            return;
        }

        if b.half_moves() >= 100
            || (b.checkers().is_empty() && b.is_material_draw())
            || self.draw_score_plies >= 8
            || ply + 1 >= MAX_PLIES
        {
            self.result = Some(DRAW);
        }
    }
}

struct Worker {
    search: Search,
    stack: Stack,
    board: Board,
    si: StateInfo,
    scratch: Vec<StateInfo>,
    evaluator: Evaluator,
    cfg: SelfplayConfig,
    rng: StdRng,
    ply: usize,
}

impl Worker {
    fn new(
        id: u64,
        cfg: SelfplayConfig,
        tt: Arc<TranspositionTable>,
        evaluator: Evaluator,
    ) -> Self {
        let mut search = Search::new(tt);
        search.set_silent(true);
        search.set_evaluator(evaluator.clone());
        Worker {
            search,
            stack: Stack::new(),
            board: Board::start_pos(),
            si: StateInfo::default(),
            scratch: vec![StateInfo::default(); 2],
            evaluator,
            cfg,
            rng: StdRng::seed_from_u64(0x5E1F_97A1 ^ (id << 32) ^ id),
            ply: 0,
        }
    }

    fn push_move(&mut self, m: Move) {
        self.stack.push(self.board.key(), m, 0);
        self.board = self.board.do_move(m, &mut self.si);
        self.ply += 1;
    }

    /// Sample `n` opening moves, weighting each by how little it loses.
    fn make_random_moves(&mut self, n: usize, temp: f32) {
        for _ in 0..n {
            let moves = self.board.generate(GenKind::Legal);
            if moves.is_empty() {
                return;
            }

            let mut weights = Vec::with_capacity(moves.len());
            let mut min_weight = 1.0f32;
            for m in moves.iter() {
                self.scratch[0].reset();
                let child = self.board.do_move(m, &mut self.scratch[0]);
                let w = -(self.evaluator.evaluate(&child, &mut self.scratch, 0) as f32);
                min_weight = min_weight.min(w);
                weights.push(w);
            }
            if min_weight <= 0.0 {
                for w in &mut weights {
                    *w -= min_weight - 1.0;
                }
            }
            for w in &mut weights {
                *w = w.powf(1.0 / temp);
            }

            let dist = WeightedIndex::new(&weights).expect("weights are positive");
            let m = moves.get(dist.sample(&mut self.rng)).unwrap();
            self.push_move(m);
        }
    }

    /// Pick uniformly among PVs scoring within `max_diff` of the best.
    fn choose_pv(&mut self, max_diff: i32) -> usize {
        let best = self.search.pv_start(0).score;
        let mut candidates = vec![0usize];
        for i in 1..self.search.num_pvs() {
            if (self.search.pv_start(i).score - best).abs() <= max_diff {
                candidates.push(i);
            }
        }
        candidates[self.rng.gen_range(0..candidates.len())]
    }

    /// Random opening plus a few shallow multi-PV moves, so games start from
    /// varied but not lost positions.
    fn setup_board(&mut self) {
        self.make_random_moves(2, 0.5);

        let n_ld_moves = self.rng.gen_range(0..=self.cfg.max_ld_moves);
        let limits = SearchLimits::depth(2);
        let multipv = self.cfg.multipv.max(3);

        for _ in 0..n_ld_moves {
            let mut limits = limits.clone();
            limits.start = Instant::now();
            self.search
                .setup(self.board, limits, Some(&self.stack), false, multipv);
            self.search.iterative_deepening();

            if self.search.num_pvs() == 0 {
                break;
            }
            if self.search.pv_start(0).score.abs() > 500 {
                break;
            }
            let pv = self.choose_pv(50);
            let m = self.search.pv_start(pv).mv;
            self.push_move(m);
        }
    }

    fn game_limits(&self) -> SearchLimits {
        let mut limits = SearchLimits::unlimited();
        if self.cfg.move_time > 0 {
            limits.kind = LimitKind::Time;
            limits.move_time = self.cfg.move_time;
            limits.min_depth = self.cfg.min_depth;
        } else {
            limits.kind = LimitKind::Depth;
            limits.depth = self.cfg.min_depth;
        }
        limits
    }

    fn play_one_game(&mut self) -> Option<Entry> {
        self.stack.reset();
        self.board = Board::start_pos();
        self.ply = 0;
        self.setup_board();

        let mut judge = Judge::new();
        let mut pc = PosChain::from_game(&self.board, DRAW);
        let mut hash = self.board.key();

        while judge.result.is_none() {
            let mut limits = self.game_limits();
            limits.start = Instant::now();
            self.search.setup(
                self.board,
                limits,
                Some(&self.stack),
                false,
                self.cfg.multipv,
            );
            self.search.iterative_deepening();

            if self.search.num_pvs() == 0 {
                judge.adjudicate(&self.board, Move::NONE, 0, self.ply);
                break;
            }

            // Record the best score, but allow playing a near-equal PV.
            let score = self.search.pv_start(0).score;
            let pv = self.choose_pv(100);
            let m = self.search.pv_start(pv).mv;

            judge.adjudicate(&self.board, m, score, self.ply);
            debug_assert!(self.board.is_valid_move(m));

            pc.seq.push(MoveScore {
                mv: m,
                score: score as i16,
            });
            self.push_move(m);
            hash ^= self.board.key();
        }

        pc.result = judge.result.expect("adjudication always concludes");

        if pc.seq.is_empty() {
            log::warn!("selfplay worker produced an empty game, discarding");
            return None;
        }
        Some(Entry { pc, hash })
    }

    fn run(mut self, queue: Sender<Entry>, keep_going: Arc<AtomicBool>) {
        while keep_going.load(Ordering::Relaxed) {
            let Some(entry) = self.play_one_game() else {
                continue;
            };
            if queue.send(entry).is_err() {
                break;
            }
        }
    }
}

/// Generate `cfg.num_pos` positions into `<out_base>.bin` with a
/// `<out_base>.hash` companion. Appends to an existing pack, folding its
/// hash in.
pub fn selfplay(
    out_base: &Path,
    cfg: &SelfplayConfig,
    tt: Arc<TranspositionTable>,
    evaluator: Evaluator,
) -> std::io::Result<()> {
    use std::fs::OpenOptions;
    use std::io::{BufWriter, Write};

    let bin_path = out_base.with_extension("bin");
    let hash_path = out_base.with_extension("hash");

    let bin_exists = bin_path.exists();
    let mut out = BufWriter::new(
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&bin_path)?,
    );

    let (tx, rx): (Sender<Entry>, Receiver<Entry>) = bounded(256);
    let keep_going = Arc::new(AtomicBool::new(true));

    let mut workers = Vec::new();
    for i in 0..cfg.threads.max(1) {
        let tx = tx.clone();
        let keep_going = Arc::clone(&keep_going);
        let worker = Worker::new(i as u64, cfg.clone(), Arc::clone(&tt), evaluator.clone());
        workers.push(std::thread::spawn(move || worker.run(tx, keep_going)));
    }
    drop(tx);

    let start = Instant::now();
    let outcome_sign = [1i32, -1, 0];
    let mut hash = 0u64;
    let mut pos_cnt = 0u64;

    while pos_cnt < cfg.num_pos {
        let Ok(entry) = rx.recv() else {
            break;
        };
        let encoded = entry
            .pc
            .encode()
            .map_err(|pr| std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{pr:?}")))?;
        out.write_all(&encoded)?;
        hash ^= entry.hash;
        pos_cnt += entry.pc.n_moves() as u64;

        let elapsed_ms = start.elapsed().as_millis().max(1) as u64;
        let pos_per_sec = pos_cnt * 1000 / elapsed_ms;
        let eta_secs = if pos_per_sec > 0 {
            (cfg.num_pos.saturating_sub(pos_cnt)) as f64 / pos_per_sec as f64
        } else {
            f64::INFINITY
        };
        let last = entry.pc.seq.last().expect("games are non-empty");
        println!(
            "[{} / {}] {:>2} {:>6} {} pos/s eta {:.1} min",
            pos_cnt,
            cfg.num_pos,
            outcome_sign[entry.pc.result as usize],
            last.score,
            pos_per_sec,
            eta_secs / 60.0
        );

        out.flush()?;
    }

    keep_going.store(false, Ordering::Relaxed);
    drop(rx);
    for w in workers {
        let _ = w.join();
    }

    out.flush()?;

    if bin_exists && hash_path.exists() {
        if let Ok(prev) = crate::pack::read_hash_file(&hash_path) {
            hash ^= prev;
            log::info!("appending to an existing pack, hash folded in");
        }
    }
    write_hash_file(&hash_path, hash)
}
