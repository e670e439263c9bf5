//! UCI protocol front end.
//!
//! Commands are parsed on the main thread; `go` hands the position to a
//! search running on its own thread so `stop` and `ponderhit` stay
//! responsive. Options that touch shared structures (hash size, weights)
//! stop the search first.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::Mutex;

use crate::board::{Board, Color};
use crate::book::Book;
use crate::nnue::{Evaluator, Network, StateInfo};
use crate::perft::perft;
use crate::search::{
    LimitKind, Search, SearchLimits, SearchParams, Stack, MAX_DEPTH,
};
use crate::tt::{TranspositionTable, TT_DEFAULT_MB, TT_MAX_MB, TT_MIN_MB};

const ENGINE_NAME: &str = concat!("castellan ", env!("CARGO_PKG_VERSION"));
const ENGINE_AUTHOR: &str = "the castellan developers";

// Pre-root history kept in the search stack; leaves room for the tree below.
const HISTORY_CAP: usize = crate::search::MAX_PLIES - 2 * MAX_DEPTH as usize;

pub struct UciContext {
    board: Board,
    stack: Stack,
    si: StateInfo,

    tt: Arc<TranspositionTable>,
    search: Arc<Mutex<Search>>,
    keep_going: Arc<AtomicBool>,
    pondering: Arc<AtomicBool>,
    search_thread: Option<JoinHandle<()>>,

    multipv: usize,
    params: SearchParams,
    evaluator: Evaluator,
    book: Option<Book>,
}

impl UciContext {
    #[must_use]
    pub fn new() -> Self {
        let tt = Arc::new(TranspositionTable::new(TT_DEFAULT_MB));
        let search = Search::new(Arc::clone(&tt));
        let (keep_going, pondering) = search.stop_handles();

        UciContext {
            board: Board::start_pos(),
            stack: Stack::new(),
            si: StateInfo::default(),
            tt,
            search: Arc::new(Mutex::new(search)),
            keep_going,
            pondering,
            search_thread: None,
            multipv: 1,
            params: SearchParams::default(),
            evaluator: Evaluator::Material,
            book: None,
        }
    }

    /// Load weights before entering the loop (CLI convenience).
    pub fn preload_eval_file(&mut self, path: &PathBuf) {
        self.apply_eval_file(path.clone());
    }

    pub fn enter_loop(&mut self) {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if !self.handle_line(&line) {
                break;
            }
        }
        self.ensure_stopped();
    }

    /// Returns false on `quit`.
    pub fn handle_line(&mut self, line: &str) -> bool {
        let mut tokens = line.split_whitespace();
        let Some(cmd) = tokens.next() else {
            return true;
        };
        let rest: Vec<&str> = tokens.collect();

        match cmd {
            "uci" => self.print_info(),
            "isready" => println!("readyok"),
            "ucinewgame" => {
                self.ensure_stopped();
                self.tt.clear();
                self.search.lock().new_game();
            }
            "position" => self.parse_position(&rest),
            "go" => self.parse_go(&rest),
            "stop" => self.ensure_stopped(),
            "ponderhit" => self
                .pondering
                .store(false, std::sync::atomic::Ordering::Relaxed),
            "setoption" => self.parse_setoption(&rest),
            "d" => print!("{}", self.board),
            "quit" => return false,
            _ => log::warn!("unknown command: {line}"),
        }
        true
    }

    fn print_info(&self) {
        println!("id name {ENGINE_NAME}");
        println!("id author {ENGINE_AUTHOR}");
        println!(
            "option name Hash type spin default {TT_DEFAULT_MB} min {TT_MIN_MB} max {TT_MAX_MB}"
        );
        println!("option name Clear Hash type button");
        println!("option name MultiPV type spin default 1 min 1 max 256");
        println!("option name EvalFile type string default <empty>");
        println!("option name BookFile type string default <empty>");
        println!("option name aspdelta type spin default 12 min 1 max 100");
        println!("option name aspmindepth type spin default 8 min 1 max 12");
        println!("option name lmrcoeff type spin default 48 min 40 max 100");
        println!("option name MoveOverhead type spin default 30 min 0 max 5000");
        println!("uciok");
    }

    fn ensure_stopped(&mut self) {
        self.keep_going
            .store(false, std::sync::atomic::Ordering::Relaxed);
        self.pondering
            .store(false, std::sync::atomic::Ordering::Relaxed);
        if let Some(handle) = self.search_thread.take() {
            let _ = handle.join();
        }
    }

    fn parse_position(&mut self, tokens: &[&str]) {
        let mut it = tokens.iter();
        self.stack.reset();

        match it.next() {
            Some(&"startpos") => {
                self.board = Board::start_pos();
            }
            Some(&"fen") => {
                let fen_parts: Vec<&str> = it
                    .clone()
                    .take_while(|&&t| t != "moves")
                    .copied()
                    .collect();
                let fen = fen_parts.join(" ");
                match Board::load_fen(&fen) {
                    Ok(b) => self.board = b,
                    Err(e) => {
                        log::error!("bad FEN in position command: {e}");
                        return;
                    }
                }
                for _ in 0..fen_parts.len() {
                    it.next();
                }
            }
            _ => return,
        }

        if it.next() != Some(&"moves") {
            return;
        }

        for lan in it {
            match self.board.parse_lan(lan) {
                Ok(m) => {
                    // Keep headroom in the shared stack for the search itself.
                    if self.stack.total_height() >= HISTORY_CAP {
                        self.stack.reset();
                    }
                    self.stack.push(self.board.key(), m, 0);
                    self.board = self.board.do_move(m, &mut self.si);
                }
                Err(e) => {
                    log::error!("bad move in position command: {e}");
                    break;
                }
            }
        }
    }

    fn parse_go(&mut self, tokens: &[&str]) {
        let mut limits = SearchLimits::unlimited();
        limits.start = Instant::now();
        let mut ponder = false;
        let mut has_clock = false;

        let mut it = tokens.iter();
        while let Some(&tok) = it.next() {
            let arg = |it: &mut std::slice::Iter<'_, &str>| {
                it.next().and_then(|t| t.parse::<i64>().ok())
            };
            match tok {
                "wtime" => {
                    if let Some(v) = arg(&mut it) {
                        limits.time[Color::White.index()] = v;
                        has_clock = true;
                    }
                }
                "btime" => {
                    if let Some(v) = arg(&mut it) {
                        limits.time[Color::Black.index()] = v;
                        has_clock = true;
                    }
                }
                "winc" => {
                    if let Some(v) = arg(&mut it) {
                        limits.inc[Color::White.index()] = v;
                    }
                }
                "binc" => {
                    if let Some(v) = arg(&mut it) {
                        limits.inc[Color::Black.index()] = v;
                    }
                }
                "movetime" => {
                    if let Some(v) = arg(&mut it) {
                        limits.move_time = v;
                        has_clock = true;
                    }
                }
                "depth" => {
                    if let Some(v) = arg(&mut it) {
                        limits.kind = LimitKind::Depth;
                        limits.depth = (v as i32).clamp(1, MAX_DEPTH);
                    }
                }
                "nodes" => {
                    if let Some(v) = arg(&mut it) {
                        limits.kind = LimitKind::Nodes;
                        limits.nodes = v.max(0) as u64;
                    }
                }
                "infinite" => limits.kind = LimitKind::Unlimited,
                "ponder" => ponder = true,
                "perft" => {
                    let depth = arg(&mut it).unwrap_or(1).clamp(1, 10) as u32;
                    self.run_perft(depth);
                    return;
                }
                _ => {}
            }
        }

        if has_clock && limits.kind == LimitKind::Unlimited {
            limits.kind = LimitKind::Time;
        }

        self.ensure_stopped();

        if !ponder {
            if let Some(book) = &self.book {
                if let Some(m) = book.probe(&self.board) {
                    println!("bestmove {m}");
                    return;
                }
            }
        }

        let search = Arc::clone(&self.search);
        let board = self.board;
        let stack = self.stack.clone();
        let multipv = self.multipv;
        let params = self.params.clone();
        let evaluator = self.evaluator.clone();
        let tt = Arc::clone(&self.tt);

        self.search_thread = Some(std::thread::spawn(move || {
            let mut s = search.lock();
            s.set_tt(tt);
            s.set_params(params);
            s.set_evaluator(evaluator);
            s.setup(board, limits, Some(&stack), ponder, multipv);
            s.iterative_deepening();
        }));
    }

    fn run_perft(&self, depth: u32) {
        let start = Instant::now();
        let nodes = perft(&self.board, depth);
        let elapsed = start.elapsed();
        let mnps = nodes as f64 / elapsed.as_secs_f64().max(1e-9) / 1e6;
        println!("{nodes} nodes @ {mnps:.1} mn/s");
    }

    fn parse_setoption(&mut self, tokens: &[&str]) {
        if tokens.first() != Some(&"name") {
            return;
        }
        let value_pos = tokens.iter().position(|&t| t == "value");
        let name_end = value_pos.unwrap_or(tokens.len());
        let name = tokens[1..name_end].join(" ").to_lowercase();
        let value = value_pos
            .map(|i| tokens[i + 1..].join(" "))
            .unwrap_or_default();

        match name.as_str() {
            "hash" => {
                if let Ok(mb) = value.parse::<usize>() {
                    if (TT_MIN_MB..=TT_MAX_MB).contains(&mb) {
                        self.ensure_stopped();
                        self.tt = Arc::new(TranspositionTable::new(mb));
                        self.search.lock().set_tt(Arc::clone(&self.tt));
                    }
                }
            }
            "clear hash" => self.tt.clear(),
            "multipv" => {
                if let Ok(v) = value.parse::<usize>() {
                    if (1..=256).contains(&v) {
                        self.multipv = v;
                    }
                }
            }
            "evalfile" => {
                self.apply_eval_file(PathBuf::from(value.trim()));
            }
            "bookfile" => match Book::load(value.trim()) {
                Ok(book) => {
                    log::info!("book loaded with {} entries", book.len());
                    self.book = Some(book);
                }
                Err(e) => log::error!("failed to load book {value:?}: {e}"),
            },
            "aspdelta" => {
                if let Ok(v) = value.parse::<i32>() {
                    if (1..=100).contains(&v) {
                        self.params.asp_init_delta = v;
                    }
                }
            }
            "aspmindepth" => {
                if let Ok(v) = value.parse::<i32>() {
                    if (1..=12).contains(&v) {
                        self.params.asp_min_depth = v;
                    }
                }
            }
            "lmrcoeff" => {
                if let Ok(v) = value.parse::<i32>() {
                    if (40..=100).contains(&v) {
                        self.params.lmr_coeff = v;
                    }
                }
            }
            "moveoverhead" => {
                if let Ok(v) = value.parse::<i64>() {
                    if (0..=5000).contains(&v) {
                        self.params.move_overhead = v;
                    }
                }
            }
            _ => log::warn!("unknown option: {name}"),
        }
    }

    fn apply_eval_file(&mut self, path: PathBuf) {
        self.ensure_stopped();
        match Network::load(&path) {
            Ok(net) => {
                println!("info string NNUE initialized from {}", path.display());
                self.evaluator = Evaluator::Network(Arc::new(net));
            }
            Err(e) => {
                // Keep whatever evaluator was active.
                println!("info string failed to load weights {}: {e}", path.display());
            }
        }
    }
}

impl Default for UciContext {
    fn default() -> Self {
        UciContext::new()
    }
}
