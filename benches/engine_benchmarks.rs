use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use castellan::board::{Board, GenKind};
use castellan::perft::perft;
use castellan::search::{Search, SearchLimits};
use castellan::tt::TranspositionTable;

const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

fn bench_movegen(c: &mut Criterion) {
    let board = Board::load_fen(KIWIPETE).unwrap();
    c.bench_function("movegen_kiwipete", |b| {
        b.iter(|| black_box(board.generate(GenKind::Legal).len()))
    });
}

fn bench_perft(c: &mut Criterion) {
    let board = Board::start_pos();
    c.bench_function("perft_startpos_d4", |b| {
        b.iter(|| black_box(perft(&board, 4)))
    });
}

fn bench_search(c: &mut Criterion) {
    c.bench_function("search_kiwipete_d6", |b| {
        b.iter(|| {
            let mut s = Search::new(Arc::new(TranspositionTable::new(16)));
            s.set_silent(true);
            let board = Board::load_fen(KIWIPETE).unwrap();
            s.setup(board, SearchLimits::depth(6), None, false, 1);
            black_box(s.iterative_deepening())
        })
    });
}

criterion_group!(benches, bench_movegen, bench_perft, bench_search);
criterion_main!(benches);
