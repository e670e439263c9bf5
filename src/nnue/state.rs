//! Per-ply accumulator state.

use super::network::{Network, HIDDEN};
use super::{feature_index, same_king_bucket};
use crate::board::{Board, Color, Piece, PieceType, Square};

pub const MAX_DELTAS: usize = 3;

/// Hidden-layer activations and PSQT sums for both perspectives.
#[derive(Clone, Copy)]
pub struct Accumulator {
    pub v: [[i16; HIDDEN]; 2],
    pub psqt: [i32; 2],
    pub computed: [bool; 2],
}

impl Default for Accumulator {
    fn default() -> Self {
        Accumulator {
            v: [[0; HIDDEN]; 2],
            psqt: [0; 2],
            computed: [false; 2],
        }
    }
}

/// A single piece placement change. `from == None` is an addition,
/// `to == None` a removal.
#[derive(Clone, Copy)]
pub struct Delta {
    pub piece: Piece,
    pub from: Option<Square>,
    pub to: Option<Square>,
}

/// Per-ply evaluator state. Owned by the search worker as a plain stack
/// indexed by ply; `previous` is an index into that stack, never a pointer.
#[derive(Clone)]
pub struct StateInfo {
    pub acc: Accumulator,
    pub deltas: [Option<Delta>; MAX_DELTAS],
    pub n_deltas: usize,
    pub previous: Option<usize>,
}

impl Default for StateInfo {
    fn default() -> Self {
        StateInfo {
            acc: Accumulator::default(),
            deltas: [None; MAX_DELTAS],
            n_deltas: 0,
            previous: None,
        }
    }
}

impl StateInfo {
    pub fn reset(&mut self) {
        self.previous = None;
        self.n_deltas = 0;
        self.acc.computed = [false, false];
    }

    #[inline]
    pub fn move_piece(&mut self, piece: Piece, from: Square, to: Square) {
        debug_assert!(self.n_deltas < MAX_DELTAS);
        self.deltas[self.n_deltas] = Some(Delta {
            piece,
            from: Some(from),
            to: Some(to),
        });
        self.n_deltas += 1;
    }

    #[inline]
    pub fn add_piece(&mut self, piece: Piece, sq: Square) {
        debug_assert!(self.n_deltas < MAX_DELTAS);
        self.deltas[self.n_deltas] = Some(Delta {
            piece,
            from: None,
            to: Some(sq),
        });
        self.n_deltas += 1;
    }

    #[inline]
    pub fn remove_piece(&mut self, piece: Piece, sq: Square) {
        debug_assert!(self.n_deltas < MAX_DELTAS);
        self.deltas[self.n_deltas] = Some(Delta {
            piece,
            from: Some(sq),
            to: None,
        });
        self.n_deltas += 1;
    }
}

/// Rebuild `pov`'s accumulator at `stack[idx]` from the board.
pub fn refresh_accumulator(b: &Board, acc: &mut Accumulator, pov: Color, net: &Network) {
    let ksq = b.king_square(pov);
    let pov_i = pov.index();

    acc.v[pov_i] = *net.bias();
    acc.psqt[pov_i] = 0;

    for sq in b.all_pieces() {
        let piece = b.piece_on(sq).expect("occupied square has a piece");
        let feature = feature_index(pov, sq, piece, ksq);
        add_column(&mut acc.v[pov_i], net.column(feature));
        acc.psqt[pov_i] += i32::from(net.psqt(feature));
    }

    acc.computed[pov_i] = true;
}

/// Bring `pov`'s accumulator at `stack[idx]` up to date by replaying deltas
/// from the nearest computed ancestor. Returns false when the chain breaks
/// (no parent, or a king move crossed into another bucket) and a full refresh
/// is required.
pub fn update_accumulator(
    stack: &mut [StateInfo],
    idx: usize,
    pov: Color,
    ksq: Square,
    net: &Network,
) -> bool {
    let pov_i = pov.index();

    // Walk back to the nearest computed ancestor.
    let mut chain = [0usize; 64];
    let mut chain_len = 0usize;
    let mut cur = idx;
    while !stack[cur].acc.computed[pov_i] {
        let si = &stack[cur];
        let Some(prev) = si.previous else {
            return false;
        };
        if prev == cur || chain_len == chain.len() {
            return false;
        }
        if let Some(d) = si.deltas[0] {
            if si.n_deltas > 0 && d.piece.kind == PieceType::King {
                let (Some(from), Some(to)) = (d.from, d.to) else {
                    return false;
                };
                if !same_king_bucket(pov, from, to) {
                    return false;
                }
            }
        }
        chain[chain_len] = cur;
        chain_len += 1;
        cur = prev;
    }

    // Replay forward, oldest first.
    for &node in chain[..chain_len].iter().rev() {
        let prev = stack[node].previous.expect("chain nodes have parents");
        let (parent_v, parent_psqt) = {
            let p = &stack[prev].acc;
            (p.v[pov_i], p.psqt[pov_i])
        };

        let si = &mut stack[node];
        si.acc.v[pov_i] = parent_v;
        si.acc.psqt[pov_i] = parent_psqt;

        for delta in si.deltas.iter().take(si.n_deltas).flatten() {
            if let Some(to) = delta.to {
                let feature = feature_index(pov, to, delta.piece, ksq);
                add_column(&mut si.acc.v[pov_i], net.column(feature));
                si.acc.psqt[pov_i] += i32::from(net.psqt(feature));
            }
            if let Some(from) = delta.from {
                let feature = feature_index(pov, from, delta.piece, ksq);
                sub_column(&mut si.acc.v[pov_i], net.column(feature));
                si.acc.psqt[pov_i] -= i32::from(net.psqt(feature));
            }
        }

        si.acc.computed[pov_i] = true;
    }

    true
}

#[inline]
fn add_column(acc: &mut [i16; HIDDEN], column: &[i16]) {
    for (a, &w) in acc.iter_mut().zip(column) {
        *a = a.wrapping_add(w);
    }
}

#[inline]
fn sub_column(acc: &mut [i16; HIDDEN], column: &[i16]) {
    for (a, &w) in acc.iter_mut().zip(column) {
        *a = a.wrapping_sub(w);
    }
}
