//! Lockless shared transposition table.
//!
//! Four-entry buckets of (key XOR data, data) pairs stored with relaxed
//! atomics. A reader accepts an entry only if `stored_key ^ stored_data`
//! equals the probe key, so torn or stale entries simply read as misses and
//! no locking is needed anywhere.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::board::{Board, Move};
use crate::search::{MATE_BOUND, VALUE_MATE};

pub const TT_MIN_MB: usize = 1;
pub const TT_MAX_MB: usize = 4096;
pub const TT_DEFAULT_MB: usize = 16;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Bound {
    None = 0,
    Alpha = 1,
    Beta = 2,
    Exact = 3,
}

impl Bound {
    #[inline]
    #[must_use]
    pub fn includes_beta(self) -> bool {
        matches!(self, Bound::Beta | Bound::Exact)
    }

    fn from_bits(bits: u64) -> Bound {
        match bits & 3 {
            0 => Bound::None,
            1 => Bound::Alpha,
            2 => Bound::Beta,
            _ => Bound::Exact,
        }
    }
}

/// Decoded table entry.
///
/// Data layout (64 bits): move16 | score16 | eval16 | depth5 | bound2 |
/// avoid_null1 | age8.
#[derive(Clone, Copy, Debug)]
pub struct TTEntry {
    pub mv: Move,
    pub score16: i16,
    pub eval16: i16,
    pub depth: i32,
    pub bound: Bound,
    pub avoid_null: bool,
    pub age: u8,
}

pub const TT_MAX_DEPTH: i32 = 31;

impl TTEntry {
    /// Score adjusted back to "mate in N from here" at the probing ply.
    #[inline]
    #[must_use]
    pub fn score(&self, ply: i32) -> i32 {
        let s = i32::from(self.score16);
        if s > MATE_BOUND {
            s - ply
        } else if s < -MATE_BOUND {
            s + ply
        } else {
            s
        }
    }

    fn decode(data: u64) -> TTEntry {
        TTEntry {
            mv: Move::from_u16((data & 0xFFFF) as u16),
            score16: ((data >> 16) & 0xFFFF) as u16 as i16,
            eval16: ((data >> 32) & 0xFFFF) as u16 as i16,
            depth: ((data >> 48) & 0x1F) as i32,
            bound: Bound::from_bits(data >> 53),
            avoid_null: (data >> 55) & 1 != 0,
            age: (data >> 56) as u8,
        }
    }

    fn encode(&self) -> u64 {
        u64::from(self.mv.as_u16())
            | (u64::from(self.score16 as u16) << 16)
            | (u64::from(self.eval16 as u16) << 32)
            | ((self.depth as u64 & 0x1F) << 48)
            | ((self.bound as u64) << 53)
            | (u64::from(self.avoid_null) << 55)
            | (u64::from(self.age) << 56)
    }
}

#[derive(Default)]
struct AtomicEntry {
    key: AtomicU64,
    data: AtomicU64,
}

const BUCKET_SIZE: usize = 4;

#[derive(Default)]
struct Bucket {
    entries: [AtomicEntry; BUCKET_SIZE],
}

pub struct TranspositionTable {
    buckets: Vec<Bucket>,
    age: AtomicU8,
}

impl TranspositionTable {
    /// Allocate a table of roughly `mb` megabytes.
    #[must_use]
    pub fn new(mb: usize) -> Self {
        let mb = mb.clamp(TT_MIN_MB, TT_MAX_MB);
        let n = mb * 1024 * 1024 / std::mem::size_of::<Bucket>();
        let mut buckets = Vec::with_capacity(n);
        buckets.resize_with(n, Bucket::default);
        TranspositionTable {
            buckets,
            age: AtomicU8::new(0),
        }
    }

    #[inline]
    fn bucket(&self, key: u64) -> &Bucket {
        &self.buckets[(key % self.buckets.len() as u64) as usize]
    }

    pub fn new_search(&self) {
        self.age.fetch_add(1, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        for bucket in &self.buckets {
            for e in &bucket.entries {
                e.key.store(0, Ordering::Relaxed);
                e.data.store(0, Ordering::Relaxed);
            }
        }
    }

    #[must_use]
    pub fn probe(&self, key: u64) -> Option<TTEntry> {
        let bucket = self.bucket(key);
        for e in &bucket.entries {
            let stored_key = e.key.load(Ordering::Relaxed);
            let data = e.data.load(Ordering::Relaxed);
            if stored_key ^ data == key {
                return Some(TTEntry::decode(data));
            }
        }
        None
    }

    /// Store an entry. `score` is mate-adjusted by `ply` on the way in. The
    /// victim is the same-key entry if present, otherwise the shallowest entry
    /// of an older generation, otherwise the shallowest entry outright.
    #[allow(clippy::too_many_arguments)]
    pub fn store(
        &self,
        key: u64,
        score: i32,
        eval: i16,
        bound: Bound,
        depth: i32,
        mv: Move,
        ply: i32,
        avoid_null: bool,
    ) {
        let mut score = score;
        if score > MATE_BOUND {
            score += ply;
        } else if score < -MATE_BOUND {
            score -= ply;
        }
        debug_assert!(score.abs() <= VALUE_MATE);

        let entry = TTEntry {
            mv,
            score16: score as i16,
            eval16: eval,
            depth: depth.clamp(0, TT_MAX_DEPTH),
            bound,
            avoid_null,
            age: self.age.load(Ordering::Relaxed),
        };

        let bucket = self.bucket(key);
        let mut victim = None;
        for e in &bucket.entries {
            let stored_key = e.key.load(Ordering::Relaxed);
            let data = e.data.load(Ordering::Relaxed);
            if stored_key ^ data == key {
                victim = Some(e);
                break;
            }
        }

        if victim.is_none() {
            let age = entry.age;
            let mut best_depth = i32::MAX;
            for e in &bucket.entries {
                let decoded = TTEntry::decode(e.data.load(Ordering::Relaxed));
                if decoded.age != age && decoded.depth < best_depth {
                    victim = Some(e);
                    best_depth = decoded.depth;
                }
            }
            if victim.is_none() {
                for e in &bucket.entries {
                    let decoded = TTEntry::decode(e.data.load(Ordering::Relaxed));
                    if decoded.depth < best_depth {
                        victim = Some(e);
                        best_depth = decoded.depth;
                    }
                }
            }
        }

        let slot = victim.expect("bucket always yields a victim");
        let data = entry.encode();
        slot.key.store(key ^ data, Ordering::Relaxed);
        slot.data.store(data, Ordering::Relaxed);
    }

    /// Walk table moves from `b`, validating each against the board. Stops on
    /// a miss, an invalid move, or after `max_len` plies.
    #[must_use]
    pub fn extract_pv(&self, mut b: Board, max_len: usize) -> Vec<Move> {
        let mut pv = Vec::new();
        let mut st = crate::nnue::StateInfo::default();
        while pv.len() < max_len {
            let Some(entry) = self.probe(b.key()) else {
                break;
            };
            let m = entry.mv;
            if !b.is_valid_move(m) {
                break;
            }
            b = b.do_move(m, &mut st);
            pv.push(m);
        }
        pv
    }

    #[inline]
    pub fn prefetch(&self, key: u64) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            let bucket: *const Bucket = self.bucket(key);
            std::arch::x86_64::_mm_prefetch(bucket.cast::<i8>(), std::arch::x86_64::_MM_HINT_NTA);
        }
        #[cfg(not(target_arch = "x86_64"))]
        {
            let _ = key;
        }
    }

    /// Permille of current-generation entries in a 1000-bucket sample.
    #[must_use]
    pub fn hashfull(&self) -> u64 {
        let age = self.age.load(Ordering::Relaxed);
        let sample = self.buckets.len().min(1000);
        let mut count = 0u64;
        for bucket in &self.buckets[..sample] {
            for e in &bucket.entries {
                let decoded = TTEntry::decode(e.data.load(Ordering::Relaxed));
                if decoded.depth > 0 && decoded.age == age {
                    count += 1;
                }
            }
        }
        count / BUCKET_SIZE as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Square;

    fn mv() -> Move {
        Move::normal(Square::E1, Square::G1)
    }

    #[test]
    fn store_then_probe() {
        let tt = TranspositionTable::new(1);
        tt.store(0x1234_5678, 42, 17, Bound::Exact, 9, mv(), 0, false);
        let e = tt.probe(0x1234_5678).unwrap();
        assert_eq!(e.score(0), 42);
        assert_eq!(e.eval16, 17);
        assert_eq!(e.depth, 9);
        assert_eq!(e.bound, Bound::Exact);
        assert_eq!(e.mv, mv());
        assert!(!e.avoid_null);
        assert!(tt.probe(0x8765_4321).is_none());
    }

    #[test]
    fn mate_scores_are_ply_adjusted() {
        let tt = TranspositionTable::new(1);
        // Mate three plies below a node at ply 5: stored distance-to-mate is
        // relative to the node, not the root.
        let score_at_node = VALUE_MATE - 8;
        tt.store(99, score_at_node, 0, Bound::Exact, 10, mv(), 5, false);
        let e = tt.probe(99).unwrap();
        assert_eq!(i32::from(e.score16), VALUE_MATE - 3);
        assert_eq!(e.score(5), score_at_node);
        assert_eq!(e.score(2), VALUE_MATE - 5);
    }

    #[test]
    fn same_key_overwrites() {
        let tt = TranspositionTable::new(1);
        tt.store(7, 10, 0, Bound::Alpha, 3, mv(), 0, false);
        tt.store(7, 20, 0, Bound::Beta, 5, mv(), 0, true);
        let e = tt.probe(7).unwrap();
        assert_eq!(e.score(0), 20);
        assert_eq!(e.bound, Bound::Beta);
        assert!(e.avoid_null);
    }

    #[test]
    fn clear_wipes_entries() {
        let tt = TranspositionTable::new(1);
        tt.store(7, 10, 0, Bound::Exact, 3, mv(), 0, false);
        tt.clear();
        assert!(tt.probe(7).is_none());
    }

    #[test]
    fn lockless_consistency_under_contention() {
        use std::sync::Arc;

        let tt = Arc::new(TranspositionTable::new(1));
        let mut handles = Vec::new();

        for t in 0..4u64 {
            let tt = Arc::clone(&tt);
            handles.push(std::thread::spawn(move || {
                for i in 0..20_000u64 {
                    let key = i.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(t);
                    tt.store(key, (i % 1000) as i32, 0, Bound::Exact, 5, mv(), 0, false);
                    // Whatever we get back must decode consistently; the XOR
                    // check filters torn writes.
                    if let Some(e) = tt.probe(key) {
                        assert!(e.score(0).abs() <= VALUE_MATE);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }
}
