//! Opening book probing.
//!
//! The book is a flat binary file of (position key, move) records sorted by
//! key: `u64` key then `u16` move, little-endian, ten bytes per record.
//! Probing is a binary search; the caller validates the move against the
//! board before trusting it.

use std::io;
use std::path::Path;

use crate::board::{Board, Move};

const RECORD_SIZE: usize = 10;

pub struct Book {
    records: Vec<(u64, u16)>,
}

impl Book {
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Book> {
        let data = std::fs::read(path)?;
        if data.len() % RECORD_SIZE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "book size is not a multiple of the record size",
            ));
        }

        let mut records = Vec::with_capacity(data.len() / RECORD_SIZE);
        for rec in data.chunks_exact(RECORD_SIZE) {
            let key = u64::from_le_bytes(rec[..8].try_into().unwrap());
            let mv = u16::from_le_bytes(rec[8..].try_into().unwrap());
            records.push((key, mv));
        }
        records.sort_unstable_by_key(|&(key, _)| key);

        Ok(Book { records })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Book move for this position, if any and legal.
    #[must_use]
    pub fn probe(&self, b: &Board) -> Option<Move> {
        let idx = self
            .records
            .binary_search_by_key(&b.key(), |&(key, _)| key)
            .ok()?;
        let mv = Move::from_u16(self.records[idx].1);
        b.is_valid_move(mv).then_some(mv)
    }
}
