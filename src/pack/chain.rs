//! Bit-packed game chains: a packed start position followed by a
//! variable-width move/score stream.
//!
//! Moves are coded against the position: the origin square as its rank among
//! the mover's pieces, the destination as its rank in the piece's reachable
//! set, promotions in two bits, castling as extra indices on the king's
//! destination set. Scores are stored as sign-folded deltas in 4-bit chunks
//! with continuation bits. Both sides of the codec replay the game to stay
//! in lockstep.

use crate::board::{attacks, Bitboard, Board, CastlingRights, Move, MoveKind, PieceType, Square};
use crate::nnue::StateInfo;

use super::bitrw::{BitReader, BitWriter};
use super::packed_board::{pack_board, unpack_board, PackedBoard, PACKED_BOARD_SIZE};
use super::{PackResult, PACK_MAX_PLIES};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MoveScore {
    pub mv: Move,
    pub score: i16,
}

/// One self-play game.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PosChain {
    pub start: PackedBoard,
    pub result: u8,
    pub seq: Vec<MoveScore>,
}

#[inline]
fn sq_index_in(mask: Bitboard, sq: Square) -> u32 {
    (Bitboard(Bitboard::from_square(sq).0.wrapping_sub(1)) & mask).count()
}

/// Bits needed to index `n` alternatives (n >= 2).
#[inline]
fn bits_for(n: u32) -> usize {
    (32 - (n - 1).leading_zeros()) as usize
}

fn write_square(bw: &mut BitWriter, mask: Bitboard, sq: Square) {
    let n = mask.count();
    if n > 1 {
        bw.write(sq_index_in(mask, sq), bits_for(n));
    }
}

fn read_square(br: &mut BitReader, mask: Bitboard) -> Option<Square> {
    let n = mask.count();
    match n {
        0 => None,
        1 => Some(mask.lsb()),
        _ => {
            let idx = br.read(bits_for(n));
            let bit = mask.nth_lsb(idx);
            bit.any().then(|| bit.lsb())
        }
    }
}

fn pawn_dsts(b: &Board, from: Square) -> Bitboard {
    let us = b.side_to_move();
    let them = !us;
    let ep_bb = b
        .en_passant()
        .map_or(Bitboard::EMPTY, Bitboard::from_square);

    // Pushes are masked against enemy pieces only; writer and reader agree,
    // which is all the coding needs.
    (attacks::pawn_pushes(us, from) & !b.pieces_of(them))
        | (attacks::pawn_attacks(us, from) & (b.pieces_of(them) | ep_bb))
}

fn write_pawn_move(bw: &mut BitWriter, b: &Board, m: Move) {
    let us = b.side_to_move();
    let from = m.from();
    let dsts = pawn_dsts(b, from);

    if from.relative_rank(us) == 6 {
        bw.write(m.promotion_kind().index() as u32 - 1, 2);
    }
    write_square(bw, dsts, m.to());
}

fn read_pawn_move(br: &mut BitReader, b: &Board, from: Square) -> Move {
    let us = b.side_to_move();
    let dsts = pawn_dsts(b, from);

    let promotion = (from.relative_rank(us) == 6)
        .then(|| PieceType::from_index(br.read(2) as usize + 1));

    let Some(to) = read_square(br, dsts) else {
        return Move::NONE;
    };

    match promotion {
        Some(kind) => Move::promotion(from, to, kind),
        None if b.en_passant() == Some(to) => Move::en_passant(from, to),
        None => Move::normal(from, to),
    }
}

fn king_coding(b: &Board) -> (Bitboard, u32, u32) {
    let us = b.side_to_move();
    let from = b.king_square(us);
    let dsts = attacks::king_attacks(from) & !b.pieces_of(us);
    let n_crs = u32::from(b.castling().has(CastlingRights::kingside(us)))
        + u32::from(b.castling().has(CastlingRights::queenside(us)));
    (dsts, dsts.count(), n_crs)
}

fn write_king_move(bw: &mut BitWriter, b: &Board, m: Move) {
    let (dsts, n_dsts, n_crs) = king_coding(b);
    let idx_max = n_dsts + n_crs - 1;

    let idx = if m.kind() == MoveKind::Castling {
        // Kingside first when both rights remain.
        n_dsts + u32::from(n_crs == 2 && m.to().file() == 2)
    } else {
        sq_index_in(dsts, m.to())
    };

    if idx_max > 0 {
        bw.write(idx, bits_for(idx_max + 1));
    }
}

fn read_king_move(br: &mut BitReader, b: &Board, from: Square) -> Move {
    let us = b.side_to_move();
    let (dsts, n_dsts, n_crs) = king_coding(b);
    if n_dsts + n_crs == 0 {
        // Only reachable on corrupted input.
        return Move::NONE;
    }
    let idx_max = n_dsts + n_crs - 1;

    let idx = if idx_max > 0 {
        br.read(bits_for(idx_max + 1))
    } else {
        0
    };

    if idx < n_dsts {
        let bit = dsts.nth_lsb(idx);
        if bit.is_empty() {
            return Move::NONE;
        }
        return Move::normal(from, bit.lsb());
    }

    if n_crs == 0 {
        return Move::NONE;
    }
    let castle_long = (n_crs == 2 && idx == idx_max)
        || (n_crs == 1 && b.castling().has(CastlingRights::queenside(us)));
    let to = if castle_long {
        from.offset(-2)
    } else {
        from.offset(2)
    };
    Move::castling(from, to)
}

fn piece_dsts(b: &Board, kind: PieceType, from: Square) -> Bitboard {
    if kind == PieceType::Knight {
        attacks::knight_attacks(from)
    } else {
        attacks::piece_attacks(kind, from, b.all_pieces()) & !b.pieces_of(b.side_to_move())
    }
}

fn write_piece_move(bw: &mut BitWriter, b: &Board, kind: PieceType, m: Move) {
    write_square(bw, piece_dsts(b, kind, m.from()), m.to());
}

fn read_piece_move(br: &mut BitReader, b: &Board, kind: PieceType, from: Square) -> Move {
    match read_square(br, piece_dsts(b, kind, from)) {
        Some(to) => Move::normal(from, to),
        None => Move::NONE,
    }
}

/// Sign-folded varint in 4-bit chunks, LSB chunk first, a continuation bit
/// after every chunk but the last, then a 0 terminator.
fn write_int(bw: &mut BitWriter, x: i16) {
    let mut ux: u32 = (u32::from(x.unsigned_abs()) << 1) | u32::from(x < 0);
    loop {
        bw.write(ux & 0xF, 4);
        ux >>= 4;
        if ux != 0 {
            bw.write(1, 1);
        } else {
            break;
        }
    }
    bw.write(0, 1);
}

fn read_int(br: &mut BitReader) -> i16 {
    let mut x = 0u32;
    let mut off = 0;
    loop {
        if off < 32 {
            x |= br.read(4) << off;
        } else {
            let _ = br.read(4);
        }
        off += 4;
        if br.read(1) == 0 {
            break;
        }
    }
    let magnitude = (x >> 1) as i32;
    if x & 1 != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

fn write_move(bw: &mut BitWriter, b: &Board, m: Move) {
    write_square(bw, b.pieces_of(b.side_to_move()), m.from());
    let kind = b
        .piece_on(m.from())
        .expect("encoded move has a mover")
        .kind;
    match kind {
        PieceType::Pawn => write_pawn_move(bw, b, m),
        PieceType::King => write_king_move(bw, b, m),
        _ => write_piece_move(bw, b, kind, m),
    }
}

impl PosChain {
    #[must_use]
    pub fn from_game(start: &Board, result: u8) -> PosChain {
        PosChain {
            start: pack_board(start),
            result,
            seq: Vec::new(),
        }
    }

    #[must_use]
    pub fn n_moves(&self) -> usize {
        self.seq.len()
    }

    /// Serialize the chain. Fails if the start position does not decode or a
    /// move in the sequence is illegal from its position.
    pub fn encode(&self) -> Result<Vec<u8>, PackResult> {
        debug_assert!(self.seq.len() <= PACK_MAX_PLIES);

        let mut out = Vec::with_capacity(PACKED_BOARD_SIZE + 2 + 4 * self.seq.len());
        out.extend_from_slice(&self.start.to_bytes());
        let len_and_result = ((self.seq.len() as u16) << 2) | u16::from(self.result & 3);
        out.extend_from_slice(&len_and_result.to_le_bytes());

        let mut b = unpack_board(&self.start).ok_or(PackResult::InvalidBoard)?;
        let mut si = StateInfo::default();
        let mut bw = BitWriter::new();
        let mut prev_score = 0i16;

        for ms in &self.seq {
            if !b.is_valid_move(ms.mv) {
                return Err(PackResult::InvalidMove);
            }
            write_move(&mut bw, &b, ms.mv);

            let diff = (-i32::from(prev_score) - i32::from(ms.score)) as i16;
            write_int(&mut bw, diff);
            prev_score = ms.score;

            b = b.do_move(ms.mv, &mut si);
        }

        out.extend_from_slice(&bw.into_bytes());
        Ok(out)
    }
}

/// Streaming decoder over a pack buffer. After `start_new_chain` the first
/// move is read and validated; each `next` plays the previous move and reads
/// the following one. The final move of a chain is left unplayed.
pub struct ChainReader<'a> {
    data: &'a [u8],
    pos: usize,

    pub board: Board,
    pub n_moves: u16,
    pub result: u8,
    pub mv: Move,
    pub score: i16,

    stream_start: usize,
    bits: BitReader<'a>,
    move_idx: u16,
    si: StateInfo,
}

impl<'a> ChainReader<'a> {
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        ChainReader {
            data,
            pos: 0,
            board: Board::start_pos(),
            n_moves: 0,
            result: 0,
            mv: Move::NONE,
            score: 0,
            stream_start: 0,
            bits: BitReader::new(&[]),
            move_idx: 0,
            si: StateInfo::default(),
        }
    }

    /// Current byte offset into the pack.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Reposition the cursor (used by recovery to resynchronize).
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn start_new_chain(&mut self) -> PackResult {
        if self.pos >= self.data.len() {
            return PackResult::EndOfFile;
        }
        if self.pos + PACKED_BOARD_SIZE + 2 > self.data.len() {
            return PackResult::UnexpectedEof;
        }

        let mut pb_bytes = [0u8; PACKED_BOARD_SIZE];
        pb_bytes.copy_from_slice(&self.data[self.pos..self.pos + PACKED_BOARD_SIZE]);
        let start = PackedBoard::from_bytes(&pb_bytes);

        let lr = u16::from_le_bytes([
            self.data[self.pos + PACKED_BOARD_SIZE],
            self.data[self.pos + PACKED_BOARD_SIZE + 1],
        ]);
        self.result = (lr & 3) as u8;
        self.n_moves = lr >> 2;
        self.move_idx = 0;
        self.mv = Move::NONE;
        self.score = 0;

        if self.n_moves == 0 || self.n_moves as usize > PACK_MAX_PLIES || self.result > 2 {
            return PackResult::InvalidHeader;
        }

        let Some(board) = unpack_board(&start) else {
            return PackResult::InvalidBoard;
        };
        self.board = board;

        self.stream_start = self.pos + PACKED_BOARD_SIZE + 2;
        let data = self.data;
        self.bits = BitReader::new(&data[self.stream_start..]);

        self.read_movescore();
        if !self.board.is_valid_move(self.mv) {
            return PackResult::InvalidMove;
        }
        if self.bits.overflowed() {
            return PackResult::UnexpectedEof;
        }
        PackResult::Ok
    }

    pub fn next(&mut self) -> PackResult {
        if self.move_idx == self.n_moves {
            // The header read was byte-oriented; settle on the bit cursor.
            self.pos = self.stream_start + self.bits.bytes_consumed();
            self.move_idx += 1;
        }
        if self.move_idx > self.n_moves {
            return PackResult::EndOfChain;
        }

        debug_assert!(self.board.is_valid_move(self.mv));
        self.board = self.board.do_move(self.mv, &mut self.si);

        self.read_movescore();
        if !self.board.is_valid_move(self.mv) {
            return PackResult::InvalidMove;
        }
        if self.bits.overflowed() {
            return PackResult::UnexpectedEof;
        }
        PackResult::Ok
    }

    /// Board after the final (unplayed) move. Valid at `EndOfChain`.
    #[must_use]
    pub fn final_board(&mut self) -> Board {
        self.board.do_move(self.mv, &mut self.si)
    }

    fn read_movescore(&mut self) {
        let us = self.board.side_to_move();
        self.mv = match read_square(&mut self.bits, self.board.pieces_of(us)) {
            Some(from) => match self.board.piece_on(from) {
                Some(p) if p.kind == PieceType::Pawn => {
                    read_pawn_move(&mut self.bits, &self.board, from)
                }
                Some(p) if p.kind == PieceType::King => {
                    read_king_move(&mut self.bits, &self.board, from)
                }
                Some(p) => read_piece_move(&mut self.bits, &self.board, p.kind, from),
                None => Move::NONE,
            },
            None => Move::NONE,
        };

        let diff = read_int(&mut self.bits);
        self.score = (-i32::from(self.score) - i32::from(diff)) as i16;
        self.move_idx += 1;
    }

    /// Decode one full chain starting at the current offset.
    pub fn read_chain(&mut self) -> Result<PosChain, PackResult> {
        let start_pos = self.pos;
        let pr = self.start_new_chain();
        if pr != PackResult::Ok {
            return Err(pr);
        }

        let mut pb_bytes = [0u8; PACKED_BOARD_SIZE];
        pb_bytes.copy_from_slice(&self.data[start_pos..start_pos + PACKED_BOARD_SIZE]);

        let mut chain = PosChain {
            start: PackedBoard::from_bytes(&pb_bytes),
            result: self.result,
            seq: Vec::with_capacity(self.n_moves as usize),
        };

        loop {
            chain.seq.push(MoveScore {
                mv: self.mv,
                score: self.score,
            });
            match self.next() {
                PackResult::Ok => {}
                PackResult::EndOfChain => return Ok(chain),
                other => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::GenKind;
    use rand::prelude::*;

    fn random_chain(seed: u64, plies: usize) -> PosChain {
        let mut rng = StdRng::seed_from_u64(seed);
        let board = Board::start_pos();
        let mut b = board;
        let mut si = StateInfo::default();
        let mut chain = PosChain::from_game(&board, 2);

        for _ in 0..plies {
            let moves = b.generate(GenKind::Legal);
            if moves.is_empty() {
                break;
            }
            let mv = moves.get(rng.gen_range(0..moves.len())).unwrap();
            let score = rng.gen_range(-2000i16..=2000);
            chain.seq.push(MoveScore { mv, score });
            b = b.do_move(mv, &mut si);
        }
        chain
    }

    #[test]
    fn chain_round_trip() {
        for seed in 0..8u64 {
            let chain = random_chain(seed, 120);
            let bytes = chain.encode().unwrap();
            let mut reader = ChainReader::new(&bytes);
            let decoded = reader.read_chain().unwrap();
            assert_eq!(decoded, chain, "seed {seed}");
            assert_eq!(reader.offset(), bytes.len());
        }
    }

    #[test]
    fn extreme_scores_round_trip() {
        let mut chain = random_chain(3, 6);
        for (i, ms) in chain.seq.iter_mut().enumerate() {
            ms.score = match i % 4 {
                0 => 31999,
                1 => -31999,
                2 => 0,
                _ => -1,
            };
        }
        let bytes = chain.encode().unwrap();
        let decoded = ChainReader::new(&bytes).read_chain().unwrap();
        assert_eq!(decoded.seq, chain.seq);
    }

    #[test]
    fn back_to_back_chains() {
        let a = random_chain(1, 40);
        let b = random_chain(2, 40);
        let mut bytes = a.encode().unwrap();
        bytes.extend(b.encode().unwrap());

        let mut reader = ChainReader::new(&bytes);
        assert_eq!(reader.read_chain().unwrap(), a);
        assert_eq!(reader.read_chain().unwrap(), b);
        assert_eq!(reader.start_new_chain(), PackResult::EndOfFile);
    }

    #[test]
    fn truncated_stream_reports_eof() {
        let chain = random_chain(5, 60);
        let bytes = chain.encode().unwrap();
        let mut reader = ChainReader::new(&bytes[..bytes.len() - 4]);
        let mut pr = reader.start_new_chain();
        while pr == PackResult::Ok {
            pr = reader.next();
        }
        assert!(
            matches!(pr, PackResult::UnexpectedEof | PackResult::InvalidMove),
            "got {pr:?}"
        );
    }

    #[test]
    fn final_board_matches_replay() {
        let chain = random_chain(9, 30);
        let bytes = chain.encode().unwrap();
        let mut reader = ChainReader::new(&bytes);
        let mut pr = reader.start_new_chain();
        while pr == PackResult::Ok {
            pr = reader.next();
        }
        assert_eq!(pr, PackResult::EndOfChain);

        // Replay independently.
        let mut b = unpack_board(&chain.start).unwrap();
        let mut si = StateInfo::default();
        for ms in &chain.seq {
            b = b.do_move(ms.mv, &mut si);
        }
        assert_eq!(reader.final_board().key(), b.key());
    }
}
