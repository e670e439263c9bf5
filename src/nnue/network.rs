//! Network weights, loading and inference.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use super::state::{refresh_accumulator, update_accumulator, StateInfo};
use crate::board::{Board, Color, PieceType, PIECE_VALUES};

pub const N_FEATURES: usize = 12 * 64 * super::N_KING_BUCKETS;
pub const HIDDEN: usize = 256;

/// Activation saturation bound.
pub const S_A: i32 = 256;
/// Output weight scale.
pub const S_W: i32 = 4096;

/// Quantized network parameters.
///
/// Binary layout (little-endian i16 throughout): `psqt[N_FEATURES]`,
/// transformer `bias[HIDDEN]`, transformer `weight[N_FEATURES * HIDDEN]`
/// (one column per feature), output bias, then the two output weight rows.
pub struct Network {
    psqt: Box<[i16]>,
    bias: Box<[i16; HIDDEN]>,
    weight: Box<[i16]>,
    out_bias: i16,
    out_weight: [Box<[i16; HIDDEN]>; 2],
}

fn read_i16s<R: Read>(reader: &mut R, out: &mut [i16]) -> io::Result<()> {
    let mut buf = vec![0u8; out.len() * 2];
    reader.read_exact(&mut buf)?;
    for (value, chunk) in out.iter_mut().zip(buf.chunks_exact(2)) {
        *value = i16::from_le_bytes([chunk[0], chunk[1]]);
    }
    Ok(())
}

impl Network {
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Network> {
        let file = File::open(path)?;
        Network::from_reader(&mut BufReader::new(file))
    }

    pub fn from_bytes(data: &[u8]) -> io::Result<Network> {
        Network::from_reader(&mut io::Cursor::new(data))
    }

    pub fn from_reader<R: Read>(reader: &mut R) -> io::Result<Network> {
        let mut psqt = vec![0i16; N_FEATURES].into_boxed_slice();
        read_i16s(reader, &mut psqt)?;

        let mut bias = Box::new([0i16; HIDDEN]);
        read_i16s(reader, &mut bias[..])?;

        let mut weight = vec![0i16; N_FEATURES * HIDDEN].into_boxed_slice();
        read_i16s(reader, &mut weight)?;

        let mut out_bias = [0i16; 1];
        read_i16s(reader, &mut out_bias)?;

        let mut out_us = Box::new([0i16; HIDDEN]);
        read_i16s(reader, &mut out_us[..])?;
        let mut out_them = Box::new([0i16; HIDDEN]);
        read_i16s(reader, &mut out_them[..])?;

        Ok(Network {
            psqt,
            bias,
            weight,
            out_bias: out_bias[0],
            out_weight: [out_us, out_them],
        })
    }

    #[inline]
    #[must_use]
    pub(crate) fn bias(&self) -> &[i16; HIDDEN] {
        &self.bias
    }

    /// Transformer column for one feature.
    #[inline]
    #[must_use]
    pub(crate) fn column(&self, feature: usize) -> &[i16] {
        &self.weight[feature * HIDDEN..(feature + 1) * HIDDEN]
    }

    #[inline]
    #[must_use]
    pub(crate) fn psqt(&self, feature: usize) -> i16 {
        self.psqt[feature]
    }

    /// Clamped dot product of one perspective's activations with an output row.
    fn output(x: &[i16; HIDDEN], w: &[i16; HIDDEN]) -> i32 {
        let mut sum = 0i32;
        for (&a, &b) in x.iter().zip(w.iter()) {
            let clamped = i32::from(a).clamp(0, S_A);
            sum += clamped * i32::from(b);
        }
        sum
    }

    /// Centipawn score from the side to move's point of view. Both
    /// accumulators at `stack[idx]` must be up to date.
    #[must_use]
    pub fn forward(&self, stack: &[StateInfo], idx: usize, stm: Color) -> i32 {
        let acc = &stack[idx].acc;
        debug_assert!(acc.computed[0] && acc.computed[1]);

        let us = stm.index();
        let them = (!stm).index();

        let mut result = i32::from(self.out_bias);
        result += Network::output(&acc.v[us], &self.out_weight[0]);
        result += Network::output(&acc.v[them], &self.out_weight[1]);

        result / S_W + (acc.psqt[us] - acc.psqt[them]) / 2
    }
}

/// Material-count evaluation, the fallback when no weights are loaded.
#[must_use]
pub fn material_eval(b: &Board) -> i32 {
    let us = b.side_to_move();
    let them = !us;
    let mut score = 0;
    for kind in [
        PieceType::Pawn,
        PieceType::Knight,
        PieceType::Bishop,
        PieceType::Rook,
        PieceType::Queen,
    ] {
        let diff = b.pieces(us, kind).count() as i32 - b.pieces(them, kind).count() as i32;
        score += PIECE_VALUES[kind.index()] * diff;
    }
    score
}

/// The evaluation backend the search calls into.
#[derive(Clone)]
pub enum Evaluator {
    Network(Arc<Network>),
    Material,
}

impl Evaluator {
    /// Evaluate the position at `stack[idx]`, updating or refreshing the
    /// accumulators as needed.
    #[must_use]
    pub fn evaluate(&self, b: &Board, stack: &mut [StateInfo], idx: usize) -> i32 {
        match self {
            Evaluator::Material => material_eval(b),
            Evaluator::Network(net) => {
                for pov in [Color::White, Color::Black] {
                    let ksq = b.king_square(pov);
                    if !update_accumulator(stack, idx, pov, ksq, net) {
                        refresh_accumulator(b, &mut stack[idx].acc, pov, net);
                    }
                }
                net.forward(stack, idx, b.side_to_move())
            }
        }
    }

    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Evaluator::Network(_))
    }
}
