//! Search tunables.

/// All tunable search parameters with their release defaults.
#[derive(Clone, Debug)]
pub struct SearchParams {
    pub asp_init_delta: i32,
    pub asp_min_depth: i32,
    /// LMR log-log coefficient, in percent.
    pub lmr_coeff: i32,
    pub lmr_hist_div: i32,

    pub nmp_min_depth: i32,
    pub nmp_base: i32,
    pub nmp_depth_div: i32,
    pub nmp_eval_div: i32,

    pub iir_min_depth: i32,

    pub rfp_max_depth: i32,
    pub rfp_margin: i32,

    pub rz_max_depth: i32,
    pub rz_margin: i32,

    pub sing_min_depth: i32,
    pub seefp_depth: i32,
    pub delta_margin: i32,

    pub move_overhead: i64,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            asp_init_delta: 12,
            asp_min_depth: 8,
            lmr_coeff: 48,
            lmr_hist_div: 4903,
            nmp_min_depth: 3,
            nmp_base: 4,
            nmp_depth_div: 8,
            nmp_eval_div: 116,
            iir_min_depth: 2,
            rfp_max_depth: 7,
            rfp_margin: 119,
            rz_max_depth: 6,
            rz_margin: 239,
            sing_min_depth: 8,
            seefp_depth: 5,
            delta_margin: 200,
            move_overhead: 30,
        }
    }
}

/// Reduction lookup indexed by `[min(depth, 31)][min(moves_tried, 63)]`.
pub struct LmrTable {
    table: [[u8; 64]; 32],
}

impl LmrTable {
    #[must_use]
    pub fn new(coeff: i32) -> Self {
        let k = coeff as f64 / 100.0;
        let mut table = [[0u8; 64]; 32];
        for (depth, row) in table.iter_mut().enumerate().skip(1) {
            for (moves, slot) in row.iter_mut().enumerate().skip(1) {
                *slot = (0.1 + (depth as f64).ln() * (moves as f64).ln() * k) as u8;
            }
        }
        Self { table }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, depth: i32, moves_tried: i32) -> i32 {
        let d = depth.clamp(0, 31) as usize;
        let m = moves_tried.clamp(0, 63) as usize;
        i32::from(self.table[d][m])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reductions_grow_with_depth_and_moves() {
        let lmr = LmrTable::new(48);
        assert_eq!(lmr.get(1, 1), 0);
        assert!(lmr.get(20, 30) >= lmr.get(5, 5));
        assert!(lmr.get(31, 63) > 0);
        // Out-of-range indices clamp instead of panicking.
        assert_eq!(lmr.get(100, 200), lmr.get(31, 63));
    }
}
