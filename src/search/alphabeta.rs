//! The alpha-beta node recursion and quiescence.

use super::movepick::{MovePicker, Stage};
use super::{Search, MATE_BOUND, VALUE_MATE};
use crate::board::{Board, Move, MoveKind, PieceType, PIECE_VALUES};
use crate::tt::{Bound, TTEntry};

fn determine_bound(alpha: i32, beta: i32, old_alpha: i32) -> Bound {
    if alpha >= beta {
        Bound::Beta
    } else if alpha > old_alpha {
        Bound::Exact
    } else {
        Bound::Alpha
    }
}

/// Can the entry answer this node outright? On success `alpha` carries the
/// score to return.
fn can_return_ttscore(tte: &TTEntry, alpha: &mut i32, beta: i32, depth: i32, ply: i32) -> bool {
    if tte.depth < depth {
        return false;
    }

    let tt_score = tte.score(ply);
    match tte.bound {
        Bound::Exact => {
            *alpha = tt_score;
            true
        }
        Bound::Alpha if tt_score <= *alpha => true,
        Bound::Beta if tt_score >= beta => {
            *alpha = beta;
            true
        }
        _ => false,
    }
}

/// Optimistic material swing of a tactical move, for delta pruning.
fn move_value(b: &Board, m: Move) -> i32 {
    if m.kind() == MoveKind::EnPassant {
        return PIECE_VALUES[PieceType::Pawn.index()];
    }

    let mut value = 0;
    if m.kind() == MoveKind::Promotion {
        value = PIECE_VALUES[m.promotion_kind().index()] - PIECE_VALUES[PieceType::Pawn.index()];
    }
    value
        + b.piece_on(m.to())
            .map_or(0, |p| PIECE_VALUES[p.kind.index()])
}

impl Search {
    pub(crate) fn search_node<const IS_ROOT: bool>(
        &mut self,
        b: Board,
        mut alpha: i32,
        mut beta: i32,
        mut depth: i32,
    ) -> i32 {
        let ply = self.stack.height();
        let is_pv = alpha != beta - 1;
        let excluded = if ply > 0 {
            self.stack.at(ply).excluded
        } else {
            Move::NONE
        };
        let see_margin = [-20 * depth * depth, -64 * depth];

        if !self.keep_going() {
            return 0;
        }

        if !IS_ROOT {
            // Mate distance pruning.
            let mated = self.stack.mated_score();
            alpha = alpha.max(mated);
            beta = beta.min(-mated - 1);
            if alpha >= beta {
                return alpha;
            }

            if self.is_board_drawn(&b) {
                return 0;
            }
        }

        if depth <= 0 {
            return if b.checkers().any() {
                self.quiescence::<true>(b, alpha, beta)
            } else {
                self.quiescence::<false>(b, alpha, beta)
            };
        }

        self.stats.nodes += 1;
        self.stats.sel_depth = self.stats.sel_depth.max(ply as i32);

        self.tt.prefetch(b.key());

        let mut tte = None;
        let mut avoid_null = false;
        let mut ttm = Move::NONE;
        let eval: i16;

        if let Some(entry) = self.tt.probe(b.key()) {
            ttm = entry.mv;
            if !b.is_valid_move(ttm) {
                ttm = Move::NONE;
            }

            if !IS_ROOT
                && excluded == Move::NONE
                && !is_pv
                && can_return_ttscore(&entry, &mut alpha, beta, depth, ply as i32)
            {
                if ttm != Move::NONE && b.is_quiet(ttm) {
                    self.hist.add_bonus(&b, ttm, depth * depth);
                }
                return alpha;
            }

            avoid_null = entry.avoid_null;
            eval = entry.eval16;
            tte = Some(entry);
        } else {
            eval = self.evaluate(&b, ply);
        }

        if self.stack.capped() {
            return i32::from(eval);
        }

        let improving =
            b.checkers().is_empty() && ply >= 2 && self.stack.at(ply - 2).eval < eval;

        // Internal iterative reduction: no table move means the first pass is
        // mostly ordering work.
        if depth >= self.params.iir_min_depth && ttm == Move::NONE {
            depth -= 1;
        }

        let skip_pruning = is_pv || b.checkers().any() || excluded != Move::NONE;
        if !skip_pruning {
            // Reverse futility pruning.
            if depth <= self.params.rfp_max_depth
                && i32::from(eval) - self.params.rfp_margin * depth / (1 + i32::from(improving))
                    >= beta
                && beta.abs() < MATE_BOUND
            {
                return i32::from(eval);
            }

            // Razoring.
            if depth <= self.params.rz_max_depth
                && i32::from(eval) + self.params.rz_margin * depth <= alpha
                && self.quiescence::<false>(b, alpha, beta) <= alpha
            {
                return alpha;
            }

            // Null move pruning.
            if depth >= self.params.nmp_min_depth
                && b.plies_from_null() > 0
                && !avoid_null
                && b.has_nonpawns(b.side_to_move())
                && i32::from(eval) >= beta
            {
                let r = self.params.nmp_base
                    + depth / self.params.nmp_depth_div
                    + ((i32::from(eval) - beta) / self.params.nmp_eval_div).min(2);
                let n_depth = depth - r;

                let nb = b.do_null_move(&mut self.sis[ply + 1]);
                self.sis[ply + 1].previous = Some(ply);
                self.stack.push(b.key(), Move::NULL, eval);
                let score = -self.search_node::<false>(nb, -beta, -beta + 1, n_depth);
                self.stack.pop();

                if score >= beta {
                    return beta;
                }
                avoid_null = true;
            }
        }

        let opp_move = if IS_ROOT {
            Move::NONE
        } else {
            self.stack.at(ply - 1).mv
        };
        let counter = if IS_ROOT {
            Move::NONE
        } else {
            self.counters[opp_move.from_to()]
        };
        let (prev, followup) = if ply >= 2 {
            let p = self.stack.at(ply - 2).mv;
            (p, self.followups[p.from_to()])
        } else {
            (Move::NONE, Move::NONE)
        };
        let killers = self.stack.at(ply).killers;

        let mut mp = MovePicker::new(ttm, killers, counter, followup);

        let mut quiets = [Move::NONE; 64];
        let mut num_quiets = 0usize;
        let mut best_score = -VALUE_MATE;
        let mut moves_tried = 0i32;
        let old_alpha = alpha;
        let mut best_move = Move::NONE;
        let mut best_move_idx = 0usize;

        loop {
            let m = if IS_ROOT {
                self.rmp.next()
            } else {
                mp.next(&b, Some(&self.hist), false)
            };
            if m == Move::NONE {
                break;
            }
            if m == excluded {
                continue;
            }

            let quiet_move = b.is_quiet(m);
            let killer_or_counter = m == counter || killers[0] == m || killers[1] == m;

            let mut bb = b.do_move(m, &mut self.sis[ply + 1]);
            self.sis[ply + 1].previous = Some(ply);

            // Check extension for sound checks.
            let mut extension = 0;
            if bb.checkers().any() && b.see_ge(m, 0) {
                extension = 1;
            }

            // Singular extension: the table move alone holds the score above
            // a reduced bound while every alternative falls below it.
            if !IS_ROOT && m == ttm && excluded == Move::NONE && depth >= self.params.sing_min_depth
            {
                if let Some(t) = tte {
                    if t.depth >= depth - 3 && t.bound.includes_beta() {
                        let rbeta = i32::from(t.score16) - depth;

                        self.stack.at_mut(ply).excluded = ttm;
                        let score =
                            self.search_node::<false>(b, rbeta - 1, rbeta, (depth - 1) / 2);
                        self.stack.at_mut(ply).excluded = Move::NONE;

                        if score < rbeta - 16 {
                            extension += 2;
                        } else if score < rbeta {
                            extension += 1;
                        } else if i32::from(t.score16) >= beta {
                            extension -= 1;
                        } else if i32::from(t.score16) <= old_alpha {
                            extension -= 1;
                        }

                        // The verification search recycled this ply's child
                        // state; redo the move.
                        bb = b.do_move(m, &mut self.sis[ply + 1]);
                        self.sis[ply + 1].previous = Some(ply);
                    }
                }
            }

            let extension = extension.min(2);
            let mut new_depth = depth - 1 + if IS_ROOT { 0 } else { extension };
            let mut r = 0;

            // Late move pruning of quiets once enough have been tried.
            let lmp_threshold = (3 + 2 * depth * depth) / (2 - i32::from(improving));
            if !is_pv && bb.checkers().is_empty() && quiet_move && moves_tried > lmp_threshold {
                break;
            }

            // SEE pruning of late losing moves at shallow depth.
            if mp.stage() >= Stage::BadTactical
                && depth <= self.params.seefp_depth
                && !b.see_ge(m, see_margin[usize::from(quiet_move)])
            {
                continue;
            }

            // Late move reductions.
            if depth > 2 && moves_tried > 1 && quiet_move {
                r = self.lmr.get(depth, moves_tried);
                if !is_pv {
                    r += 1;
                }
                if !improving {
                    r += 1;
                }
                if killer_or_counter {
                    r -= 2;
                }
                r -= self.hist.score(&b, m) / self.params.lmr_hist_div;
                r = r.clamp(0, new_depth - 1);
                new_depth -= r;
            }

            self.stack.push(b.key(), m, eval);

            let mut score = 0;
            if !is_pv || moves_tried > 0 {
                score = -self.search_node::<false>(bb, -alpha - 1, -alpha, new_depth);
            }

            // The reduced move beat alpha: verify at full depth.
            if r > 0 && score > alpha {
                new_depth += r;
                score = -self.search_node::<false>(bb, -alpha - 1, -alpha, new_depth);
            }

            if is_pv && ((score > alpha && score < beta) || moves_tried == 0) {
                score = -self.search_node::<false>(bb, -beta, -alpha, new_depth);
            }

            self.stack.pop();
            moves_tried += 1;

            if !self.keep_going() {
                return 0;
            }

            if score > best_score {
                best_score = score;
                best_move = m;
                best_move_idx = (moves_tried - 1) as usize;
            }

            if b.is_quiet(m) && num_quiets < quiets.len() {
                quiets[num_quiets] = m;
                num_quiets += 1;
            }

            if score > alpha {
                alpha = score;
            }
            if alpha >= beta {
                break;
            }
        }

        if moves_tried == 0 && excluded == Move::NONE {
            return if b.checkers().any() {
                self.stack.mated_score()
            } else {
                0
            };
        }

        if alpha >= beta {
            alpha = beta;
            self.stats.fail_high += 1;
            self.stats.fail_high_first += u64::from(moves_tried == 1);

            self.hist.update(&b, best_move, depth, &quiets[..num_quiets]);
            if b.is_quiet(best_move) {
                let entry = self.stack.at_mut(ply);
                if entry.killers[0] != best_move {
                    entry.killers[1] = entry.killers[0];
                    entry.killers[0] = best_move;
                }

                self.counters[opp_move.from_to()] = best_move;
                if prev != Move::NONE {
                    self.followups[prev.from_to()] = best_move;
                }
            }
        }

        if excluded == Move::NONE {
            if !IS_ROOT || self.rmp.num_excluded() == 0 {
                self.tt.store(
                    b.key(),
                    alpha,
                    eval,
                    determine_bound(alpha, beta, old_alpha),
                    depth,
                    best_move,
                    ply as i32,
                    avoid_null,
                );
            }

            if IS_ROOT {
                self.rmp.complete_iter(best_move_idx);
            }
        }

        alpha
    }

    /// Quiescence: tacticals only, or every evasion when in check. Stand-pat
    /// and delta pruning apply only outside check; mate detection only
    /// inside it.
    pub(crate) fn quiescence<const WITH_EVASIONS: bool>(
        &mut self,
        b: Board,
        mut alpha: i32,
        mut beta: i32,
    ) -> i32 {
        if !self.keep_going() || self.is_board_drawn(&b) {
            return 0;
        }

        self.stats.nodes += 1;
        self.stats.qnodes += 1;

        let ply = self.stack.height();

        let mated = self.stack.mated_score();
        alpha = alpha.max(mated);
        beta = beta.min(-mated - 1);
        if alpha >= beta {
            return alpha;
        }

        let mut eval = 0i16;
        if !WITH_EVASIONS {
            eval = self.evaluate(&b, ply);
            alpha = alpha.max(i32::from(eval));
            if alpha >= beta {
                return beta;
            }
        }

        if self.stack.capped() {
            return i32::from(eval);
        }

        let mut mp = MovePicker::new_quiescence();
        let mut moves_tried = 0;

        loop {
            let m = mp.next(&b, None, !WITH_EVASIONS);
            if m == Move::NONE {
                break;
            }

            // Delta pruning: even a free capture will not lift alpha.
            if !WITH_EVASIONS
                && i32::from(eval) + move_value(&b, m) + self.params.delta_margin <= alpha
            {
                continue;
            }

            let bb = b.do_move(m, &mut self.sis[ply + 1]);
            self.sis[ply + 1].previous = Some(ply);
            self.stack.push(b.key(), m, eval);

            // Evasion mode for the reply filters out perpetual-check noise.
            let score = if !WITH_EVASIONS && bb.checkers().any() {
                -self.quiescence::<true>(bb, -beta, -alpha)
            } else {
                -self.quiescence::<false>(bb, -beta, -alpha)
            };

            self.stack.pop();
            moves_tried += 1;

            if score > alpha {
                alpha = score;
            }
            if score >= beta {
                return beta;
            }
        }

        if WITH_EVASIONS && moves_tried == 0 {
            return self.stack.mated_score();
        }

        alpha
    }
}
