//! Positional evaluation over the n-tuple tables, and the greedy
//! simulate-then-score move policy built on top of it.

use crate::constants::*;
use crate::state::{Cell, Direction, GameState, Move, Player};
use crate::weights::{Regime, WeightStore};

/// The four board corners, in the order used for corner assignments.
const CORNERS: [Cell; 4] = [0, 5, 30, 35];

/// How the policy turns per-move scores into a single choice.
///
/// Scoring is identical under every rule; only the final pick differs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SelectionRule {
    /// Highest score, uniform among exact ties.
    Argmax,
    /// Probability proportional to the score, shifted to be non-negative.
    Linear,
    /// Max-shifted Boltzmann sampling at the given temperature.
    Softmax { temperature: f64 },
}

impl Default for SelectionRule {
    fn default() -> Self {
        SelectionRule::Softmax { temperature: 1.0 }
    }
}

/// Pick the regime table from the survivor counts, for the given
/// evaluating side. The red-one check wins when both apply.
fn regime_for(counts: [u8; 4], perspective: Player) -> Regime {
    let (opp_red, own_blue) = match perspective {
        Player::User => (counts[2], counts[1]),
        Player::Enemy => (counts[0], counts[3]),
    };
    if opp_red <= 1 {
        Regime::RedOne
    } else if own_blue <= 1 {
        Regime::BlueOne
    } else {
        Regime::Normal
    }
}

/// Per-cell feature symbols for one side: 0 empty, 1 own red, 2 own blue,
/// 3 anything of the opponent's (their true color must not leak into the
/// feature space, so known and unknown opponent pieces look alike).
fn symbol_cache(state: &GameState, perspective: Player) -> [u8; CELLS] {
    let mut cache = [0u8; CELLS];
    for (cell, slot) in cache.iter_mut().enumerate() {
        let code = state.cell_code(cell);
        let own = match perspective {
            Player::User => code,
            Player::Enemy => -code,
        };
        *slot = if own < 0 || own == UNKNOWN { 3 } else { own as u8 };
    }
    cache
}

/// Mean trained win rate over all 61 pattern windows, from one side's
/// perspective. Always in [0, 1] for tables holding win rates.
pub fn board_score(state: &GameState, perspective: Player, store: &WeightStore) -> f32 {
    let cache = symbol_cache(state, perspective);
    let regime = regime_for(state.survivors(), perspective);

    let mut total = 0.0f32;
    for t in store.templates() {
        let feature = cache[t.cells[0]] as usize * 64
            + cache[t.cells[1]] as usize * 16
            + cache[t.cells[2]] as usize * 4
            + cache[t.cells[3]] as usize;
        total += store.rate(perspective, regime, t.id, feature);
    }
    total / TUPLE_NUM as f32
}

#[inline]
fn manhattan(cell: Cell, corner: Cell) -> usize {
    let (r, c) = (cell / COLS, cell % COLS);
    let (cr, cc) = (corner / COLS, corner % COLS);
    r.abs_diff(cr) + c.abs_diff(cc)
}

/// Greedily pair the mover's pieces with the four corners by ascending
/// Manhattan distance, one piece per corner. Returns piece -> corner cell.
fn assign_corners(state: &GameState, mover: Player) -> [Option<Cell>; TOTAL_PIECES] {
    let range = match mover {
        Player::User => 0..PIECES as u8,
        Player::Enemy => PIECES as u8..TOTAL_PIECES as u8,
    };
    let mut pairs: Vec<(usize, u8, usize)> = Vec::with_capacity(PIECES * 4);
    for piece in range {
        if let Some(cell) = state.piece_pos(piece) {
            for (ci, &corner) in CORNERS.iter().enumerate() {
                pairs.push((manhattan(cell, corner), piece, ci));
            }
        }
    }
    // Stable sort keeps piece-id, then corner order among equal distances.
    pairs.sort_by_key(|&(d, _, _)| d);

    let mut assignment = [None; TOTAL_PIECES];
    let mut piece_taken = [false; TOTAL_PIECES];
    let mut corner_taken = [false; 4];
    let mut filled = 0;
    for (_, piece, ci) in pairs {
        if !piece_taken[piece as usize] && !corner_taken[ci] {
            piece_taken[piece as usize] = true;
            corner_taken[ci] = true;
            assignment[piece as usize] = Some(CORNERS[ci]);
            filled += 1;
            if filled == 4 {
                break;
            }
        }
    }
    assignment
}

/// A forced win the evaluator does not need the tables for: stepping off
/// from an occupied exit corner, or a blue piece reaching an exit corner
/// that is empty and whose approach cell holds nothing hostile.
fn is_guaranteed_win(state: &GameState, mv: Move, mover: Player) -> bool {
    let Some(src) = state.piece_pos(mv.piece) else {
        return false;
    };
    if state.is_escape(mv) {
        return true;
    }
    let sign = mover.sign();
    if state.piece_color(mv.piece) != BLUE * sign {
        return false;
    }
    // (source, direction, corner, guard): the guard cell is the one square
    // an opponent could take the corner-bound piece from.
    let setups: [(Cell, Direction, Cell, Cell); 2] = match mover {
        Player::User => [(1, Direction::West, 0, 6), (4, Direction::East, 5, 11)],
        Player::Enemy => [(31, Direction::West, 30, 24), (34, Direction::East, 35, 29)],
    };
    for (from, dir, corner, guard) in setups {
        if src == from
            && mv.dir == dir
            && state.cell_code(corner) == 0
            && state.cell_code(guard) * sign >= 0
        {
            return true;
        }
    }
    false
}

/// Score every legal move by simulating it on a color-masked board and
/// evaluating the result, then pick one according to `rule`.
///
/// Returns `None` when the side to move has no legal moves.
pub fn highest_weight(
    state: &mut GameState,
    store: &WeightStore,
    rule: SelectionRule,
    rng: &mut fastrand::Rng,
) -> Option<Move> {
    let mover = state.side_to_move();
    let moves = state.legal_moves();
    if moves.is_empty() {
        return None;
    }

    let assignment = assign_corners(state, mover);
    let opp_red_low = match mover {
        Player::User => state.survivors()[2] <= 1,
        Player::Enemy => state.survivors()[0] <= 1,
    };

    let mut scores = Vec::with_capacity(moves.len());
    for &mv in &moves {
        let escape = state.is_escape(mv);
        let mut score = if is_guaranteed_win(state, mv, mover) {
            1.0f32
        } else {
            simulate_score(state, mv, mover, store)
        };

        // Escapes have no destination cell; the positional bonuses below
        // only apply to on-board moves.
        if let (false, Some(src)) = (escape, state.piece_pos(mv.piece)) {
            let dst = (src as isize + mv.dir.offset()) as Cell;
            if let Some(corner) = assignment[mv.piece as usize] {
                if manhattan(dst, corner) < manhattan(src, corner) {
                    score *= 1.01;
                }
            }
            if opp_red_low && state.cell_code(dst) == 0 {
                score *= 1.01;
            }
        }
        scores.push(score);
    }

    let idx = select(&scores, rule, rng)?;
    Some(moves[idx])
}

/// Apply the move on a board whose opposing colors are masked to the
/// unknown code, score from the mover's perspective, then fully restore.
fn simulate_score(state: &mut GameState, mv: Move, mover: Player, store: &WeightStore) -> f32 {
    let saved = state.colors();
    let (mask_from, mask_code) = match mover {
        Player::User => (PIECES as u8, -UNKNOWN),
        Player::Enemy => (0u8, UNKNOWN),
    };
    for piece in mask_from..mask_from + PIECES as u8 {
        state.set_piece_color(piece, mask_code);
    }

    let score = match state.apply(mv) {
        Ok(()) => {
            let s = board_score(state, mover, store);
            // The apply above succeeded, so this undo cannot fail.
            let _ = state.undo();
            s
        }
        Err(_) => 0.0,
    };

    state.restore_colors(saved);
    score
}

/// Choose an index from the score vector under the given rule.
fn select(scores: &[f32], rule: SelectionRule, rng: &mut fastrand::Rng) -> Option<usize> {
    if scores.is_empty() {
        return None;
    }
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    match rule {
        SelectionRule::Argmax => Some(argmax(scores, max, rng)),
        SelectionRule::Linear => {
            let min = scores.iter().copied().fold(f32::INFINITY, f32::min);
            let shift = if min < 0.0 { -min as f64 } else { 0.0 };
            let weights: Vec<f64> = scores.iter().map(|&s| (s as f64 + shift).max(0.0)).collect();
            match sample(&weights, rng) {
                Some(i) => Some(i),
                None => Some(argmax(scores, max, rng)),
            }
        }
        SelectionRule::Softmax { temperature } => {
            let t = temperature.max(1e-9);
            let weights: Vec<f64> = scores
                .iter()
                .map(|&s| ((s as f64 - max as f64) / t).exp())
                .collect();
            match sample(&weights, rng) {
                Some(i) => Some(i),
                None => Some(argmax(scores, max, rng)),
            }
        }
    }
}

/// Index of the maximal score, uniform among exact ties.
fn argmax(scores: &[f32], max: f32, rng: &mut fastrand::Rng) -> usize {
    let ties: Vec<usize> = scores
        .iter()
        .enumerate()
        .filter(|&(_, &s)| s == max)
        .map(|(i, _)| i)
        .collect();
    if ties.is_empty() {
        0
    } else {
        ties[rng.usize(..ties.len())]
    }
}

/// Draw an index proportionally to non-negative weights; `None` when the
/// mass is zero or non-finite.
fn sample(weights: &[f64], rng: &mut fastrand::Rng) -> Option<usize> {
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return None;
    }
    let target = rng.f64() * total;
    let mut acc = 0.0;
    for (i, &w) in weights.iter().enumerate() {
        acc += w;
        if target < acc {
            return Some(i);
        }
    }
    Some(weights.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh() -> GameState {
        GameState::with_reds([0, 1, 2, 3], [0, 1, 2, 3])
    }

    #[test]
    fn test_symbol_cache_hides_opponent_colors() {
        let s = fresh();
        let user = symbol_cache(&s, Player::User);
        let enemy = symbol_cache(&s, Player::Enemy);
        // Piece A: red for its owner, opaque 3 for the opponent.
        assert_eq!(user[25], 1);
        assert_eq!(enemy[25], 3);
        // Piece a (red in this fixture) on cell 10.
        assert_eq!(user[10], 3);
        assert_eq!(enemy[10], 1);
        assert_eq!(user[0], 0);
    }

    #[test]
    fn test_untrained_board_score_is_one_half() {
        let s = fresh();
        let store = WeightStore::new();
        let score = board_score(&s, Player::User, &store);
        assert!((score - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_regime_selection() {
        assert_eq!(regime_for([4, 4, 4, 4], Player::User), Regime::Normal);
        assert_eq!(regime_for([4, 4, 1, 4], Player::User), Regime::RedOne);
        assert_eq!(regime_for([4, 4, 0, 4], Player::User), Regime::RedOne);
        assert_eq!(regime_for([4, 1, 4, 4], Player::User), Regime::BlueOne);
        // Red-one wins when both apply.
        assert_eq!(regime_for([4, 1, 1, 4], Player::User), Regime::RedOne);
        assert_eq!(regime_for([1, 4, 4, 4], Player::Enemy), Regime::RedOne);
        assert_eq!(regime_for([4, 4, 4, 1], Player::Enemy), Regime::BlueOne);
    }

    #[test]
    fn test_score_with_all_opponents_captured() {
        // Regime lookups must stay in range even at zero survivors.
        let mut s = fresh();
        let wire = "14B24B34B44B15R25R35R45R99r99r99r99r99b99b99b99b";
        s.sync_from_wire(wire).unwrap();
        let store = WeightStore::new();
        let score = board_score(&s, Player::User, &store);
        assert!(score.is_finite());
    }

    #[test]
    fn test_corner_assignment_is_injective() {
        let s = fresh();
        let assignment = assign_corners(&s, Player::User);
        let assigned: Vec<Cell> = assignment.iter().flatten().copied().collect();
        assert_eq!(assigned.len(), 4);
        let mut unique = assigned.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 4);
        // Only the mover's pieces get tasks.
        for piece in PIECES..TOTAL_PIECES {
            assert_eq!(assignment[piece], None);
        }
    }

    #[test]
    fn test_escape_scores_as_guaranteed_win() {
        let mut s = fresh();
        let wire = "00B24B34B44B15R25R35R45R41u31u21u11u40u30u20u10u";
        s.sync_from_wire(wire).unwrap();
        let mv = Move {
            piece: 0,
            dir: Direction::West,
        };
        assert!(is_guaranteed_win(&s, mv, Player::User));

        // Argmax must take the immediate escape.
        let store = WeightStore::new();
        let mut rng = fastrand::Rng::with_seed(1);
        let pick = highest_weight(&mut s, &store, SelectionRule::Argmax, &mut rng);
        assert_eq!(pick, Some(mv));
    }

    #[test]
    fn test_two_step_setup_requires_safe_guard() {
        let mut s = fresh();
        // Own blue on cell 1 headed for the empty corner 0; guard cell 6
        // is empty, so the setup is safe.
        let wire = "10B24B34B44B15R25R35R45R41u31u21u11u40u30u20u52u";
        s.sync_from_wire(wire).unwrap();
        let mv = Move {
            piece: 0,
            dir: Direction::West,
        };
        assert!(is_guaranteed_win(&s, mv, Player::User));

        // With an opponent piece on the guard cell the setup is unsafe.
        let wire = "10B24B34B44B15R25R35R45R01u31u21u11u40u30u20u52u";
        s.sync_from_wire(wire).unwrap();
        assert!(!is_guaranteed_win(&s, mv, Player::User));
    }

    #[test]
    fn test_highest_weight_simulation_leaves_state_untouched() {
        let mut s = fresh();
        let store = WeightStore::new();
        let mut rng = fastrand::Rng::with_seed(5);
        let colors_before = s.colors();
        let board_before: Vec<i8> = (0..CELLS).map(|c| s.cell_code(c)).collect();

        let mv = highest_weight(&mut s, &store, SelectionRule::default(), &mut rng);
        assert!(mv.is_some());
        assert_eq!(s.colors(), colors_before);
        let board_after: Vec<i8> = (0..CELLS).map(|c| s.cell_code(c)).collect();
        assert_eq!(board_before, board_after);
        assert_eq!(s.plies(), 0);
    }

    #[test]
    fn test_selection_rules_return_valid_indices() {
        let mut rng = fastrand::Rng::with_seed(9);
        let scores = [0.2f32, 0.9, 0.4];
        assert_eq!(select(&scores, SelectionRule::Argmax, &mut rng), Some(1));
        for _ in 0..50 {
            let i = select(&scores, SelectionRule::Linear, &mut rng);
            assert!(matches!(i, Some(0..=2)));
            let i = select(
                &scores,
                SelectionRule::Softmax { temperature: 1.0 },
                &mut rng,
            );
            assert!(matches!(i, Some(0..=2)));
        }
        assert_eq!(select(&[], SelectionRule::Argmax, &mut rng), None);
    }
}
