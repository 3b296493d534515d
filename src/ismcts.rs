//! Information-set Monte Carlo tree search: the production move chooser.
//!
//! The searcher never trusts hidden information. Every iteration first
//! *determinizes* the root information set (gives each unrevealed opponent
//! piece a concrete color consistent with what captures have revealed), then
//! runs one select/expand/simulate/backpropagate pass where tree descent is
//! restricted to moves legal under that determinization. Node statistics
//! therefore aggregate over many possible worlds, and the exploration term
//! uses availability counts (how often a node was a legal candidate) instead
//! of parent visits.
//!
//! The first half of the budget samples colorings uniformly. The second half
//! enumerates all colorings consistent with the revealed counts and samples
//! them weighted by `1 - win_rate + 0.05` over the results observed so far,
//! biasing the search toward the arrangements that are going worst for the
//! root player. That keeps the chosen move honest against an opponent whose
//! setup is adversarial rather than random.

use std::collections::HashMap;

use crate::constants::{
    ARRANGEMENT_SMOOTHING, EPSILON_FLOOR, EXPLORATION, ISMCTS_ROLLOUT_CAP, PIECES, RED, BLUE,
    TOTAL_PIECES,
};
use crate::eval::{self, SelectionRule};
use crate::state::{GameState, Move, Outcome, Player};
use crate::tree::{NodeId, Tree};
use crate::weights::WeightStore;

/// Win/trial tallies per sampled coloring, keyed by the 'R'/'B' string over
/// the root's unrevealed opponent pieces in piece-id order. Reset for every
/// top-level decision.
type ArrangementStats = HashMap<String, (u32, u32)>;

/// Pick a move for the side to move at `root_state`, spending `iterations`
/// determinized simulations. Returns `None` when no move ever became
/// available, which only happens at (or one step from) a terminal state.
pub fn search(
    root_state: &GameState,
    store: &WeightStore,
    iterations: usize,
    rule: SelectionRule,
    rng: &mut fastrand::Rng,
) -> Option<Move> {
    let mut tree = Tree::new();
    let mut stats = ArrangementStats::new();
    let root_player = root_state.side_to_move();

    for i in 0..iterations {
        let mut det = root_state.clone();
        determinize(&mut det, &stats, i, iterations, rng);

        let mut avail_path: Vec<Vec<NodeId>> = Vec::new();
        let mut node = select(&tree, &mut det, &mut avail_path, rng);

        if !det.is_over() {
            if let Some(added) = expand_one(&mut tree, node, &det, rng) {
                node = added;
                if let Some(mv) = tree.get(added).mv {
                    if det.apply(mv).is_err() {
                        continue;
                    }
                }
            }
        }

        let result = simulate(&det, store, root_player, rule, rng);
        record_arrangement(&mut stats, root_state, &det, result);
        backpropagate(&mut tree, node, result, &avail_path);
    }

    tree.most_visited_child(Tree::ROOT)
        .and_then(|id| tree.get(id).mv)
}

// =============================================================================
// Determinization
// =============================================================================

/// Assign a concrete color to every still-unrevealed opponent piece,
/// consistent with the counts already revealed by capture or disclosure.
fn determinize(
    state: &mut GameState,
    stats: &ArrangementStats,
    iteration: usize,
    budget: usize,
    rng: &mut fastrand::Rng,
) {
    let unrevealed = unrevealed_pieces(state);
    if unrevealed.is_empty() {
        return;
    }
    let reds_left = remaining_reds(state);

    if iteration < budget / 2 {
        // Uniform phase: shuffle, first `reds_left` become red.
        let mut order = unrevealed.clone();
        rng.shuffle(&mut order);
        for (i, &piece) in order.iter().enumerate() {
            let code = if i < reds_left { -RED } else { -BLUE };
            state.set_piece_color(piece, code);
        }
        return;
    }

    // Informed phase: enumerate every valid coloring and sample one,
    // weighting colorings by how badly they have gone for the root player.
    let n = unrevealed.len();
    let mut masks = Vec::new();
    let mut weights = Vec::new();
    for mask in 0u32..(1u32 << n) {
        if mask.count_ones() as usize != reds_left {
            continue;
        }
        let key = mask_key(mask, n);
        let rate = match stats.get(&key) {
            Some(&(wins, trials)) if trials > 0 => wins as f64 / trials as f64,
            _ => 0.5,
        };
        masks.push(mask);
        weights.push(1.0 - rate + ARRANGEMENT_SMOOTHING);
    }

    let total: f64 = weights.iter().sum();
    let target = rng.f64() * total;
    let mut acc = 0.0;
    let mut chosen = masks[masks.len() - 1];
    for (i, &mask) in masks.iter().enumerate() {
        acc += weights[i];
        if target <= acc {
            chosen = mask;
            break;
        }
    }

    for (i, &piece) in unrevealed.iter().enumerate() {
        let code = if chosen & (1 << i) != 0 { -RED } else { -BLUE };
        state.set_piece_color(piece, code);
    }
}

/// Opponent pieces whose color is still hidden, in piece-id order. Capture
/// always reveals, so these are all alive.
fn unrevealed_pieces(state: &GameState) -> Vec<u8> {
    (PIECES as u8..TOTAL_PIECES as u8)
        .filter(|&p| !state.is_revealed(p))
        .collect()
}

/// How many of the hidden opponent pieces must be red.
fn remaining_reds(state: &GameState) -> usize {
    let revealed_reds = (PIECES as u8..TOTAL_PIECES as u8)
        .filter(|&p| state.is_revealed(p) && state.piece_color(p) == -RED)
        .count();
    4usize.saturating_sub(revealed_reds)
}

/// 'R'/'B' string for a coloring bitmask over `n` hidden pieces.
fn mask_key(mask: u32, n: usize) -> String {
    (0..n)
        .map(|i| if mask & (1 << i) != 0 { 'R' } else { 'B' })
        .collect()
}

/// Tally the sampled coloring's result. The key is built over the pieces
/// hidden *at the root*, whatever the playout later revealed.
fn record_arrangement(
    stats: &mut ArrangementStats,
    root_state: &GameState,
    det: &GameState,
    result: f64,
) {
    let mut key = String::new();
    for p in PIECES as u8..TOTAL_PIECES as u8 {
        if !root_state.is_revealed(p) {
            key.push(if det.piece_color(p) == -RED { 'R' } else { 'B' });
        }
    }
    let entry = stats.entry(key).or_insert((0, 0));
    if result > 0.0 {
        entry.0 += 1;
    }
    entry.1 += 1;
}

// =============================================================================
// Selection / Expansion
// =============================================================================

/// Descend while the current node is fully expanded with respect to the
/// moves legal under this determinization, applying moves as we go. Each
/// level's candidate set is snapshotted for the availability update.
fn select(
    tree: &Tree,
    det: &mut GameState,
    avail_path: &mut Vec<Vec<NodeId>>,
    rng: &mut fastrand::Rng,
) -> NodeId {
    let mut node = Tree::ROOT;
    while !det.is_over() {
        let moves = det.legal_moves();
        if moves.is_empty() {
            break;
        }

        let children = &tree.get(node).children;
        let fully_expanded = moves
            .iter()
            .all(|m| children.iter().any(|&c| tree.get(c).mv == Some(*m)));
        if !fully_expanded {
            break;
        }

        // Candidates: children whose move exists in this world.
        let cand: Vec<NodeId> = children
            .iter()
            .copied()
            .filter(|&c| tree.get(c).mv.is_some_and(|m| moves.contains(&m)))
            .collect();
        if cand.is_empty() {
            break;
        }

        let unvisited: Vec<NodeId> = cand
            .iter()
            .copied()
            .filter(|&c| tree.get(c).visits == 0)
            .collect();
        let next = if unvisited.is_empty() {
            let mut best = cand[0];
            let mut best_score = f64::NEG_INFINITY;
            for &c in &cand {
                let score = ucb(tree, c);
                if score > best_score {
                    best_score = score;
                    best = c;
                }
            }
            best
        } else {
            unvisited[rng.usize(..unvisited.len())]
        };

        avail_path.push(cand);
        let Some(mv) = tree.get(next).mv else { break };
        if det.apply(mv).is_err() {
            break;
        }
        node = next;
    }
    node
}

/// Mean value plus availability-based exploration; unvisited nodes rank
/// above everything.
fn ucb(tree: &Tree, id: NodeId) -> f64 {
    let node = tree.get(id);
    if node.visits == 0 {
        return f64::INFINITY;
    }
    let visits = node.visits as f64;
    let avail = node.availability.max(1) as f64;
    node.wins / visits + EXPLORATION * (avail.ln() / visits).sqrt()
}

/// Add exactly one uniformly-chosen legal move that has no child yet.
fn expand_one(
    tree: &mut Tree,
    node: NodeId,
    det: &GameState,
    rng: &mut fastrand::Rng,
) -> Option<NodeId> {
    let moves = det.legal_moves();
    let fresh: Vec<Move> = moves
        .into_iter()
        .filter(|m| {
            !tree
                .get(node)
                .children
                .iter()
                .any(|&c| tree.get(c).mv == Some(*m))
        })
        .collect();
    if fresh.is_empty() {
        return None;
    }
    let mv = fresh[rng.usize(..fresh.len())];
    Some(tree.add_child(node, mv))
}

// =============================================================================
// Simulation / Backpropagation
// =============================================================================

/// Play the determinized state out for up to 200 plies. The root player
/// mixes uniform random moves with the greedy table policy under a decaying
/// epsilon; the opponent plays uniformly at random. The result is from the
/// fixed root player's perspective: +1 win, -1 loss, 0 for a draw or a
/// truncated playout.
fn simulate(
    det: &GameState,
    store: &WeightStore,
    root_player: Player,
    rule: SelectionRule,
    rng: &mut fastrand::Rng,
) -> f64 {
    let mut state = det.clone();
    for step in 0..ISMCTS_ROLLOUT_CAP {
        if state.is_over() {
            break;
        }
        let moves = state.legal_moves();
        if moves.is_empty() {
            break;
        }

        let epsilon = EPSILON_FLOOR.max(1.0 - step as f64 / ISMCTS_ROLLOUT_CAP as f64);
        let mv = if state.side_to_move() == root_player && rng.f64() >= epsilon {
            eval::highest_weight(&mut state, store, rule, rng)
                .unwrap_or(moves[rng.usize(..moves.len())])
        } else {
            moves[rng.usize(..moves.len())]
        };
        if state.apply(mv).is_err() {
            break;
        }
    }

    match state.outcome() {
        Some(Outcome::Win(p)) if p == root_player => 1.0,
        Some(Outcome::Win(_)) => -1.0,
        _ => 0.0,
    }
}

/// Walk from the leaf to the root adding the fixed-perspective result (no
/// sign flip), then credit availability to every snapshotted candidate.
fn backpropagate(tree: &mut Tree, leaf: NodeId, result: f64, avail_path: &[Vec<NodeId>]) {
    let mut current = Some(leaf);
    while let Some(id) = current {
        let node = tree.get_mut(id);
        node.visits += 1;
        node.wins += result;
        current = node.parent;
    }
    for level in avail_path {
        for &sibling in level {
            tree.get_mut(sibling).availability += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Direction;

    /// Wire position: standard-looking middlegame with every opponent
    /// piece still hidden.
    fn hidden_start() -> GameState {
        let mut s = GameState::with_reds([0, 1, 2, 3], [0, 1, 2, 3]);
        let wire = "14B24B34B44B15R25R35R45R41u31u21u11u40u30u20u10u";
        s.sync_from_wire(wire).unwrap();
        s
    }

    #[test]
    fn test_determinization_matches_remaining_counts() {
        let base = hidden_start();
        let stats = ArrangementStats::new();
        for iteration in [0usize, 100] {
            let mut rng = fastrand::Rng::with_seed(iteration as u64 + 1);
            let mut det = base.clone();
            determinize(&mut det, &stats, iteration, 100, &mut rng);

            let mut reds = 0;
            let mut blues = 0;
            for p in PIECES as u8..TOTAL_PIECES as u8 {
                match det.piece_color(p) {
                    c if c == -RED => reds += 1,
                    c if c == -BLUE => blues += 1,
                    other => panic!("piece {p} left with color {other}"),
                }
            }
            assert_eq!((reds, blues), (4, 4));
        }
    }

    #[test]
    fn test_determinization_respects_revealed_pieces() {
        let mut base = hidden_start();
        // Piece `a` arrives revealed as red.
        let wire = "14B24B34B44B15R25R35R45R41r31u21u11u40u30u20u10u";
        base.sync_from_wire(wire).unwrap();
        assert!(base.is_revealed(8));

        let stats = ArrangementStats::new();
        let mut rng = fastrand::Rng::with_seed(2);
        let mut det = base.clone();
        determinize(&mut det, &stats, 0, 10, &mut rng);

        // The revealed red keeps its color; three more reds among the rest.
        assert_eq!(det.piece_color(8), -RED);
        let hidden_reds = (9u8..16)
            .filter(|&p| det.piece_color(p) == -RED)
            .count();
        assert_eq!(hidden_reds, 3);
    }

    #[test]
    fn test_informed_phase_prefers_losing_arrangements() {
        let base = hidden_start();
        let mut stats = ArrangementStats::new();
        // One arrangement has been winning for us, another losing.
        let winning = "RRRRBBBB".to_string();
        let losing = "BBBBRRRR".to_string();
        stats.insert(winning.clone(), (100, 100));
        stats.insert(losing.clone(), (0, 100));

        let mut rng = fastrand::Rng::with_seed(3);
        let mut losing_hits = 0;
        let mut winning_hits = 0;
        for _ in 0..300 {
            let mut det = base.clone();
            determinize(&mut det, &stats, 10, 10, &mut rng);
            let key: String = (8u8..16)
                .map(|p| if det.piece_color(p) == -RED { 'R' } else { 'B' })
                .collect();
            if key == losing {
                losing_hits += 1;
            } else if key == winning {
                winning_hits += 1;
            }
        }
        assert!(losing_hits > winning_hits);
    }

    #[test]
    fn test_ucb_unvisited_outranks_visited() {
        let mut tree = Tree::new();
        let a = tree.add_child(Tree::ROOT, Move { piece: 0, dir: Direction::North });
        let b = tree.add_child(Tree::ROOT, Move { piece: 1, dir: Direction::North });
        tree.get_mut(a).visits = 50;
        tree.get_mut(a).wins = 50.0;
        tree.get_mut(a).availability = 50;
        assert!(ucb(&tree, b) > ucb(&tree, a));
    }

    #[test]
    fn test_search_returns_legal_move_under_hidden_information() {
        let state = hidden_start();
        let store = WeightStore::new();
        let mut rng = fastrand::Rng::with_seed(7);
        let mv = search(&state, &store, 300, SelectionRule::default(), &mut rng).unwrap();
        assert!(state.legal_moves().contains(&mv));
    }

    #[test]
    fn test_search_takes_immediate_escape() {
        let mut state = hidden_start();
        let wire = "00B24B34B44B15R25R35R45R41u31u21u11u40u30u20u10u";
        state.sync_from_wire(wire).unwrap();
        let store = WeightStore::new();
        let mut rng = fastrand::Rng::with_seed(11);
        let mv = search(&state, &store, 400, SelectionRule::default(), &mut rng).unwrap();
        assert_eq!(
            mv,
            Move {
                piece: 0,
                dir: Direction::West
            }
        );
    }

    #[test]
    fn test_any_budget_yields_a_decision() {
        // Cornered endgame: own blue on its exit corner, own red on the
        // other, everything else captured or hostile. Even one iteration
        // must come back with a legal move, and a modest budget must settle
        // on the escape, whose every playout is an immediate win.
        let mut state = GameState::with_reds([0, 1, 2, 3], [0, 1, 2, 3]);
        let wire = "00B50R99r99r99r99b99b99b10r01r40r51r22u32u42u52u";
        state.sync_from_wire(wire).unwrap();
        let store = WeightStore::new();

        for sims in [1usize, 5, 50] {
            let mut rng = fastrand::Rng::with_seed(sims as u64);
            let mv = search(&state, &store, sims, SelectionRule::default(), &mut rng).unwrap();
            assert!(state.legal_moves().contains(&mv), "illegal at {sims} sims");
        }

        let mut rng = fastrand::Rng::with_seed(23);
        let mv = search(&state, &store, 400, SelectionRule::default(), &mut rng).unwrap();
        assert_eq!(
            mv,
            Move {
                piece: 0,
                dir: Direction::West
            }
        );
    }

    #[test]
    fn test_arrangement_stats_accumulate() {
        let root = hidden_start();
        let mut det = root.clone();
        let stats_ref = ArrangementStats::new();
        let mut rng = fastrand::Rng::with_seed(13);
        determinize(&mut det, &stats_ref, 0, 10, &mut rng);

        let mut stats = ArrangementStats::new();
        record_arrangement(&mut stats, &root, &det, 1.0);
        record_arrangement(&mut stats, &root, &det, -1.0);
        assert_eq!(stats.len(), 1);
        let (key, &(wins, trials)) = stats.iter().next().unwrap();
        assert_eq!(key.len(), 8);
        assert_eq!((wins, trials), (1, 2));
        assert_eq!(key.chars().filter(|&c| c == 'R').count(), 4);
    }

    #[test]
    fn test_backpropagation_keeps_fixed_perspective() {
        let mut tree = Tree::new();
        let a = tree.add_child(Tree::ROOT, Move { piece: 0, dir: Direction::North });
        let b = tree.add_child(a, Move { piece: 8, dir: Direction::South });
        let path = vec![vec![a]];
        backpropagate(&mut tree, b, 1.0, &path);
        assert_eq!(tree.get(b).wins, 1.0);
        assert_eq!(tree.get(a).wins, 1.0);
        assert_eq!(tree.get(Tree::ROOT).wins, 1.0);
        assert_eq!(tree.get(a).availability, 1);
        assert_eq!(tree.get(b).availability, 0);
    }

    #[test]
    fn test_root_visits_equal_budget() {
        let state = hidden_start();
        let store = WeightStore::new();
        let mut rng = fastrand::Rng::with_seed(19);
        let mut tree = Tree::new();
        let mut stats = ArrangementStats::new();
        let iterations = 50;
        for i in 0..iterations {
            let mut det = state.clone();
            determinize(&mut det, &stats, i, iterations, &mut rng);
            let mut avail_path = Vec::new();
            let mut node = select(&tree, &mut det, &mut avail_path, &mut rng);
            if !det.is_over() {
                if let Some(added) = expand_one(&mut tree, node, &det, &mut rng) {
                    node = added;
                    let mv = tree.get(added).mv.unwrap();
                    det.apply(mv).unwrap();
                }
            }
            let result = simulate(&det, &store, Player::User, SelectionRule::default(), &mut rng);
            record_arrangement(&mut stats, &state, &det, result);
            backpropagate(&mut tree, node, result, &avail_path);
        }
        assert_eq!(tree.get(Tree::ROOT).visits, iterations as u32);
    }
}
