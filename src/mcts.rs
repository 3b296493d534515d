//! Perfect-information Monte Carlo tree search.
//!
//! Baseline search used for self-play and regression comparisons: it sees
//! the true colors of every piece, so it plays the underlying game rather
//! than the information-set game. Four phases per iteration over a cloned
//! root state:
//! - selection by UCB1, taking any unvisited child first,
//! - expansion of all legal moves (minus the red-capture pruning),
//! - a uniform-random rollout with a depth cap,
//! - backpropagation with alternating sign per level.

use crate::constants::{EXPLORATION, MCTS_ROLLOUT_CAP, RED};
use crate::state::{Cell, GameState, Move, Outcome, Player};
use crate::tree::{NodeId, Tree};

/// Run the search and return the most-visited root move, or `None` when the
/// root has no legal moves.
pub fn search(root_state: &GameState, iterations: usize, rng: &mut fastrand::Rng) -> Option<Move> {
    let mut tree = Tree::new();

    for _ in 0..iterations {
        let mut state = root_state.clone();
        let leaf = descend(&mut tree, &mut state, rng);
        let value = rollout(&mut state, rng);
        backpropagate(&mut tree, leaf, value);
    }

    tree.most_visited_child(Tree::ROOT)
        .and_then(|id| tree.get(id).mv)
}

/// Selection plus expansion: walk the tree applying moves until a node with
/// no children is reached, expand it if the game is still live, and return
/// the node the rollout starts from. The state is advanced to match.
fn descend(tree: &mut Tree, state: &mut GameState, rng: &mut fastrand::Rng) -> NodeId {
    let mut node = Tree::ROOT;

    loop {
        if state.is_over() {
            return node;
        }
        if tree.get(node).children.is_empty() {
            expand(tree, node, state);
            let children = &tree.get(node).children;
            if children.is_empty() {
                // No legal moves at a live state; score the rollout here.
                return node;
            }
            let pick = children[rng.usize(..children.len())];
            if advance(tree, pick, state) {
                return pick;
            }
            return node;
        }

        let next = select_child(tree, node);
        if !advance(tree, next, state) {
            return node;
        }
        node = next;
    }
}

/// Apply a tree node's move to the state. A generated move can only fail to
/// apply if the tree and state have diverged; the caller stops descending.
fn advance(tree: &Tree, node: NodeId, state: &mut GameState) -> bool {
    match tree.get(node).mv {
        Some(mv) => state.apply(mv).is_ok(),
        None => false,
    }
}

/// UCB1 over the children: any unvisited child is taken immediately,
/// otherwise maximize mean value plus the exploration term.
fn select_child(tree: &Tree, node: NodeId) -> NodeId {
    let parent_visits = tree.get(node).visits.max(1) as f64;
    let children = &tree.get(node).children;

    let mut best = children[0];
    let mut best_score = f64::NEG_INFINITY;
    for &child in children {
        let n = tree.get(child);
        if n.visits == 0 {
            return child;
        }
        let v = n.visits as f64;
        let score = n.wins / v + EXPLORATION * (parent_visits.ln() / v).sqrt();
        if score > best_score {
            best_score = score;
            best = child;
        }
    }
    best
}

/// Add one child per legal move, pruning moves that capture an opponent
/// piece whose true color is red (an own-goal this search can see coming).
/// If pruning removes everything, fall back to the full move list so the
/// search can proceed.
fn expand(tree: &mut Tree, node: NodeId, state: &GameState) {
    let moves = state.legal_moves();
    let kept: Vec<Move> = moves
        .iter()
        .copied()
        .filter(|&mv| !captures_enemy_red(state, mv))
        .collect();
    let kept = if kept.is_empty() { moves } else { kept };
    for mv in kept {
        tree.add_child(node, mv);
    }
}

/// True-color check: this search plays with full visibility, so the gate
/// does not wait for a reveal. Pieces synced with a hidden wire color carry
/// the unknown code and never match.
fn captures_enemy_red(state: &GameState, mv: Move) -> bool {
    let Some(src) = state.piece_pos(mv.piece) else {
        return false;
    };
    if state.is_escape(mv) {
        return false;
    }
    let dst = (src as isize + mv.dir.offset()) as Cell;
    match state.piece_at(dst) {
        Some(target) => {
            let opp_sign = state.side_to_move().opponent().sign();
            state.piece_color(target) == RED * opp_sign
        }
        None => false,
    }
}

/// Uniform-random playout from the current state. The result is +1/-1 from
/// the perspective of the side to move at the playout start, 0 for a draw
/// or when the depth cap cuts the game off.
fn rollout(state: &mut GameState, rng: &mut fastrand::Rng) -> f64 {
    let leaf_side = state.side_to_move();
    for _ in 0..MCTS_ROLLOUT_CAP {
        if state.is_over() {
            break;
        }
        let moves = state.legal_moves();
        if moves.is_empty() {
            break;
        }
        let mv = moves[rng.usize(..moves.len())];
        if state.apply(mv).is_err() {
            break;
        }
    }
    score_for(state.outcome(), leaf_side)
}

fn score_for(outcome: Option<Outcome>, side: Player) -> f64 {
    match outcome {
        Some(Outcome::Win(p)) if p == side => 1.0,
        Some(Outcome::Win(_)) => -1.0,
        _ => 0.0,
    }
}

/// Propagate a rollout result up from the leaf, flipping the sign at each
/// level so every node accumulates value from its own mover's perspective.
fn backpropagate(tree: &mut Tree, leaf: NodeId, value: f64) {
    // The move into the leaf was made by the opponent of the side whose
    // perspective `value` is in.
    let mut v = -value;
    let mut current = Some(leaf);
    while let Some(id) = current {
        let node = tree.get_mut(id);
        node.visits += 1;
        node.wins += v;
        v = -v;
        current = node.parent;
    }
}
