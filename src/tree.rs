//! Arena-backed search tree shared by both Monte Carlo searches.
//!
//! Nodes live in a flat `Vec` and reference each other by index, so the
//! tree is dropped in one free and ids stay `Copy`. A tree is built fresh
//! for every top-level move decision and never reused across decisions.

use crate::state::Move;

/// Index of a node in its tree's arena.
pub type NodeId = usize;

/// One search node. `wins` is a signed accumulator: the perfect-information
/// search alternates its sign per level, the information-set search keeps
/// one fixed perspective; the node itself does not care.
#[derive(Debug)]
pub struct Node {
    /// Move that led here; `None` only at the root.
    pub mv: Option<Move>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub visits: u32,
    pub wins: f64,
    /// How often this node was a legal candidate during selection,
    /// regardless of whether it was chosen. Only the information-set
    /// search reads it.
    pub availability: u32,
}

pub struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub const ROOT: NodeId = 0;

    /// A tree holding just the root.
    pub fn new() -> Self {
        Tree {
            nodes: vec![Node {
                mv: None,
                parent: None,
                children: Vec::new(),
                visits: 0,
                wins: 0.0,
                availability: 0,
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[inline]
    pub fn get(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    #[inline]
    pub fn get_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// Append a child under `parent` and return its id.
    pub fn add_child(&mut self, parent: NodeId, mv: Move) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            mv: Some(mv),
            parent: Some(parent),
            children: Vec::new(),
            visits: 0,
            wins: 0.0,
            availability: 0,
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Robust child: most visits, first-seen on ties so the result is
    /// deterministic for a fixed tree.
    pub fn most_visited_child(&self, id: NodeId) -> Option<NodeId> {
        let mut best: Option<NodeId> = None;
        for &child in &self.nodes[id].children {
            match best {
                Some(b) if self.nodes[child].visits <= self.nodes[b].visits => {}
                _ => best = Some(child),
            }
        }
        best
    }
}

impl Default for Tree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::Direction;

    fn mv(piece: u8) -> Move {
        Move {
            piece,
            dir: Direction::North,
        }
    }

    #[test]
    fn test_add_child_links_both_ways() {
        let mut t = Tree::new();
        let a = t.add_child(Tree::ROOT, mv(0));
        let b = t.add_child(Tree::ROOT, mv(1));
        let c = t.add_child(a, mv(2));
        assert_eq!(t.get(Tree::ROOT).children, vec![a, b]);
        assert_eq!(t.get(a).parent, Some(Tree::ROOT));
        assert_eq!(t.get(c).parent, Some(a));
        assert_eq!(t.get(c).mv, Some(mv(2)));
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn test_most_visited_child_prefers_first_seen_on_ties() {
        let mut t = Tree::new();
        let a = t.add_child(Tree::ROOT, mv(0));
        let b = t.add_child(Tree::ROOT, mv(1));
        let c = t.add_child(Tree::ROOT, mv(2));
        t.get_mut(a).visits = 5;
        t.get_mut(b).visits = 5;
        t.get_mut(c).visits = 3;
        assert_eq!(t.most_visited_child(Tree::ROOT), Some(a));

        t.get_mut(b).visits = 6;
        assert_eq!(t.most_visited_child(Tree::ROOT), Some(b));
        assert_eq!(t.most_visited_child(c), None);
    }
}
