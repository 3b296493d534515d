//! Geister-Rust: a move-selection engine for a Geister-style hidden-piece
//! board game.
//!
//! Two players each own eight pieces (four red, four blue) on a 6x6 board;
//! the opponent's colors stay hidden until a capture reveals them. A side
//! wins by escaping one of its blues off its exit corner, by losing all of
//! its reds, or by capturing all of the opponent's blues.
//!
//! The crate is organized as:
//! - [`state`] - rules engine: legal moves, reversible application,
//!   terminal detection, wire-board synchronization
//! - [`weights`] - trained n-tuple tables and their CSV persistence
//! - [`eval`] - positional scoring and the greedy table policy
//! - [`tree`] - arena-based search tree shared by both searches
//! - [`mcts`] - perfect-information baseline search
//! - [`ismcts`] - information-set search with determinization, the
//!   production move chooser
//! - [`protocol`] - line protocol adapter for the game server

pub mod constants;
pub mod eval;
pub mod ismcts;
pub mod mcts;
pub mod protocol;
pub mod state;
pub mod tree;
pub mod weights;
