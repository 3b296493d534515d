//! Constants for board geometry, piece codes, and search parameters.
//!
//! The board is a 6x6 grid stored as a flat array of 36 signed color codes.
//! Each player owns 8 pieces: 4 red and 4 blue, with the opponent's colors
//! hidden until revealed by capture.

// =============================================================================
// Board Geometry
// =============================================================================

/// Number of rows on the board.
pub const ROWS: usize = 6;

/// Number of columns on the board.
pub const COLS: usize = 6;

/// Total number of cells.
pub const CELLS: usize = ROWS * COLS;

/// Pieces per player.
pub const PIECES: usize = 8;

/// Total pieces on the board (both players).
pub const TOTAL_PIECES: usize = PIECES * 2;

/// Red (and blue) pieces per player at game start.
pub const PIECES_PER_COLOR: u8 = 4;

/// Home-exit corners for the first player (top edge).
pub const USER_EXITS: [usize; 2] = [0, 5];

/// Home-exit corners for the second player (bottom edge).
pub const ENEMY_EXITS: [usize; 2] = [30, 35];

/// Starting cells, first player then second, in piece-id order.
pub const INIT_POS: [[usize; PIECES]; 2] = [
    [25, 26, 27, 28, 31, 32, 33, 34],
    [10, 9, 8, 7, 4, 3, 2, 1],
];

// =============================================================================
// Color Codes (signed: positive = own side, negative = opponent)
// =============================================================================

/// Red piece color code.
pub const RED: i8 = 1;

/// Blue piece color code.
pub const BLUE: i8 = 2;

/// Unknown color (fog of war placeholder).
pub const UNKNOWN: i8 = 3;

// =============================================================================
// Game Rules
// =============================================================================

/// Ply cap: a game reaching this many half-moves is a draw.
pub const MAX_PLIES: usize = 200;

// =============================================================================
// Search Parameters
// =============================================================================

/// UCB1 exploration constant (sqrt(2) scale).
pub const EXPLORATION: f64 = 1.414;

/// Default number of ISMCTS iterations per move decision.
pub const N_SIMS: usize = 10_000;

/// Rollout depth cap for the perfect-information baseline search.
pub const MCTS_ROLLOUT_CAP: usize = 1000;

/// Rollout ply cap for ISMCTS simulations.
pub const ISMCTS_ROLLOUT_CAP: usize = 200;

/// Epsilon floor for the decaying epsilon-greedy rollout policy.
pub const EPSILON_FLOOR: f64 = 0.1;

/// Additive smoothing applied to arrangement win rates when biasing
/// determinization toward adversarial colorings.
pub const ARRANGEMENT_SMOOTHING: f64 = 0.05;

// =============================================================================
// N-Tuple Network
// =============================================================================

/// Number of valid (template, base-cell) placements across the board.
pub const TUPLE_NUM: usize = 61;

/// Features per template: 4 cells, 4 symbols each (base-4, 4 digits).
pub const FEATURE_NUM: usize = 256;

/// Default win count for an untrained table entry.
pub const DEFAULT_WIN: u64 = 1;

/// Default visit count for an untrained table entry.
pub const DEFAULT_VISIT: u64 = 2;

/// Default win rate for an untrained table entry (1/2).
pub const DEFAULT_RATE: f32 = 0.5;
