//! Game state representation and move execution.
//!
//! This module provides the core rules engine:
//! - Board state as a flat array of 36 signed color codes
//! - Piece bookkeeping (positions, colors, revealed flags, survival counts)
//! - Legal move generation, including blue-piece escape moves
//! - Reversible move application via an explicit history stack
//! - Terminal detection (escape, color elimination, ply-cap draw)
//!
//! Color codes are signed from the first player's perspective: the first
//! player's pieces are always positive (+1 red, +2 blue) and the second
//! player's negative, so capture legality is a sign test regardless of
//! whose turn it is.

use std::fmt;

use crate::constants::*;

/// A board cell index (0..36, row-major from the top-left).
pub type Cell = usize;

/// One of the four orthogonal movement directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    North,
    West,
    East,
    South,
}

impl Direction {
    /// Cell-index offset for a one-step move.
    #[inline]
    pub fn offset(self) -> isize {
        match self {
            Direction::North => -(COLS as isize),
            Direction::West => -1,
            Direction::East => 1,
            Direction::South => COLS as isize,
        }
    }

    /// Protocol name (NORTH/WEST/EAST/SOUTH).
    pub fn name(self) -> &'static str {
        match self {
            Direction::North => "NORTH",
            Direction::West => "WEST",
            Direction::East => "EAST",
            Direction::South => "SOUTH",
        }
    }
}

/// One of the two players. The engine always evaluates for `User`; `Enemy`
/// is the opponent whose piece colors start hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Player {
    User,
    Enemy,
}

impl Player {
    #[inline]
    pub fn opponent(self) -> Player {
        match self {
            Player::User => Player::Enemy,
            Player::Enemy => Player::User,
        }
    }

    /// Sign of this player's color codes (+1 for User, -1 for Enemy).
    #[inline]
    pub fn sign(self) -> i8 {
        match self {
            Player::User => 1,
            Player::Enemy => -1,
        }
    }
}

/// Structured game result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Win(Player),
    Draw,
}

/// A move: which piece steps one cell in which direction.
///
/// Capture information is not part of the move itself; it is recorded on the
/// history stack when the move is applied, which keeps moves comparable
/// across determinizations in the information-set search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub piece: u8,
    pub dir: Direction,
}

/// Rule-engine invariant violations, surfaced to the caller instead of
/// aborting the process so a single corrupted game cannot take down a host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RulesError {
    /// `undo` called with no history.
    EmptyHistory,
    /// `apply` called after the ply cap was already reached.
    PlyCapExceeded,
    /// A move references a piece that is no longer on the board.
    MissingPiece(u8),
    /// The destination holds a same-side piece; generation should have
    /// filtered this move out.
    InconsistentCapture { cell: Cell, code: i8 },
}

impl fmt::Display for RulesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RulesError::EmptyHistory => write!(f, "undo with empty history"),
            RulesError::PlyCapExceeded => write!(f, "move applied past the {MAX_PLIES}-ply cap"),
            RulesError::MissingPiece(p) => write!(f, "move references captured piece {p}"),
            RulesError::InconsistentCapture { cell, code } => {
                write!(f, "capture of same-side code {code} at cell {cell}")
            }
        }
    }
}

impl std::error::Error for RulesError {}

/// Errors from parsing the 48-character wire board string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    BadLength(usize),
    BadCoordinate(char),
    BadColor(char),
    DuplicateCell(usize),
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::BadLength(n) => write!(f, "board string has {n} chars, expected 48"),
            WireError::BadCoordinate(c) => write!(f, "bad coordinate digit '{c}'"),
            WireError::BadColor(c) => write!(f, "bad color code '{c}'"),
            WireError::DuplicateCell(cell) => write!(f, "two pieces on cell {cell}"),
        }
    }
}

impl std::error::Error for WireError {}

/// History entry for O(1) undo.
#[derive(Debug, Clone, Copy)]
struct Undo {
    mv: Move,
    captured: Option<u8>,
    escape: bool,
}

/// A snapshot of the game: board, piece table, turn, and history.
///
/// Branching (search, rollouts) clones the whole state; clones are small and
/// fixed-size, and a state is never aliased between search contexts.
#[derive(Clone)]
pub struct GameState {
    /// Signed color code per cell (0 = empty).
    board: [i8; CELLS],
    /// Piece id per cell.
    piece_at: [Option<u8>; CELLS],
    /// Cell per piece; `None` once captured.
    pos: [Option<u8>; TOTAL_PIECES],
    /// True color code per piece (may be +-UNKNOWN when synced from the wire).
    color: [i8; TOTAL_PIECES],
    /// Fog of war: true once the piece's color is public.
    revealed: [bool; TOTAL_PIECES],
    /// Survivor counts: [own red, own blue, enemy red, enemy blue].
    counts: [u8; 4],
    turn: Player,
    /// Set when an escape move ended the game.
    escape_winner: Option<Player>,
    plies: usize,
    history: Vec<Undo>,
}

impl GameState {
    /// Standard starting position with explicit red assignments per side.
    ///
    /// `own_reds` and `enemy_reds` are piece indices 0..8 within each side.
    /// All pieces of the constructing side are revealed; the opponent's are
    /// not, but their true colors are kept for self-play and testing.
    pub fn with_reds(own_reds: [u8; 4], enemy_reds: [u8; 4]) -> Self {
        let mut s = GameState {
            board: [0; CELLS],
            piece_at: [None; CELLS],
            pos: [None; TOTAL_PIECES],
            color: [0; TOTAL_PIECES],
            revealed: [false; TOTAL_PIECES],
            counts: [PIECES_PER_COLOR; 4],
            turn: Player::User,
            escape_winner: None,
            plies: 0,
            history: Vec::with_capacity(MAX_PLIES),
        };
        for i in 0..PIECES {
            s.color[i] = BLUE;
            s.color[i + PIECES] = -BLUE;
            s.revealed[i] = true;
        }
        for &r in &own_reds {
            s.color[r as usize] = RED;
        }
        for &r in &enemy_reds {
            s.color[r as usize + PIECES] = -RED;
        }
        for (side, cells) in INIT_POS.iter().enumerate() {
            for (i, &cell) in cells.iter().enumerate() {
                let piece = (side * PIECES + i) as u8;
                s.board[cell] = s.color[piece as usize];
                s.piece_at[cell] = Some(piece);
                s.pos[piece as usize] = Some(cell as u8);
            }
        }
        s
    }

    /// Starting position with both sides' reds drawn uniformly at random.
    pub fn random_setup(rng: &mut fastrand::Rng) -> Self {
        Self::with_reds(random_reds(rng), random_reds(rng))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    #[inline]
    pub fn side_to_move(&self) -> Player {
        self.turn
    }

    #[inline]
    pub fn plies(&self) -> usize {
        self.plies
    }

    #[inline]
    pub fn cell_code(&self, cell: Cell) -> i8 {
        self.board[cell]
    }

    #[inline]
    pub fn piece_at(&self, cell: Cell) -> Option<u8> {
        self.piece_at[cell]
    }

    #[inline]
    pub fn piece_pos(&self, piece: u8) -> Option<Cell> {
        self.pos[piece as usize].map(|c| c as Cell)
    }

    #[inline]
    pub fn piece_color(&self, piece: u8) -> i8 {
        self.color[piece as usize]
    }

    #[inline]
    pub fn is_revealed(&self, piece: u8) -> bool {
        self.revealed[piece as usize]
    }

    /// Survivor counts: [own red, own blue, enemy red, enemy blue].
    /// Pieces whose color is unknown are not counted down on capture.
    #[inline]
    pub fn survivors(&self) -> [u8; 4] {
        self.counts
    }

    /// Reassign a piece's color without touching the board or counts.
    ///
    /// Used by determinization to give still-unrevealed opponent pieces a
    /// concrete color, and by the evaluator to mask colors it must not see.
    pub fn set_piece_color(&mut self, piece: u8, code: i8) {
        self.color[piece as usize] = code;
        if let Some(cell) = self.pos[piece as usize] {
            self.board[cell as usize] = code;
        }
    }

    /// Copy of the full color table, for save/restore around masking.
    pub fn colors(&self) -> [i8; TOTAL_PIECES] {
        self.color
    }

    /// Restore a color table previously taken with [`GameState::colors`].
    pub fn restore_colors(&mut self, colors: [i8; TOTAL_PIECES]) {
        for piece in 0..TOTAL_PIECES as u8 {
            self.set_piece_color(piece, colors[piece as usize]);
        }
    }

    /// Terminal result, if any.
    pub fn outcome(&self) -> Option<Outcome> {
        if let Some(winner) = self.escape_winner {
            return Some(Outcome::Win(winner));
        }
        // A side wins when all of its reds are gone (the opponent captured
        // only bad ghosts) or all of the opponent's blues are gone.
        if self.counts[0] == 0 || self.counts[3] == 0 {
            return Some(Outcome::Win(Player::User));
        }
        if self.counts[1] == 0 || self.counts[2] == 0 {
            return Some(Outcome::Win(Player::Enemy));
        }
        if self.plies >= MAX_PLIES {
            return Some(Outcome::Draw);
        }
        None
    }

    #[inline]
    pub fn is_over(&self) -> bool {
        self.outcome().is_some()
    }

    // =========================================================================
    // Move Generation
    // =========================================================================

    /// All legal moves for the side to move.
    ///
    /// An empty result at a non-terminal state is a distinguished condition
    /// the searches report as "no move"; it is never converted into an
    /// arbitrary move here.
    pub fn legal_moves(&self) -> Vec<Move> {
        let mut moves = Vec::with_capacity(TOTAL_PIECES * 2);
        let offset = match self.turn {
            Player::User => 0,
            Player::Enemy => PIECES,
        };
        for i in 0..PIECES {
            let piece = (offset + i) as u8;
            if let Some(cell) = self.pos[piece as usize] {
                self.piece_moves(piece, cell as Cell, &mut moves);
            }
        }
        moves
    }

    fn piece_moves(&self, piece: u8, cell: Cell, out: &mut Vec<Move>) {
        let row = cell / COLS;
        let col = cell % COLS;
        let sign = self.turn.sign();

        // A destination is blocked only by a same-side piece; captures of
        // opposite-signed pieces are resolved in apply().
        let mut push = |dir: Direction, dst: Cell| {
            if self.board[dst] * sign <= 0 {
                out.push(Move { piece, dir });
            }
        };
        if row != 0 {
            push(Direction::North, cell - COLS);
        }
        if row != ROWS - 1 {
            push(Direction::South, cell + COLS);
        }
        if col != 0 {
            push(Direction::West, cell - 1);
        }
        if col != COLS - 1 {
            push(Direction::East, cell + 1);
        }

        // Escape moves: a blue piece on its own home-exit corner may step
        // off the board, ending the game.
        if self.color[piece as usize] == BLUE * sign {
            let [left, right] = match self.turn {
                Player::User => USER_EXITS,
                Player::Enemy => ENEMY_EXITS,
            };
            if cell == left {
                out.push(Move {
                    piece,
                    dir: Direction::West,
                });
            } else if cell == right {
                out.push(Move {
                    piece,
                    dir: Direction::East,
                });
            }
        }
    }

    /// Whether this move is an escape for the side to move.
    pub fn is_escape(&self, mv: Move) -> bool {
        let sign = self.turn.sign();
        if self.color[mv.piece as usize] != BLUE * sign {
            return false;
        }
        let Some(cell) = self.pos[mv.piece as usize] else {
            return false;
        };
        let [left, right] = match self.turn {
            Player::User => USER_EXITS,
            Player::Enemy => ENEMY_EXITS,
        };
        (cell as Cell == left && mv.dir == Direction::West)
            || (cell as Cell == right && mv.dir == Direction::East)
    }

    // =========================================================================
    // Apply / Undo
    // =========================================================================

    /// Execute a move, resolving captures and checking the escape win.
    pub fn apply(&mut self, mv: Move) -> Result<(), RulesError> {
        let piece = mv.piece as usize;
        let Some(src) = self.pos[piece] else {
            return Err(RulesError::MissingPiece(mv.piece));
        };
        let src = src as Cell;

        // Escape ends the game immediately; the board does not change.
        if self.is_escape(mv) {
            self.escape_winner = Some(self.turn);
            self.plies += 1;
            self.history.push(Undo {
                mv,
                captured: None,
                escape: true,
            });
            self.turn = self.turn.opponent();
            return Ok(());
        }

        if self.plies >= MAX_PLIES {
            return Err(RulesError::PlyCapExceeded);
        }

        let dst = (src as isize + mv.dir.offset()) as Cell;
        let sign = self.turn.sign();

        let captured = match self.piece_at[dst] {
            Some(target) => {
                let code = self.board[dst];
                if code * sign > 0 {
                    return Err(RulesError::InconsistentCapture { cell: dst, code });
                }
                self.pos[target as usize] = None;
                self.revealed[target as usize] = true;
                self.bump_count(target, -1);
                Some(target)
            }
            None => None,
        };

        self.board[src] = 0;
        self.piece_at[src] = None;
        self.board[dst] = self.color[piece];
        self.piece_at[dst] = Some(mv.piece);
        self.pos[piece] = Some(dst as u8);

        self.plies += 1;
        self.history.push(Undo {
            mv,
            captured,
            escape: false,
        });
        self.turn = self.turn.opponent();
        Ok(())
    }

    /// Reverse exactly one `apply` in O(1).
    ///
    /// After an escape only the win flag is cleared, since the escape left
    /// the board untouched.
    pub fn undo(&mut self) -> Result<(), RulesError> {
        let Some(entry) = self.history.pop() else {
            return Err(RulesError::EmptyHistory);
        };
        self.turn = self.turn.opponent();
        self.plies -= 1;

        if entry.escape {
            self.escape_winner = None;
            return Ok(());
        }

        let piece = entry.mv.piece as usize;
        // pos[piece] is the destination the move reached.
        let dst = self.pos[piece].map(|c| c as Cell).unwrap_or_default();
        let src = (dst as isize - entry.mv.dir.offset()) as Cell;

        match entry.captured {
            Some(target) => {
                self.board[dst] = self.color[target as usize];
                self.piece_at[dst] = Some(target);
                self.pos[target as usize] = Some(dst as u8);
                self.bump_count(target, 1);
            }
            None => {
                self.board[dst] = 0;
                self.piece_at[dst] = None;
            }
        }

        self.board[src] = self.color[piece];
        self.piece_at[src] = Some(entry.mv.piece);
        self.pos[piece] = Some(src as u8);
        Ok(())
    }

    /// Adjust the survivor count for a captured/restored piece. Pieces whose
    /// color is still unknown do not move any counter.
    fn bump_count(&mut self, piece: u8, delta: i8) {
        let idx = match self.color[piece as usize] {
            RED => 0,
            BLUE => 1,
            c if c == -RED => 2,
            c if c == -BLUE => 3,
            _ => return, // unknown color
        };
        self.counts[idx] = (self.counts[idx] as i8 + delta) as u8;
    }

    // =========================================================================
    // Wire Synchronization
    // =========================================================================

    /// Rebuild the whole state from the server's 48-character board string:
    /// 16 pieces, 3 chars each (column digit, row digit, color code).
    /// `99` marks a captured piece; own colors are `R`/`B`, opponent colors
    /// `u` while hidden and `r`/`b` once revealed. The first player is
    /// always on move after a sync.
    pub fn sync_from_wire(&mut self, s: &str) -> Result<(), WireError> {
        let bytes = s.as_bytes();
        if bytes.len() != TOTAL_PIECES * 3 {
            return Err(WireError::BadLength(bytes.len()));
        }

        self.board = [0; CELLS];
        self.piece_at = [None; CELLS];
        self.pos = [None; TOTAL_PIECES];
        self.revealed = [false; TOTAL_PIECES];
        self.counts = [PIECES_PER_COLOR; 4];
        self.turn = Player::User;
        self.escape_winner = None;
        self.plies = 0;
        self.history.clear();

        for i in 0..TOTAL_PIECES {
            let x = bytes[i * 3];
            let y = bytes[i * 3 + 1];
            let c = bytes[i * 3 + 2] as char;
            let own = i < PIECES;

            if x == b'9' && y == b'9' {
                // Captured: the true color is always disclosed (lowercase).
                self.revealed[i] = true;
                let (code, slot) = match (c, own) {
                    ('r', true) => (RED, 0),
                    ('b', true) => (BLUE, 1),
                    ('r', false) => (-RED, 2),
                    ('b', false) => (-BLUE, 3),
                    _ => return Err(WireError::BadColor(c)),
                };
                self.color[i] = code;
                self.counts[slot] = self.counts[slot].saturating_sub(1);
                continue;
            }

            if !x.is_ascii_digit() || (x - b'0') as usize >= COLS {
                return Err(WireError::BadCoordinate(x as char));
            }
            if !y.is_ascii_digit() || (y - b'0') as usize >= ROWS {
                return Err(WireError::BadCoordinate(y as char));
            }
            let cell = (x - b'0') as usize + (y - b'0') as usize * COLS;
            if self.piece_at[cell].is_some() {
                return Err(WireError::DuplicateCell(cell));
            }

            self.color[i] = match (c, own) {
                ('R', true) => RED,
                ('B', true) => BLUE,
                ('u', false) => -UNKNOWN,
                ('r', false) => -RED,
                ('b', false) => -BLUE,
                _ => return Err(WireError::BadColor(c)),
            };
            self.revealed[i] = own || c != 'u';
            self.board[cell] = self.color[i];
            self.piece_at[cell] = Some(i as u8);
            self.pos[i] = Some(cell as u8);
        }
        Ok(())
    }
}

impl fmt::Display for GameState {
    /// Debug rendering: piece letters on a 6x6 grid, `<`/`>` marking the
    /// exit corners.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for cell in 0..CELLS {
            match self.piece_at[cell] {
                Some(p) => write!(f, "{:>4}", piece_label(p))?,
                None if cell == USER_EXITS[0] || cell == ENEMY_EXITS[0] => write!(f, "{:>4}", '<')?,
                None if cell == USER_EXITS[1] || cell == ENEMY_EXITS[1] => write!(f, "{:>4}", '>')?,
                None => write!(f, "{:>4}", '-')?,
            }
            if cell % COLS == COLS - 1 {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Letter label for a piece id: `A`-`H` for the first player, `a`-`h` for
/// the second.
pub fn piece_label(piece: u8) -> char {
    if (piece as usize) < PIECES {
        (b'A' + piece) as char
    } else {
        (b'a' + piece - PIECES as u8) as char
    }
}

/// Inverse of [`piece_label`].
pub fn label_piece(label: char) -> Option<u8> {
    match label {
        'A'..='H' => Some(label as u8 - b'A'),
        'a'..='h' => Some(label as u8 - b'a' + PIECES as u8),
        _ => None,
    }
}

/// Draw 4 distinct piece indices in 0..8.
pub fn random_reds(rng: &mut fastrand::Rng) -> [u8; 4] {
    let mut ids: [u8; PIECES] = std::array::from_fn(|i| i as u8);
    rng.shuffle(&mut ids);
    [ids[0], ids[1], ids[2], ids[3]]
}
