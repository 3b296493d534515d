//! Line-oriented text protocol for talking to the game server.
//!
//! The server speaks a small mixed-delimiter protocol over stdin/stdout:
//! commands arrive one per line, fields separated by commas or spaces
//! depending on the command. Supported commands:
//!
//! - `ini,<game id>,<player num>` - seat assignment; reply with the eight
//!   two-digit starting coordinates for that seat
//! - `SET?` - reply `SET:<4 letters>`, the pieces chosen to be red
//! - `MOV?<48-char board>` - sync the board, search, reply
//!   `MOV:<letter>,<NORTH|WEST|EAST|SOUTH>`
//! - `WON` / `LST` / `DRW` - terminal notices, no reply
//! - `OK` - acknowledge, no reply
//! - `/exit` - terminate the loop
//!
//! Malformed input is reported on stderr and skipped; the loop never
//! panics on server garbage.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};

use crate::constants::{N_SIMS, PIECES};
use crate::eval::SelectionRule;
use crate::ismcts;
use crate::state::{piece_label, GameState, Player};
use crate::weights::WeightStore;

/// Starting coordinates (column digit, row digit per piece) for each seat.
const SEAT_ONE_START: &str = "1424344415253545";
const SEAT_TWO_START: &str = "4131211140302010";

/// Protocol engine: owns the game state, the weight tables, and the search
/// configuration. One instance per connection; nothing global.
pub struct Engine {
    state: GameState,
    store: WeightStore,
    iterations: usize,
    rule: SelectionRule,
    rng: fastrand::Rng,
    seat: Player,
}

/// What `execute` wants the loop to do with a command's result.
enum Reply {
    Send(String),
    Silent,
    Quit,
}

impl Engine {
    pub fn new(store: WeightStore) -> Self {
        Self::with_iterations(store, N_SIMS)
    }

    pub fn with_iterations(store: WeightStore, iterations: usize) -> Self {
        Engine {
            state: GameState::with_reds([0, 1, 2, 3], [0, 1, 2, 3]),
            store,
            iterations,
            rule: SelectionRule::default(),
            rng: fastrand::Rng::new(),
            seat: Player::User,
        }
    }

    /// Seed the internal RNG, for reproducible runs.
    pub fn seed(&mut self, seed: u64) {
        self.rng = fastrand::Rng::with_seed(seed);
    }

    /// Read commands from stdin until `/exit` or end of input, echoing every
    /// reply to stderr as well so a session can be followed from the log.
    pub fn run(&mut self) -> Result<()> {
        let stdin = io::stdin();
        let mut stdout = io::stdout();

        for line in stdin.lock().lines() {
            let line = line.context("reading command")?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match self.execute(line) {
                Reply::Send(text) => {
                    writeln!(stdout, "{text}").context("writing reply")?;
                    stdout.flush().context("flushing reply")?;
                    eprintln!("{text}");
                }
                Reply::Silent => {}
                Reply::Quit => break,
            }
        }
        Ok(())
    }

    /// Dispatch one command line.
    fn execute(&mut self, line: &str) -> Reply {
        // The server mixes comma- and space-delimited commands.
        let fields: Vec<&str> = if line.contains(',') {
            line.split(',').collect()
        } else {
            line.split_whitespace().collect()
        };
        let Some(&head) = fields.first() else {
            return Reply::Silent;
        };

        if let Some(board) = head.strip_prefix("MOV?") {
            return self.cmd_move(board);
        }
        match head {
            "ini" => self.cmd_init(&fields),
            "SET?" => self.cmd_set(),
            "WON" | "LST" | "DRW" | "OK" => Reply::Silent,
            "/exit" => {
                eprintln!("bye");
                Reply::Quit
            }
            other => {
                eprintln!("protocol: unknown command {other:?}, skipped");
                Reply::Silent
            }
        }
    }

    /// `ini,<id>,<playerNum>`: remember the seat and report our starting
    /// piece coordinates.
    fn cmd_init(&mut self, fields: &[&str]) -> Reply {
        let seat = match fields.get(2).copied() {
            Some("1") => Player::User,
            Some("2") => Player::Enemy,
            other => {
                eprintln!("protocol: bad ini player field {other:?}, skipped");
                return Reply::Silent;
            }
        };
        self.seat = seat;

        let layout = match self.seat {
            Player::User => SEAT_ONE_START,
            Player::Enemy => SEAT_TWO_START,
        };
        let coords: Vec<&str> = (0..PIECES).map(|i| &layout[i * 2..i * 2 + 2]).collect();
        Reply::Send(coords.join(" "))
    }

    /// `SET?`: pick four of our pieces, uniformly without replacement, to
    /// be the red ones.
    fn cmd_set(&mut self) -> Reply {
        let mut labels: [u8; PIECES] = std::array::from_fn(|i| b'A' + i as u8);
        self.rng.shuffle(&mut labels);
        let picked: String = labels[..4].iter().map(|&b| b as char).collect();
        Reply::Send(format!("SET:{picked}"))
    }

    /// `MOV?<board>`: sync, search, answer, and apply the move locally.
    fn cmd_move(&mut self, board: &str) -> Reply {
        if let Err(err) = self.state.sync_from_wire(board) {
            eprintln!("protocol: bad board string ({err}), skipped");
            return Reply::Silent;
        }

        let Some(mv) = ismcts::search(
            &self.state,
            &self.store,
            self.iterations,
            self.rule,
            &mut self.rng,
        ) else {
            eprintln!("protocol: no legal move available, skipped");
            return Reply::Silent;
        };

        if let Err(err) = self.state.apply(mv) {
            eprintln!("protocol: chosen move failed to apply ({err}), skipped");
            return Reply::Silent;
        }
        Reply::Send(format!("MOV:{},{}", piece_label(mv.piece), mv.dir.name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(iterations: usize) -> Engine {
        let mut e = Engine::with_iterations(WeightStore::new(), iterations);
        e.seed(99);
        e
    }

    fn text(reply: Reply) -> Option<String> {
        match reply {
            Reply::Send(s) => Some(s),
            _ => None,
        }
    }

    #[test]
    fn test_init_reports_seat_layout() {
        let mut e = engine(10);
        let first = text(e.execute("ini,7,1")).unwrap();
        assert_eq!(first, "14 24 34 44 15 25 35 45");
        let second = text(e.execute("ini,7,2")).unwrap();
        assert_eq!(second, "41 31 21 11 40 30 20 10");
    }

    #[test]
    fn test_set_picks_four_distinct_labels() {
        let mut e = engine(10);
        let reply = text(e.execute("SET?")).unwrap();
        let picked = reply.strip_prefix("SET:").unwrap();
        assert_eq!(picked.len(), 4);
        let mut chars: Vec<char> = picked.chars().collect();
        assert!(chars.iter().all(|c| ('A'..='H').contains(c)));
        chars.sort_unstable();
        chars.dedup();
        assert_eq!(chars.len(), 4);
    }

    #[test]
    fn test_move_replies_with_a_legal_move() {
        let mut e = engine(100);
        let wire = "14B24B34B44B15R25R35R45R41u31u21u11u40u30u20u10u";
        let reply = text(e.execute(&format!("MOV?{wire}"))).unwrap();
        let body = reply.strip_prefix("MOV:").unwrap();
        let (letter, dir) = body.split_once(',').unwrap();
        assert_eq!(letter.len(), 1);
        assert!(('A'..='H').contains(&letter.chars().next().unwrap()));
        assert!(["NORTH", "WEST", "EAST", "SOUTH"].contains(&dir));
    }

    #[test]
    fn test_move_takes_immediate_escape() {
        let mut e = engine(400);
        let wire = "00B24B34B44B15R25R35R45R41u31u21u11u40u30u20u10u";
        let reply = text(e.execute(&format!("MOV?{wire}"))).unwrap();
        assert_eq!(reply, "MOV:A,WEST");
    }

    #[test]
    fn test_notices_and_garbage_are_silent() {
        let mut e = engine(10);
        for line in ["WON", "LST", "DRW", "OK", "what is this", "MOV?short"] {
            assert!(text(e.execute(line)).is_none());
        }
    }
}
