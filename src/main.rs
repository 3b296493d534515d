//! Geister-Rust: hidden-piece board game engine.
//!
//! ## Usage
//!
//! - `geister-rust protocol` - talk the game-server protocol on stdin/stdout
//! - `geister-rust demo` - watch a quick self-play game

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use geister_rust::constants::N_SIMS;
use geister_rust::eval::SelectionRule;
use geister_rust::protocol::Engine;
use geister_rust::state::{GameState, Outcome, Player};
use geister_rust::weights::WeightStore;
use geister_rust::{ismcts, mcts};

/// Geister-style hidden-piece game engine
#[derive(Parser)]
#[command(name = "geister-rust")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve moves over the line protocol for use with the game server
    Protocol {
        /// Search iterations per move decision
        #[arg(long, default_value_t = N_SIMS)]
        sims: usize,
        /// Training run whose weight tables to load
        #[arg(long, default_value_t = 500_000)]
        run: u32,
        /// Directory containing the weight data directories
        #[arg(long, default_value = ".")]
        data_root: PathBuf,
        /// Seed for the engine RNG (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Run a self-play demo game
    Demo {
        /// Search iterations per move decision
        #[arg(long, default_value_t = 400)]
        sims: usize,
        /// Seed for the demo RNG (random when omitted)
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Protocol {
            sims,
            run,
            data_root,
            seed,
        }) => {
            let mut store = WeightStore::new();
            store.load(&data_root, run)?;
            let mut engine = Engine::with_iterations(store, sims);
            if let Some(seed) = seed {
                engine.seed(seed);
            }
            engine.run()
        }
        Some(Commands::Demo { sims, seed }) => run_demo(sims, seed),
        None => run_demo(400, None),
    }
}

fn run_demo(sims: usize, seed: Option<u64>) -> Result<()> {
    let mut rng = match seed {
        Some(s) => fastrand::Rng::with_seed(s),
        None => fastrand::Rng::new(),
    };
    let store = WeightStore::new();
    let mut state = GameState::random_setup(&mut rng);

    println!("Geister-Rust self-play: information-set search (first player)");
    println!("vs perfect-information search (second player), {sims} sims each\n");
    println!("{state}");

    while !state.is_over() {
        let mv = match state.side_to_move() {
            Player::User => {
                ismcts::search(&state, &store, sims, SelectionRule::default(), &mut rng)
            }
            Player::Enemy => mcts::search(&state, sims, &mut rng),
        };
        let Some(mv) = mv else {
            eprintln!("no legal move at ply {}", state.plies());
            break;
        };
        state.apply(mv)?;
        println!(
            "ply {}: {}{}",
            state.plies(),
            geister_rust::state::piece_label(mv.piece),
            mv.dir.name()
        );
        println!("{state}");
    }

    match state.outcome() {
        Some(Outcome::Win(Player::User)) => println!("first player wins"),
        Some(Outcome::Win(Player::Enemy)) => println!("second player wins"),
        Some(Outcome::Draw) => println!("draw at the ply cap"),
        None => println!("stopped without a result"),
    }
    Ok(())
}
