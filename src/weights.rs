//! N-tuple weight tables and their CSV persistence.
//!
//! Weights are win/visit counters over 4-cell pattern features, trained
//! offline. At play time the tables are read-only; this module owns the
//! template enumeration (which 4-cell windows exist and their 1-based ids,
//! the numbering the weight files are keyed by) and the load/save format.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::constants::*;
use crate::state::Player;

/// The three 4-cell window shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// 1x4 horizontal run, base column <= 2.
    Row,
    /// 4x1 vertical run, base row <= 2.
    Column,
    /// 2x2 block, base row <= 4 and base column <= 4.
    Block,
}

/// One concrete placement of a shape on the board.
#[derive(Debug, Clone, Copy)]
pub struct Template {
    /// 1-based id; the key used by the weight files.
    pub id: u16,
    pub shape: Shape,
    /// The four covered cells, in feature-digit order.
    pub cells: [usize; 4],
}

/// Which specialized table to read, picked from survival counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regime {
    /// The general tables.
    Normal,
    /// Opponent down to at most one red: captures become near-safe.
    RedOne,
    /// Own side down to at most one blue: one more loss ends the game.
    BlueOne,
}

impl Regime {
    const ALL: [Regime; 3] = [Regime::Normal, Regime::RedOne, Regime::BlueOne];

    /// Directory holding this regime's weight files. The space in the
    /// specialized names is part of the trained data layout.
    fn dir(self) -> &'static str {
        match self {
            Regime::Normal => "data",
            Regime::RedOne => "data R1",
            Regime::BlueOne => "data B1",
        }
    }

    fn index(self) -> usize {
        match self {
            Regime::Normal => 0,
            Regime::RedOne => 1,
            Regime::BlueOne => 2,
        }
    }
}

/// One win/visit/rate table covering all templates and features.
#[derive(Clone)]
struct Table {
    wins: Vec<u64>,
    visits: Vec<u64>,
    rates: Vec<f32>,
}

impl Table {
    fn untrained() -> Self {
        let n = TUPLE_NUM * FEATURE_NUM;
        Table {
            wins: vec![DEFAULT_WIN; n],
            visits: vec![DEFAULT_VISIT; n],
            rates: vec![DEFAULT_RATE; n],
        }
    }
}

/// Flat index for a (template id, feature) pair.
#[inline]
fn flat(template_id: u16, feature: usize) -> usize {
    (template_id as usize - 1) * FEATURE_NUM + feature
}

/// All weight tables: per evaluating side, per regime, plus the template
/// enumeration shared by the evaluator.
pub struct WeightStore {
    /// Indexed [side][regime]; side 0 = User, 1 = Enemy.
    tables: [[Table; 3]; 2],
    templates: Vec<Template>,
}

impl WeightStore {
    /// Untrained store: every entry at the 1/2 default.
    pub fn new() -> Self {
        let t = || {
            [
                Table::untrained(),
                Table::untrained(),
                Table::untrained(),
            ]
        };
        WeightStore {
            tables: [t(), t()],
            templates: enumerate_templates(),
        }
    }

    /// Every valid (shape, base) placement, in id order 1..=61.
    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    /// Trained win rate for a feature, from one side's perspective.
    #[inline]
    pub fn rate(&self, side: Player, regime: Regime, template_id: u16, feature: usize) -> f32 {
        self.table(side, regime).rates[flat(template_id, feature)]
    }

    fn table(&self, side: Player, regime: Regime) -> &Table {
        &self.tables[side_index(side)][regime.index()]
    }

    fn table_mut(&mut self, side: Player, regime: Regime) -> &mut Table {
        &mut self.tables[side_index(side)][regime.index()]
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Load all six tables (two sides, three regimes) for one training run.
    ///
    /// `root` contains the `data`, `data R1`, and `data B1` directories.
    /// A missing file is a recoverable "untrained" condition: the defaults
    /// are kept and an empty placeholder file is written so a later `save`
    /// has somewhere to go.
    pub fn load(&mut self, root: &Path, run: u32) -> Result<()> {
        for regime in Regime::ALL {
            for side in [Player::User, Player::Enemy] {
                let path = table_path(root, regime, side, run);
                if !path.exists() {
                    eprintln!("weights: {} missing, starting untrained", path.display());
                    write_placeholder(&path)?;
                    continue;
                }
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let table = self.table_mut(side, regime);
                parse_table(&text, table)
                    .with_context(|| format!("parsing {}", path.display()))?;
            }
        }
        Ok(())
    }

    /// Write all six tables for one run, recomputing each stored rate from
    /// its counters.
    pub fn save(&self, root: &Path, run: u32) -> Result<()> {
        for regime in Regime::ALL {
            for side in [Player::User, Player::Enemy] {
                let path = table_path(root, regime, side, run);
                if let Some(dir) = path.parent() {
                    fs::create_dir_all(dir)
                        .with_context(|| format!("creating {}", dir.display()))?;
                }
                let table = self.table(side, regime);
                let mut out = String::with_capacity(TUPLE_NUM * FEATURE_NUM * 16);
                out.push_str("location,feature,LUTw,LUTv,4-tuple win rate\n");
                for id in 1..=TUPLE_NUM as u16 {
                    for feature in 0..FEATURE_NUM {
                        let i = flat(id, feature);
                        let rate = table.wins[i] as f32 / table.visits[i] as f32;
                        let _ = writeln!(
                            out,
                            "{id},{feature},{},{},{rate}",
                            table.wins[i], table.visits[i]
                        );
                    }
                }
                fs::write(&path, out).with_context(|| format!("writing {}", path.display()))?;
            }
        }
        Ok(())
    }
}

impl Default for WeightStore {
    fn default() -> Self {
        Self::new()
    }
}

fn side_index(side: Player) -> usize {
    match side {
        Player::User => 0,
        Player::Enemy => 1,
    }
}

fn table_path(root: &Path, regime: Regime, side: Player, run: u32) -> PathBuf {
    let prefix = match side {
        Player::User => 'U',
        Player::Enemy => 'E',
    };
    root.join(regime.dir()).join(format!("{prefix}data_{run}.csv"))
}

fn write_placeholder(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    fs::write(path, "location,feature,LUTw,LUTv,4-tuple win rate\n")
        .with_context(|| format!("writing placeholder {}", path.display()))
}

/// Parse `location,feature,LUTw,LUTv,rate` rows into a table in place.
/// Rows are sparse: anything absent keeps its default.
fn parse_table(text: &str, table: &mut Table) -> Result<()> {
    for (lineno, line) in text.lines().enumerate().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split(',');
        let mut next = || {
            fields
                .next()
                .with_context(|| format!("line {}: truncated row", lineno + 1))
        };
        let id: u16 = next()?.trim().parse().context("template id")?;
        let feature: usize = next()?.trim().parse().context("feature")?;
        if id == 0 || id as usize > TUPLE_NUM || feature >= FEATURE_NUM {
            anyhow::bail!("line {}: entry ({id},{feature}) out of range", lineno + 1);
        }
        let i = flat(id, feature);
        table.wins[i] = next()?.trim().parse().context("win count")?;
        table.visits[i] = next()?.trim().parse().context("visit count")?;
        table.rates[i] = next()?.trim().parse().context("win rate")?;
    }
    Ok(())
}

/// Enumerate the 61 placements in the file-format numbering: scan the board
/// row-major and emit, at each base cell, the row window, the column window,
/// then the 2x2 block, whichever fit.
fn enumerate_templates() -> Vec<Template> {
    let mut templates = Vec::with_capacity(TUPLE_NUM);
    let mut id = 0u16;
    for base in 0..CELLS {
        let col = base % COLS;
        if col <= 2 {
            id += 1;
            templates.push(Template {
                id,
                shape: Shape::Row,
                cells: [base, base + 1, base + 2, base + 3],
            });
        }
        if base < 3 * COLS {
            id += 1;
            templates.push(Template {
                id,
                shape: Shape::Column,
                cells: [base, base + COLS, base + 2 * COLS, base + 3 * COLS],
            });
        }
        if col <= 4 && base < 5 * COLS {
            id += 1;
            templates.push(Template {
                id,
                shape: Shape::Block,
                cells: [base, base + 1, base + COLS, base + COLS + 1],
            });
        }
    }
    debug_assert_eq!(templates.len(), TUPLE_NUM);
    templates
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_census() {
        let store = WeightStore::new();
        let templates = store.templates();
        assert_eq!(templates.len(), TUPLE_NUM);

        let count = |s: Shape| templates.iter().filter(|t| t.shape == s).count();
        assert_eq!(count(Shape::Row), 18);
        assert_eq!(count(Shape::Column), 18);
        assert_eq!(count(Shape::Block), 25);

        // Ids are 1..=61 in order, every covered cell on the board.
        for (i, t) in templates.iter().enumerate() {
            assert_eq!(t.id as usize, i + 1);
            for &c in &t.cells {
                assert!(c < CELLS);
            }
        }
    }

    #[test]
    fn test_template_numbering_interleaves_shapes() {
        // Base cell 0 fits all three shapes: row=1, column=2, block=3.
        let store = WeightStore::new();
        let t = store.templates();
        assert_eq!(t[0].shape, Shape::Row);
        assert_eq!(t[1].shape, Shape::Column);
        assert_eq!(t[2].shape, Shape::Block);
        assert_eq!(t[0].cells, [0, 1, 2, 3]);
        assert_eq!(t[1].cells, [0, 6, 12, 18]);
        assert_eq!(t[2].cells, [0, 1, 6, 7]);
    }

    #[test]
    fn test_untrained_defaults() {
        let store = WeightStore::new();
        assert_eq!(store.rate(Player::User, Regime::Normal, 1, 0), 0.5);
        assert_eq!(store.rate(Player::Enemy, Regime::BlueOne, 61, 255), 0.5);
    }

    #[test]
    fn test_parse_table_rows() {
        let mut table = Table::untrained();
        let text = "location,feature,LUTw,LUTv,4-tuple win rate\n\
                    1,0,10,20,0.5\n\
                    61,255,3,4,0.75\n";
        parse_table(text, &mut table).unwrap();
        assert_eq!(table.wins[flat(1, 0)], 10);
        assert_eq!(table.rates[flat(61, 255)], 0.75);
        // Untouched entries keep their defaults.
        assert_eq!(table.rates[flat(2, 0)], 0.5);
    }

    #[test]
    fn test_parse_table_rejects_out_of_range() {
        let mut table = Table::untrained();
        let text = "header\n62,0,1,2,0.5\n";
        assert!(parse_table(text, &mut table).is_err());
        let text = "header\n1,256,1,2,0.5\n";
        assert!(parse_table(text, &mut table).is_err());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let root = std::env::temp_dir().join(format!("ntuple-weights-{}", std::process::id()));
        let _ = fs::remove_dir_all(&root);

        let store = WeightStore::new();
        store.save(&root, 3).unwrap();

        let mut reloaded = WeightStore::new();
        reloaded.load(&root, 3).unwrap();
        assert_eq!(reloaded.rate(Player::User, Regime::Normal, 30, 100), 0.5);

        // A run with no files loads as untrained and drops placeholders.
        let mut fresh = WeightStore::new();
        fresh.load(&root, 99).unwrap();
        assert_eq!(fresh.rate(Player::Enemy, Regime::RedOne, 1, 1), 0.5);
        assert!(root.join("data").join("Udata_99.csv").exists());

        let _ = fs::remove_dir_all(&root);
    }
}
