//! Spin outcome policy.
//!
//! The session engine only depends on [`PaytableEvaluator`]; the symbol
//! weights, paylines and jackpot odds live behind it so they can be swapped
//! without touching session or ledger code.

pub mod weighted;

pub use weighted::{SymbolSpec, WeightedPaytable};

use crate::jackpot::{JackpotPool, JackpotWin};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reel symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Symbol {
    Cherry,
    Lemon,
    Orange,
    Plum,
    Bell,
    Bar,
    Seven,
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Symbol::Cherry => "cherry",
            Symbol::Lemon => "lemon",
            Symbol::Orange => "orange",
            Symbol::Plum => "plum",
            Symbol::Bell => "bell",
            Symbol::Bar => "bar",
            Symbol::Seven => "seven",
        };
        f.write_str(name)
    }
}

/// A payline that paid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineWin {
    pub line: usize,
    pub symbol: Symbol,
    pub count: u8,
    pub payout: i64,
}

/// Result of one spin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinOutcome {
    /// `grid[reel][row]`
    pub grid: Vec<Vec<Symbol>>,
    pub lines: Vec<LineWin>,
    pub bet_amount: i64,
    pub win_amount: i64,
    pub jackpot_win: Option<JackpotWin>,
}

impl SpinOutcome {
    /// Line wins plus any jackpot
    pub fn total_win(&self) -> i64 {
        self.win_amount + self.jackpot_win.as_ref().map_or(0, |j| j.amount)
    }
}

#[derive(Debug, Error)]
pub enum PaytableError {
    #[error("Invalid paytable: {0}")]
    Invalid(String),
}

/// Pluggable spin policy.
///
/// `spin` must be memoryless: the outcome depends only on `rng` and `bet`.
/// Implementations leave `jackpot_win` empty; the engine fills it.
pub trait PaytableEvaluator: Send + Sync {
    fn spin(&self, rng: &mut dyn RngCore, bet: i64) -> SpinOutcome;

    /// Probability that an eligible pool pays out on this spin
    fn jackpot_probability(&self, pool: &JackpotPool) -> f64 {
        pool.win_probability
    }
}
