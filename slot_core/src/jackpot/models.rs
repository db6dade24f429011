//! Jackpot pool models.

use crate::wallet::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Basis-point denominator for contribution rates
pub const BPS_DENOMINATOR: i64 = 10_000;

/// Pool identity: one pool per `(game_id, jackpot_type)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub game_id: String,
    pub jackpot_type: String,
}

impl PoolKey {
    pub fn new(game_id: impl Into<String>, jackpot_type: impl Into<String>) -> Self {
        Self {
            game_id: game_id.into(),
            jackpot_type: jackpot_type.into(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.game_id, self.jackpot_type)
    }
}

/// Settings a pool is seeded from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JackpotConfig {
    pub jackpot_type: String,
    /// Share of every bet added to the pool, in basis points
    pub percentage_bps: u32,
    pub min_amount: i64,
    pub max_amount: i64,
    pub win_probability: f64,
}

impl Default for JackpotConfig {
    fn default() -> Self {
        Self {
            jackpot_type: "grand".to_string(),
            percentage_bps: 100,
            min_amount: 10_000,
            max_amount: 10_000_000,
            win_probability: 0.0005,
        }
    }
}

impl JackpotConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.jackpot_type.is_empty() {
            return Err("jackpot_type must not be empty".to_string());
        }
        if self.percentage_bps > 10_000 {
            return Err("percentage_bps must be at most 10000".to_string());
        }
        if self.min_amount < 0 {
            return Err("min_amount must be non-negative".to_string());
        }
        if self.max_amount < self.min_amount {
            return Err(format!(
                "max_amount ({}) must be >= min_amount ({})",
                self.max_amount, self.min_amount
            ));
        }
        if !(0.0..=1.0).contains(&self.win_probability) {
            return Err("win_probability must be within [0, 1]".to_string());
        }
        Ok(())
    }
}

/// Accumulating prize pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JackpotPool {
    pub key: PoolKey,
    pub amount: i64,
    pub min_amount: i64,
    pub max_amount: i64,
    pub percentage_bps: u32,
    pub win_probability: f64,
    pub win_count: u64,
    pub total_in: i64,
    pub total_out: i64,
    pub last_won_at: Option<DateTime<Utc>>,
    pub last_winner: Option<UserId>,
}

impl JackpotPool {
    /// New pool holding its minimum amount
    pub fn new(game_id: &str, config: &JackpotConfig) -> Self {
        Self {
            key: PoolKey::new(game_id, config.jackpot_type.clone()),
            amount: config.min_amount,
            min_amount: config.min_amount,
            max_amount: config.max_amount,
            percentage_bps: config.percentage_bps,
            win_probability: config.win_probability,
            win_count: 0,
            total_in: 0,
            total_out: 0,
            last_won_at: None,
            last_winner: None,
        }
    }

    /// Contribution owed for one bet, before capping
    pub fn contribution_for(&self, bet_amount: i64) -> i64 {
        let raw = i128::from(bet_amount.max(0)) * i128::from(self.percentage_bps)
            / i128::from(BPS_DENOMINATOR);
        i64::try_from(raw).unwrap_or(i64::MAX)
    }

    /// Only pools at or above their minimum can pay out
    pub fn is_eligible(&self) -> bool {
        self.amount >= self.min_amount && self.amount > 0
    }
}

/// Amount one bet added to a pool, tagged with the pool's claim count at
/// that moment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Contribution {
    pub amount: i64,
    pub win_count: u64,
}

/// A claimed jackpot, credited in the same ledger unit as the spin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JackpotWin {
    pub pool: PoolKey,
    pub amount: i64,
    pub user_id: UserId,
    pub session_id: String,
    pub won_at: DateTime<Utc>,
    /// Previous `(last_won_at, last_winner)` of the pool, kept for `restore`
    #[serde(skip)]
    pub(crate) previous: Option<(Option<DateTime<Utc>>, Option<UserId>)>,
}

/// Payout history row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JackpotWinRecord {
    pub pool: PoolKey,
    pub user_id: UserId,
    pub session_id: String,
    pub amount: i64,
    pub won_at: DateTime<Utc>,
}
