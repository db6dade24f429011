//! Session engine configuration.

use super::errors::SessionError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for `batch_spin`
pub const MAX_BATCH_SPINS: u32 = 100;

/// Session engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Game every session plays
    pub game_id: String,

    /// Jackpot pool fed by this game's bets
    pub jackpot_type: String,

    /// Smallest accepted bet (minor units)
    pub min_bet: i64,

    /// Largest accepted bet (minor units)
    pub max_bet: i64,

    /// Maximum concurrently live sessions
    pub max_sessions: usize,

    /// Idle time after which an active session expires
    pub session_timeout_secs: u64,

    /// How often the sweeper scans for idle sessions
    pub sweep_interval_secs: u64,

    /// Per-session inbox capacity
    pub inbox_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            game_id: "classic".to_string(),
            jackpot_type: "grand".to_string(),
            min_bet: 10,
            max_bet: 100_000,
            max_sessions: 1_000,
            session_timeout_secs: 1_800,
            sweep_interval_secs: 30,
            inbox_capacity: 32,
        }
    }
}

impl SessionConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reject bets outside `[min_bet, max_bet]`
    pub fn check_bet(&self, bet_amount: i64) -> Result<(), SessionError> {
        if bet_amount < self.min_bet || bet_amount > self.max_bet {
            return Err(SessionError::InvalidBetRange {
                bet: bet_amount,
                min: self.min_bet,
                max: self.max_bet,
            });
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.game_id.is_empty() {
            return Err("game_id must not be empty".to_string());
        }
        if self.min_bet <= 0 {
            return Err("min_bet must be positive".to_string());
        }
        if self.max_bet < self.min_bet {
            return Err(format!(
                "max_bet ({}) must be >= min_bet ({})",
                self.max_bet, self.min_bet
            ));
        }
        if self.max_sessions == 0 {
            return Err("max_sessions must be at least 1".to_string());
        }
        if self.session_timeout_secs == 0 || self.sweep_interval_secs == 0 {
            return Err("session timeout and sweep interval must be positive".to_string());
        }
        if self.inbox_capacity == 0 {
            return Err("inbox_capacity must be at least 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_bet_range_is_inclusive() {
        let config = SessionConfig::default();
        assert!(config.check_bet(10).is_ok());
        assert!(config.check_bet(100_000).is_ok());
        assert!(matches!(
            config.check_bet(9),
            Err(SessionError::InvalidBetRange { bet: 9, .. })
        ));
        assert!(config.check_bet(100_001).is_err());
    }

    #[test]
    fn test_inverted_bet_range_invalid() {
        let config = SessionConfig {
            min_bet: 500,
            max_bet: 100,
            ..SessionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
