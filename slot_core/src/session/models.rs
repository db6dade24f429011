//! Session data models.

use crate::{paytable::SpinOutcome, wallet::{Balance, UserId}};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type SessionId = String;

/// Longest accepted session id
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Session lifecycle: `Created -> Active -> Settled`, or `Expired` on timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Created,
    Active,
    Settled,
    Expired,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Settled | SessionState::Expired)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Created => write!(f, "created"),
            SessionState::Active => write!(f, "active"),
            SessionState::Settled => write!(f, "settled"),
            SessionState::Expired => write!(f, "expired"),
        }
    }
}

/// One player's run of spins between start and settle
#[derive(Debug, Clone, PartialEq)]
pub struct GameSession {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub game_id: String,
    pub bet_amount: i64,
    pub state: SessionState,
    pub spin_count: u32,
    pub total_bet: i64,
    pub total_win: i64,
    pub jackpot_win: i64,
    /// The opening debit has not been consumed by a spin yet
    pub bet_prepaid: bool,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub last_result: Option<SpinOutcome>,
}

impl GameSession {
    pub fn new(session_id: SessionId, user_id: UserId, game_id: String, bet_amount: i64) -> Self {
        let now = Utc::now();
        Self {
            session_id,
            user_id,
            game_id,
            bet_amount,
            state: SessionState::Created,
            spin_count: 0,
            total_bet: 0,
            total_win: 0,
            jackpot_win: 0,
            bet_prepaid: false,
            started_at: now,
            last_activity_at: now,
            last_result: None,
        }
    }

    /// `total_win / total_bet`, 0 before the first bet
    pub fn rtp(&self) -> f64 {
        if self.total_bet == 0 {
            0.0
        } else {
            self.total_win as f64 / self.total_bet as f64
        }
    }

    /// Active and untouched for longer than `timeout`
    pub fn is_idle(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        self.state == SessionState::Active && now - self.last_activity_at > timeout
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id.clone(),
            user_id: self.user_id,
            game_id: self.game_id.clone(),
            bet_amount: self.bet_amount,
            state: self.state,
            spin_count: self.spin_count,
            total_bet: self.total_bet,
            total_win: self.total_win,
            jackpot_win: self.jackpot_win,
            rtp: self.rtp(),
            bet_prepaid: self.bet_prepaid,
            started_at: self.started_at,
            last_activity_at: self.last_activity_at,
            last_result: self.last_result.clone(),
        }
    }
}

/// Read-only view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub game_id: String,
    pub bet_amount: i64,
    pub state: SessionState,
    pub spin_count: u32,
    pub total_bet: i64,
    pub total_win: i64,
    pub jackpot_win: i64,
    pub rtp: f64,
    pub bet_prepaid: bool,
    pub started_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub last_result: Option<SpinOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGameResult {
    pub balance: Balance,
    pub session: SessionSnapshot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinResult {
    pub outcome: SpinOutcome,
    pub balance: Balance,
    pub state: SessionState,
    pub total_bet: i64,
    pub total_win: i64,
    pub spin_count: u32,
}

/// Caller-supplied conditions that end a batch before its last spin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarlyStopPolicy {
    /// Stop after a single spin wins more than this
    pub big_win_threshold: Option<i64>,
    /// Stop once the batch has won at least this much
    pub max_total_win: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Completed,
    BigWin,
    MaxWinReached,
    InsufficientBalance,
    Error,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::Completed => "completed",
            StopReason::BigWin => "big_win",
            StopReason::MaxWinReached => "max_win_reached",
            StopReason::InsufficientBalance => "insufficient_balance",
            StopReason::Error => "error",
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSpinResult {
    pub total_spins: u32,
    pub total_bet: i64,
    pub total_win: i64,
    pub stopped_early: bool,
    pub stop_reason: StopReason,
    pub state: SessionState,
    pub balance: Balance,
    pub spins: Vec<SpinOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettleResult {
    pub total_bet: i64,
    pub total_win: i64,
    pub balance: Balance,
    pub rtp: f64,
    pub spin_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rtp_zero_without_bets() {
        let session = GameSession::new("s".to_string(), 1, "classic".to_string(), 10);
        assert_eq!(session.rtp(), 0.0);
    }

    #[test]
    fn test_idle_only_when_active() {
        let mut session = GameSession::new("s".to_string(), 1, "classic".to_string(), 10);
        let later = session.last_activity_at + chrono::Duration::seconds(61);
        let timeout = chrono::Duration::seconds(60);

        assert!(!session.is_idle(later, timeout));
        session.state = SessionState::Active;
        assert!(session.is_idle(later, timeout));
        assert!(!session.is_idle(session.last_activity_at, timeout));
    }

    #[test]
    fn test_stop_reason_wire_names() {
        assert_eq!(
            serde_json::to_string(&StopReason::BigWin).unwrap(),
            "\"big_win\""
        );
        assert_eq!(StopReason::MaxWinReached.as_str(), "max_win_reached");
    }
}
