//! Post-session history records written on settle or expiry.
#![allow(clippy::needless_raw_string_hashes)]

use crate::{
    db::timeouts::{TimeoutError, with_default_timeout},
    session::{GameSession, SessionState},
    wallet::UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Row};
use std::{collections::VecDeque, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;

/// Final aggregates of a finished session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameRecord {
    pub session_id: String,
    pub user_id: UserId,
    pub game_id: String,
    pub bet_amount: i64,
    pub spin_count: u32,
    pub total_bet: i64,
    pub total_win: i64,
    pub jackpot_win: i64,
    pub rtp: f64,
    pub final_state: SessionState,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl GameRecord {
    pub fn from_session(session: &GameSession, ended_at: DateTime<Utc>) -> Self {
        Self {
            session_id: session.session_id.clone(),
            user_id: session.user_id,
            game_id: session.game_id.clone(),
            bet_amount: session.bet_amount,
            spin_count: session.spin_count,
            total_bet: session.total_bet,
            total_win: session.total_win,
            jackpot_win: session.jackpot_win,
            rtp: session.rtp(),
            final_state: session.state,
            started_at: session.started_at,
            ended_at,
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database timeout: {0}")]
    Timeout(String),

    #[error("Corrupt history row: {0}")]
    CorruptRow(String),
}

impl HistoryError {
    pub fn code(&self) -> &'static str {
        "INTERNAL_ERROR"
    }

    pub fn client_message(&self) -> String {
        "Internal server error".to_string()
    }
}

impl From<TimeoutError> for HistoryError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Database(e) => HistoryError::Database(e),
            TimeoutError::Timeout(d) => HistoryError::Timeout(format!("{d:?}")),
        }
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Store for finished sessions
#[async_trait]
pub trait SessionHistory: Send + Sync {
    async fn record(&self, record: &GameRecord) -> HistoryResult<()>;

    /// Most recent records for a user, newest first
    async fn list_by_user(&self, user_id: UserId, limit: usize) -> HistoryResult<Vec<GameRecord>>;
}

/// Records an in-memory history keeps before dropping the oldest
pub const MAX_RECORDS: usize = 10_000;

/// Bounded history for runs without a database
#[derive(Debug)]
pub struct InMemorySessionHistory {
    records: RwLock<VecDeque<GameRecord>>,
    limit: usize,
}

impl Default for InMemorySessionHistory {
    fn default() -> Self {
        Self::with_limit(MAX_RECORDS)
    }
}

impl InMemorySessionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// History holding at most `limit` records
    pub fn with_limit(limit: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::new()),
            limit: limit.max(1),
        }
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl SessionHistory for InMemorySessionHistory {
    async fn record(&self, record: &GameRecord) -> HistoryResult<()> {
        let mut records = self.records.write().await;
        records.push_back(record.clone());
        while records.len() > self.limit {
            records.pop_front();
        }
        Ok(())
    }

    async fn list_by_user(&self, user_id: UserId, limit: usize) -> HistoryResult<Vec<GameRecord>> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

/// History in the `game_records` table
#[derive(Clone)]
pub struct PgSessionHistory {
    pool: Arc<PgPool>,
}

impl PgSessionHistory {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

fn parse_state(state: &str) -> HistoryResult<SessionState> {
    match state {
        "settled" => Ok(SessionState::Settled),
        "expired" => Ok(SessionState::Expired),
        "active" => Ok(SessionState::Active),
        "created" => Ok(SessionState::Created),
        other => Err(HistoryError::CorruptRow(format!("unknown state '{other}'"))),
    }
}

#[async_trait]
impl SessionHistory for PgSessionHistory {
    async fn record(&self, record: &GameRecord) -> HistoryResult<()> {
        with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO game_records
                    (session_id, user_id, game_id, bet_amount, spin_count, total_bet,
                     total_win, jackpot_win, rtp, final_state, started_at, ended_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                "#,
            )
            .bind(&record.session_id)
            .bind(record.user_id)
            .bind(&record.game_id)
            .bind(record.bet_amount)
            .bind(i32::try_from(record.spin_count).unwrap_or(i32::MAX))
            .bind(record.total_bet)
            .bind(record.total_win)
            .bind(record.jackpot_win)
            .bind(record.rtp)
            .bind(record.final_state.to_string())
            .bind(record.started_at.naive_utc())
            .bind(record.ended_at.naive_utc())
            .execute(self.pool.as_ref()),
        )
        .await?;
        Ok(())
    }

    async fn list_by_user(&self, user_id: UserId, limit: usize) -> HistoryResult<Vec<GameRecord>> {
        let rows = with_default_timeout(
            sqlx::query(
                r#"
                SELECT session_id, user_id, game_id, bet_amount, spin_count, total_bet,
                       total_win, jackpot_win, rtp, final_state, started_at, ended_at
                FROM game_records
                WHERE user_id = $1
                ORDER BY ended_at DESC, id DESC
                LIMIT $2
                "#,
            )
            .bind(user_id)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(self.pool.as_ref()),
        )
        .await?;

        rows.iter()
            .map(|row| {
                Ok(GameRecord {
                    session_id: row.get("session_id"),
                    user_id: row.get("user_id"),
                    game_id: row.get("game_id"),
                    bet_amount: row.get("bet_amount"),
                    spin_count: u32::try_from(row.get::<i32, _>("spin_count")).unwrap_or_default(),
                    total_bet: row.get("total_bet"),
                    total_win: row.get("total_win"),
                    jackpot_win: row.get("jackpot_win"),
                    rtp: row.get("rtp"),
                    final_state: parse_state(row.get::<&str, _>("final_state"))?,
                    started_at: row.get::<chrono::NaiveDateTime, _>("started_at").and_utc(),
                    ended_at: row.get::<chrono::NaiveDateTime, _>("ended_at").and_utc(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(user_id: UserId, session_id: &str) -> GameRecord {
        let mut session = GameSession::new(session_id.to_string(), user_id, "classic".to_string(), 10);
        session.state = SessionState::Settled;
        GameRecord::from_session(&session, Utc::now())
    }

    #[tokio::test]
    async fn test_in_memory_lists_newest_first_per_user() {
        let history = InMemorySessionHistory::new();
        history.record(&record(1, "a")).await.unwrap();
        history.record(&record(2, "b")).await.unwrap();
        history.record(&record(1, "c")).await.unwrap();

        let records = history.list_by_user(1, 10).await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
        assert_eq!(history.list_by_user(1, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_in_memory_drops_oldest_past_limit() {
        let history = InMemorySessionHistory::with_limit(3);
        for id in ["a", "b", "c", "d"] {
            history.record(&record(1, id)).await.unwrap();
        }

        assert_eq!(history.len().await, 3);
        let records = history.list_by_user(1, 10).await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(ids, vec!["d", "c", "b"]);
    }

    #[test]
    fn test_record_copies_final_aggregates() {
        let mut session = GameSession::new("s".to_string(), 1, "classic".to_string(), 10);
        session.total_bet = 40;
        session.total_win = 10;
        session.spin_count = 4;
        session.state = SessionState::Expired;

        let record = GameRecord::from_session(&session, Utc::now());
        assert_eq!(record.rtp, 0.25);
        assert_eq!(record.final_state, SessionState::Expired);
        assert_eq!(record.spin_count, 4);
    }

    #[test]
    fn test_unknown_state_is_corrupt() {
        assert!(parse_state("paused").is_err());
        assert_eq!(parse_state("settled").unwrap(), SessionState::Settled);
    }
}
