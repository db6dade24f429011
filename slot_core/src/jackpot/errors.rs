//! Jackpot error types.

use super::models::PoolKey;
use crate::db::timeouts::TimeoutError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JackpotError {
    #[error("Jackpot pool not found: {0}")]
    PoolNotFound(PoolKey),

    #[error("Invalid jackpot configuration: {0}")]
    InvalidConfig(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database timeout: {0}")]
    Timeout(String),

    #[error("Corrupt jackpot row: {0}")]
    CorruptRow(String),
}

impl JackpotError {
    pub fn code(&self) -> &'static str {
        match self {
            JackpotError::PoolNotFound(_) => "JACKPOT_NOT_FOUND",
            JackpotError::InvalidConfig(_)
            | JackpotError::Database(_)
            | JackpotError::Timeout(_)
            | JackpotError::CorruptRow(_) => "INTERNAL_ERROR",
        }
    }

    pub fn client_message(&self) -> String {
        match self {
            JackpotError::PoolNotFound(_) => "Jackpot pool not found".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl From<TimeoutError> for JackpotError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Database(e) => JackpotError::Database(e),
            TimeoutError::Timeout(d) => JackpotError::Timeout(format!("{d:?}")),
        }
    }
}

pub type JackpotResult<T> = Result<T, JackpotError>;
