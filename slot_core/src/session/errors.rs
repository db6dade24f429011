//! Session engine error types.

use crate::{jackpot::JackpotError, wallet::WalletError};
use thiserror::Error;

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Bet {bet} outside allowed range [{min}, {max}]")]
    InvalidBetRange { bet: i64, min: i64, max: i64 },

    #[error("Session capacity of {0} reached")]
    CapacityExceeded(usize),

    #[error("Session {0} already exists")]
    SessionExists(String),

    #[error("Session {0} not found")]
    SessionNotFound(String),

    #[error("Session belongs to another user")]
    Forbidden,

    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    #[error("Spin count {0} outside [1, 100]")]
    InvalidSpinCount(u32),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Jackpot(#[from] JackpotError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Stable error code surfaced to callers
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidBetRange { .. } => "INVALID_BET_RANGE",
            SessionError::CapacityExceeded(_) => "CAPACITY_EXCEEDED",
            SessionError::SessionExists(_) => "SESSION_EXISTS",
            SessionError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            SessionError::Forbidden => "FORBIDDEN",
            SessionError::InvalidSessionId(_) => "INVALID_SESSION_ID",
            SessionError::InvalidSpinCount(_) => "INVALID_SPIN_COUNT",
            SessionError::Wallet(e) => e.code(),
            SessionError::Jackpot(_) | SessionError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to show to clients
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Wallet(e) => e.client_message(),
            SessionError::Jackpot(e) => e.client_message(),
            SessionError::Internal(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    pub fn is_insufficient_balance(&self) -> bool {
        matches!(
            self,
            SessionError::Wallet(WalletError::InsufficientBalance { .. })
        )
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_codes_pass_through() {
        let err = SessionError::from(WalletError::InsufficientBalance {
            user_id: 1,
            available: 5,
            required: 10,
        });
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
        assert!(err.is_insufficient_balance());
    }

    #[test]
    fn test_internal_errors_are_sanitized() {
        let err = SessionError::Internal("actor panicked at foo.rs:12".to_string());
        assert_eq!(err.client_message(), "Internal server error");
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
