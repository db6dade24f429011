//! Wallet error types.

use super::models::{EntryDirection, TransactionType, UserId};
use crate::db::timeouts::TimeoutError;
use thiserror::Error;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database operation exceeded its deadline
    #[error("Database timeout: {0}")]
    Timeout(String),

    /// Insufficient available balance
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        user_id: UserId,
        available: i64,
        required: i64,
    },

    /// Wallet not found
    #[error("Wallet not found for user {0}")]
    WalletNotFound(UserId),

    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Transaction type used with the wrong direction (e.g. `win` as a debit)
    #[error("Transaction type {tx_type} cannot be used as a {direction}")]
    InvalidTransactionType {
        tx_type: TransactionType,
        direction: EntryDirection,
    },

    /// Invalid pagination request
    #[error("Invalid page request: {0}")]
    InvalidPage(String),

    /// Balance would overflow
    #[error("Balance overflow")]
    BalanceOverflow,

    /// Stored data could not be decoded
    #[error("Corrupt ledger row: {0}")]
    CorruptRow(String),
}

impl WalletError {
    /// Stable error code surfaced to callers
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            WalletError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            WalletError::InvalidAmount(_) => "INVALID_AMOUNT",
            WalletError::InvalidTransactionType { .. } => "INVALID_TRANSACTION_TYPE",
            WalletError::InvalidPage(_) => "INVALID_PAGE",
            WalletError::Database(_)
            | WalletError::Timeout(_)
            | WalletError::BalanceOverflow
            | WalletError::CorruptRow(_) => "INTERNAL_ERROR",
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Database errors are sanitized to prevent information disclosure about
    /// the internal system structure, and user IDs are redacted.
    pub fn client_message(&self) -> String {
        match self {
            WalletError::Database(_) | WalletError::Timeout(_) | WalletError::CorruptRow(_) => {
                "Internal server error".to_string()
            }
            WalletError::WalletNotFound(_) => "Wallet not found".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<TimeoutError> for WalletError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Database(e) => WalletError::Database(e),
            TimeoutError::Timeout(d) => WalletError::Timeout(format!("{d:?}")),
        }
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;
