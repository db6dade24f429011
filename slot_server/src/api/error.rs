//! Mapping of core error codes onto HTTP responses.

use axum::{Json, http::StatusCode};
use serde::{Deserialize, Serialize};
use slot_core::{SessionError, WalletError, history::HistoryError, hub::HubError};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// HTTP status for a stable error code
pub fn status_for(code: &str) -> StatusCode {
    match code {
        "INVALID_BET_RANGE" | "INVALID_SPIN_COUNT" | "INVALID_AMOUNT" | "INVALID_SESSION_ID"
        | "INVALID_PAGE" | "INVALID_TRANSACTION_TYPE" | "INVALID_REQUEST" => {
            StatusCode::BAD_REQUEST
        }
        "INSUFFICIENT_BALANCE" => StatusCode::PAYMENT_REQUIRED,
        "FORBIDDEN" => StatusCode::FORBIDDEN,
        "SESSION_NOT_FOUND" | "WALLET_NOT_FOUND" | "JACKPOT_NOT_FOUND" => StatusCode::NOT_FOUND,
        "SESSION_EXISTS" => StatusCode::CONFLICT,
        "CAPACITY_EXCEEDED" | "HUB_CLOSED" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn api_error(code: &str, message: impl Into<String>) -> ApiError {
    (
        status_for(code),
        Json(ErrorResponse {
            code: code.to_string(),
            error: message.into(),
        }),
    )
}

pub fn session_error(e: SessionError) -> ApiError {
    if e.code() == "INTERNAL_ERROR" {
        log::error!("Session operation failed: {}", e);
    }
    api_error(e.code(), e.client_message())
}

pub fn wallet_error(e: WalletError) -> ApiError {
    if e.code() == "INTERNAL_ERROR" {
        log::error!("Wallet operation failed: {}", e);
    }
    api_error(e.code(), e.client_message())
}

pub fn hub_error(e: HubError) -> ApiError {
    api_error(e.code(), e.client_message())
}

pub fn history_error(e: HistoryError) -> ApiError {
    log::error!("History query failed: {}", e);
    api_error(e.code(), e.client_message())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for("INVALID_BET_RANGE"), StatusCode::BAD_REQUEST);
        assert_eq!(status_for("INSUFFICIENT_BALANCE"), StatusCode::PAYMENT_REQUIRED);
        assert_eq!(status_for("FORBIDDEN"), StatusCode::FORBIDDEN);
        assert_eq!(status_for("SESSION_NOT_FOUND"), StatusCode::NOT_FOUND);
        assert_eq!(status_for("SESSION_EXISTS"), StatusCode::CONFLICT);
        assert_eq!(status_for("CAPACITY_EXCEEDED"), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_for("INTERNAL_ERROR"), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let (status, Json(body)) =
            session_error(SessionError::Internal("actor panicked at x.rs".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.error.contains("x.rs"));
    }
}
