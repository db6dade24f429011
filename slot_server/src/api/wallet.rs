//! Wallet API handlers.
//!
//! Balance and transaction history for the caller, plus deposit and
//! withdrawal entry points used by the cashier upstream.

use axum::{
    Json,
    extract::{Extension, Query, State},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use slot_core::wallet::{
    Balance, PageRequest, TransactionFilter, TransactionPage, TransactionRef, TransactionType,
    WalletTransaction,
};

use super::{
    AppState,
    error::{ApiResult, wallet_error},
};

#[derive(Debug, Deserialize)]
pub struct TransactionQuery {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub tx_type: Option<TransactionType>,
    pub ref_type: Option<String>,
    pub ref_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: i64,
    /// Upstream reference, e.g. a cashier order id
    pub reference: Option<String>,
}

/// Get the caller's balance.
///
/// # Errors
///
/// - `404 Not Found`: The caller has no wallet yet
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
) -> ApiResult<Balance> {
    state
        .wallet
        .get_balance(user_id)
        .await
        .map(Json)
        .map_err(wallet_error)
}

/// Page through the caller's transactions, newest first.
///
/// # Errors
///
/// - `400 Bad Request`: Page is 0 or page size outside `[1, 100]`
pub async fn get_transactions(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
    Query(query): Query<TransactionQuery>,
) -> ApiResult<TransactionPage> {
    let defaults = PageRequest::default();
    let page = PageRequest::new(
        query.page.unwrap_or(defaults.page),
        query.page_size.unwrap_or(defaults.page_size),
    );
    let filter = TransactionFilter {
        tx_type: query.tx_type,
        ref_type: query.ref_type,
        ref_id: query.ref_id,
        since: query.since,
        until: query.until,
    };

    state
        .wallet
        .get_transactions(user_id, &filter, page)
        .await
        .map(Json)
        .map_err(wallet_error)
}

fn cashier_ref(reference: Option<String>) -> TransactionRef {
    reference.map_or_else(TransactionRef::none, |id| TransactionRef::new("cashier", id))
}

/// Credit the caller's wallet, creating it on first deposit
pub async fn deposit(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
    Json(request): Json<AmountRequest>,
) -> ApiResult<WalletTransaction> {
    state
        .wallet
        .credit(
            user_id,
            request.amount,
            TransactionType::Deposit,
            cashier_ref(request.reference),
        )
        .await
        .map(Json)
        .map_err(wallet_error)
}

/// Debit the caller's wallet.
///
/// # Errors
///
/// - `402 Payment Required`: Available balance does not cover the amount
pub async fn withdraw(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
    Json(request): Json<AmountRequest>,
) -> ApiResult<WalletTransaction> {
    state
        .wallet
        .debit(
            user_id,
            request.amount,
            TransactionType::Withdraw,
            cashier_ref(request.reference),
        )
        .await
        .map(Json)
        .map_err(wallet_error)
}
