//! Game session API handlers.
//!
//! Thin wrappers over the session engine:
//! - Starting a session with an opening bet
//! - Single and batch spins
//! - Settling a session
//! - Session snapshots and finished-session history
//!
//! All endpoints require the `X-User-Id` identity header.
//!
//! # Examples
//!
//! Start a session:
//! ```bash
//! curl -X POST http://localhost:7070/api/v1/games \
//!   -H "X-User-Id: 7" \
//!   -H "Content-Type: application/json" \
//!   -d '{"session_id": "s-1", "bet_amount": 100}'
//! ```
//!
//! Spin up to 50 times, stopping on a win over 1000:
//! ```bash
//! curl -X POST http://localhost:7070/api/v1/games/s-1/batch \
//!   -H "X-User-Id: 7" \
//!   -H "Content-Type: application/json" \
//!   -d '{"count": 50, "big_win_threshold": 1000}'
//! ```

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
};
use serde::{Deserialize, Serialize};
use slot_core::{
    history::GameRecord,
    session::{
        BatchSpinResult, EarlyStopPolicy, SessionSnapshot, SettleResult, SpinResult,
        StartGameResult,
    },
};
use std::time::Instant;
use uuid::Uuid;

use super::{
    AppState,
    error::{ApiResult, history_error, session_error},
};
use crate::{logging::log_performance, metrics};

/// Largest page of history returned at once
const MAX_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct StartGameRequest {
    /// Client-chosen id; generated when absent
    pub session_id: Option<String>,
    pub bet_amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct BatchSpinRequest {
    pub count: u32,
    pub big_win_threshold: Option<i64>,
    pub max_total_win: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SessionList {
    pub sessions: Vec<SessionSnapshot>,
}

/// Start a game session.
///
/// Debits the opening bet and returns the new session with the balance after
/// the debit.
///
/// # Errors
///
/// - `400 Bad Request`: Bet outside the configured range or bad session id
/// - `402 Payment Required`: Balance does not cover the bet
/// - `409 Conflict`: Session id already in use
/// - `503 Service Unavailable`: Session capacity reached
pub async fn start_game(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
    Json(request): Json<StartGameRequest>,
) -> ApiResult<StartGameResult> {
    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let started = state
        .sessions
        .start_game(user_id, &session_id, request.bet_amount)
        .await
        .map_err(session_error)?;

    metrics::sessions_started_total();
    metrics::active_sessions(state.sessions.active_session_count().await);
    Ok(Json(started))
}

/// List the caller's live sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
) -> ApiResult<SessionList> {
    Ok(Json(SessionList {
        sessions: state.sessions.list_user_sessions(user_id).await,
    }))
}

/// Get a live session's snapshot.
///
/// # Errors
///
/// - `403 Forbidden`: Session belongs to another user
/// - `404 Not Found`: No such live session
pub async fn get_session(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
    Path(session_id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    state
        .sessions
        .get_session_info(user_id, &session_id)
        .await
        .map(Json)
        .map_err(session_error)
}

/// Run one spin.
///
/// The first spin of a session plays the opening bet; later spins debit a
/// fresh bet.
///
/// # Errors
///
/// - `402 Payment Required`: Balance does not cover the bet
/// - `403 Forbidden`: Session belongs to another user
/// - `404 Not Found`: No such live session
pub async fn spin(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
    Path(session_id): Path<String>,
) -> ApiResult<SpinResult> {
    let result = state
        .sessions
        .spin(user_id, &session_id)
        .await
        .map_err(session_error)?;

    metrics::spins_total(1);
    if result.outcome.jackpot_win.is_some() {
        metrics::jackpot_wins_total();
    }
    Ok(Json(result))
}

/// Run up to `count` spins, stopping early on the given conditions.
///
/// # Errors
///
/// - `400 Bad Request`: `count` outside `[1, 100]`
/// - `402 Payment Required`: The first spin could not be paid
/// - `403 Forbidden`: Session belongs to another user
/// - `404 Not Found`: No such live session
pub async fn batch_spin(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
    Path(session_id): Path<String>,
    Json(request): Json<BatchSpinRequest>,
) -> ApiResult<BatchSpinResult> {
    let policy = EarlyStopPolicy {
        big_win_threshold: request.big_win_threshold,
        max_total_win: request.max_total_win,
    };

    let start = Instant::now();
    let result = state
        .sessions
        .batch_spin(user_id, &session_id, request.count, policy)
        .await
        .map_err(session_error)?;
    log_performance(
        "batch_spin",
        start.elapsed().as_millis() as u64,
        Some(&format!("{} spins", result.total_spins)),
    );

    metrics::spins_total(u64::from(result.total_spins));
    let jackpots = result.spins.iter().filter(|s| s.jackpot_win.is_some()).count();
    for _ in 0..jackpots {
        metrics::jackpot_wins_total();
    }
    Ok(Json(result))
}

/// Settle and close a session.
///
/// An opening bet that was never spun is refunded. Settling twice returns
/// `404`.
pub async fn settle(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
    Path(session_id): Path<String>,
) -> ApiResult<SettleResult> {
    let settled = state
        .sessions
        .settle(user_id, &session_id)
        .await
        .map_err(session_error)?;

    metrics::active_sessions(state.sessions.active_session_count().await);
    Ok(Json(settled))
}

/// Finished sessions of the caller, newest first
pub async fn history(
    State(state): State<AppState>,
    Extension(user_id): Extension<i64>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Vec<GameRecord>> {
    let limit = query.limit.unwrap_or(20).clamp(1, MAX_HISTORY_LIMIT);
    state
        .sessions
        .services()
        .history
        .list_by_user(user_id, limit)
        .await
        .map(Json)
        .map_err(history_error)
}
