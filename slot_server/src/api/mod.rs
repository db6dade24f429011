//! HTTP/WebSocket API for the slot server.
//!
//! A thin adapter over `slot_core`: handlers translate requests into session
//! engine and wallet calls and map typed errors onto HTTP statuses. Identity
//! is established upstream; every `/api/v1` route reads the caller from the
//! `X-User-Id` header.
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                               - Health check (public)
//! GET  /ws                                   - Realtime connection
//! POST /api/v1/games                         - Start a session
//! GET  /api/v1/games                         - Caller's live sessions
//! GET  /api/v1/games/history                 - Caller's finished sessions
//! GET  /api/v1/games/{session_id}            - Session snapshot
//! POST /api/v1/games/{session_id}/spin       - One spin
//! POST /api/v1/games/{session_id}/batch      - Up to 100 spins
//! POST /api/v1/games/{session_id}/settle     - Close the session
//! GET  /api/v1/wallet                        - Balance
//! GET  /api/v1/wallet/transactions           - Ledger page, newest first
//! POST /api/v1/wallet/deposit                - Cashier credit
//! POST /api/v1/wallet/withdraw               - Cashier debit
//! GET  /api/v1/jackpots                      - Pool amounts
//! GET  /api/v1/online                        - Online count and users
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod error;
pub mod games;
pub mod middleware;
pub mod rate_limiter;
pub mod request_id;
pub mod wallet;
pub mod websocket;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use slot_core::{
    Database, HubHandle, SessionManager, WalletManager, jackpot::JackpotPool, wallet::UserId,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use error::{ApiResult, hub_error};

/// Application state shared across all HTTP handlers and WebSocket connections.
///
/// Cloned per request; every field is a handle or an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub wallet: Arc<WalletManager>,
    pub hub: HubHandle,
    /// `None` when running on in-memory stores
    pub db: Option<Arc<Database>>,
}

#[derive(Debug, Serialize)]
pub struct OnlineResponse {
    pub count: usize,
    pub users: Vec<UserId>,
}

#[derive(Debug, Serialize)]
pub struct JackpotList {
    pub pools: Vec<JackpotPool>,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use slot_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("127.0.0.1:7070").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    let root_routes = Router::new()
        .route("/health", get(health_check))
        // Identity for the socket is checked inside the upgrade handler
        .route("/ws", get(websocket::websocket_handler));

    Router::new()
        .merge(root_routes)
        .nest("/api/v1", create_v1_router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/games", post(games::start_game).get(games::list_sessions))
        .route("/games/history", get(games::history))
        .route("/games/{session_id}", get(games::get_session))
        .route("/games/{session_id}/spin", post(games::spin))
        .route("/games/{session_id}/batch", post(games::batch_spin))
        .route("/games/{session_id}/settle", post(games::settle))
        .route("/wallet", get(wallet::get_balance))
        .route("/wallet/transactions", get(wallet::get_transactions))
        .route("/wallet/deposit", post(wallet::deposit))
        .route("/wallet/withdraw", post(wallet::withdraw))
        .route("/jackpots", get(list_jackpots))
        .route("/online", get(online))
        .layer(axum::middleware::from_fn(middleware::identity_middleware))
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the database (if any) answers and the hub is
/// running, `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:7070/health
/// # {"status":"healthy","database":"ok","sessions":{"active":3},"online":1,...}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match &state.db {
        Some(db) => match db.health_check().await {
            Ok(()) => "ok",
            Err(e) => {
                tracing::warn!("Database health check failed: {}", e);
                "unreachable"
            }
        },
        None => "in_memory",
    };
    let online = state.hub.online_count().await.ok();
    let healthy = database != "unreachable" && online.is_some();

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": database,
        "sessions": {
            "active": state.sessions.active_session_count().await,
        },
        "online": online,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}

/// Current jackpot pools
async fn list_jackpots(State(state): State<AppState>) -> ApiResult<JackpotList> {
    let pools = state.sessions.services().jackpots.list().await;
    Ok(Json(JackpotList { pools }))
}

/// Online connection count and distinct users
async fn online(State(state): State<AppState>) -> ApiResult<OnlineResponse> {
    let count = state.hub.online_count().await.map_err(hub_error)?;
    let users = state.hub.online_users().await.map_err(hub_error)?;
    Ok(Json(OnlineResponse { count, users }))
}
