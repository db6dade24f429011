//! Outbound events and the publisher seam used by the engine and ledger.

use crate::{
    paytable::SpinOutcome,
    session::{GameSession, SessionSnapshot, SessionState, StopReason},
    wallet::{UserId, Wallet},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Events pushed to realtime clients, serialized as `{"type": "...", ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HubEvent {
    GameStart {
        user_id: UserId,
        session_id: String,
        game_id: String,
        bet_amount: i64,
        balance: i64,
    },
    GameResult {
        user_id: UserId,
        session_id: String,
        spin_count: u32,
        outcome: SpinOutcome,
        total_bet: i64,
        total_win: i64,
    },
    /// Summary of a batch; individual spins are not pushed
    BatchResult {
        user_id: UserId,
        session_id: String,
        total_spins: u32,
        total_bet: i64,
        total_win: i64,
        stopped_early: bool,
        stop_reason: StopReason,
    },
    BalanceUpdate {
        user_id: UserId,
        balance: i64,
        frozen_balance: i64,
        available: i64,
    },
    GameState {
        user_id: UserId,
        session_id: String,
        state: SessionState,
        spin_count: u32,
        total_bet: i64,
        total_win: i64,
        rtp: f64,
    },
    Session {
        session: SessionSnapshot,
    },
    Subscribed {
        session_id: String,
    },
    Unsubscribed,
    Pong,
    Error {
        code: String,
        message: String,
    },
}

/// Who an event is delivered to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'a> {
    pub user_id: Option<UserId>,
    pub session_id: Option<&'a str>,
}

impl HubEvent {
    pub fn balance_update(wallet: &Wallet) -> Self {
        HubEvent::BalanceUpdate {
            user_id: wallet.user_id,
            balance: wallet.balance,
            frozen_balance: wallet.frozen_balance,
            available: wallet.available(),
        }
    }

    pub fn game_start(session: &GameSession, balance: i64) -> Self {
        HubEvent::GameStart {
            user_id: session.user_id,
            session_id: session.session_id.clone(),
            game_id: session.game_id.clone(),
            bet_amount: session.bet_amount,
            balance,
        }
    }

    pub fn game_result(session: &GameSession, outcome: SpinOutcome) -> Self {
        HubEvent::GameResult {
            user_id: session.user_id,
            session_id: session.session_id.clone(),
            spin_count: session.spin_count,
            outcome,
            total_bet: session.total_bet,
            total_win: session.total_win,
        }
    }

    pub fn game_state(session: &GameSession) -> Self {
        HubEvent::GameState {
            user_id: session.user_id,
            session_id: session.session_id.clone(),
            state: session.state,
            spin_count: session.spin_count,
            total_bet: session.total_bet,
            total_win: session.total_win,
            rtp: session.rtp(),
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        HubEvent::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Recipients: the owning user's clients plus clients bound to the session.
    /// Replies (`Pong`, `Error`, ...) have no route and go to one client only.
    pub fn route(&self) -> Route<'_> {
        match self {
            HubEvent::GameStart {
                user_id,
                session_id,
                ..
            }
            | HubEvent::GameResult {
                user_id,
                session_id,
                ..
            }
            | HubEvent::BatchResult {
                user_id,
                session_id,
                ..
            }
            | HubEvent::GameState {
                user_id,
                session_id,
                ..
            } => Route {
                user_id: Some(*user_id),
                session_id: Some(session_id.as_str()),
            },
            HubEvent::BalanceUpdate { user_id, .. } => Route {
                user_id: Some(*user_id),
                session_id: None,
            },
            HubEvent::Session { .. }
            | HubEvent::Subscribed { .. }
            | HubEvent::Unsubscribed
            | HubEvent::Pong
            | HubEvent::Error { .. } => Route {
                user_id: None,
                session_id: None,
            },
        }
    }

    /// Encode once for every recipient
    pub fn to_frame(&self) -> Result<Arc<str>, serde_json::Error> {
        Ok(Arc::from(serde_json::to_string(self)?))
    }
}

/// Sink for engine and ledger events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: HubEvent);
}

/// Publisher that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _event: HubEvent) {}
}

/// Publisher keeping every event in memory, in publish order
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<HubEvent>>,
}

impl RecordingPublisher {
    pub async fn events(&self) -> Vec<HubEvent> {
        self.events.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.events.lock().await.clear();
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: HubEvent) {
        self.events.lock().await.push(event);
    }
}
