//! Session actor message types.

use super::{
    errors::SessionResult,
    models::{BatchSpinResult, EarlyStopPolicy, SessionSnapshot, SettleResult, SpinResult},
};
use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

/// Messages that can be sent to a SessionActor
#[derive(Debug)]
pub enum SessionMessage {
    /// Run one spin
    Spin {
        response: oneshot::Sender<SessionResult<SpinResult>>,
    },

    /// Run up to `count` spins back to back
    BatchSpin {
        count: u32,
        policy: EarlyStopPolicy,
        response: oneshot::Sender<SessionResult<BatchSpinResult>>,
    },

    /// Close the session, refunding an unconsumed opening bet
    Settle {
        response: oneshot::Sender<SessionResult<SettleResult>>,
    },

    /// Current snapshot
    GetInfo {
        response: oneshot::Sender<SessionSnapshot>,
    },

    /// Expire the session if it has been idle longer than `timeout`.
    /// Replies `true` when the session expired and the actor stopped.
    Expire {
        now: DateTime<Utc>,
        timeout: chrono::Duration,
        response: oneshot::Sender<bool>,
    },

    /// Stop without settling (shutdown)
    Close,
}
