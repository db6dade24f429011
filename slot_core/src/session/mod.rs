//! Session engine: one actor per live game session.
//!
//! [`SessionManager`] owns the registry of live sessions and routes each
//! request to the session's [`SessionActor`], which processes its inbox one
//! message at a time. Every spin commits its bet, win and jackpot credit as a
//! single ledger unit, so a failed spin leaves both the wallet and the
//! session untouched.

pub mod actor;
pub mod config;
pub mod errors;
pub mod manager;
pub mod messages;
pub mod models;

pub use actor::{SessionActor, SessionHandle};
pub use config::{MAX_BATCH_SPINS, SessionConfig};
pub use errors::{SessionError, SessionResult};
pub use manager::{SessionManager, SessionServices};
pub use messages::SessionMessage;
pub use models::{
    BatchSpinResult, EarlyStopPolicy, GameSession, MAX_SESSION_ID_LEN, SessionId,
    SessionSnapshot, SessionState, SettleResult, SpinResult, StartGameResult, StopReason,
};
