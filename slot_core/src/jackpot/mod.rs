//! Jackpot pools fed by a share of every bet and paid out probabilistically.
//!
//! The registry is the authority while the process runs. With a
//! [`JackpotStore`] attached every change is written through, so pools and
//! payout history survive a restart.

pub mod errors;
pub mod models;
pub mod postgres;
pub mod registry;
pub mod store;

pub use errors::{JackpotError, JackpotResult};
pub use models::{
    Contribution, JackpotConfig, JackpotPool, JackpotWin, JackpotWinRecord, PoolKey,
};
pub use postgres::PgJackpotStore;
pub use registry::JackpotRegistry;
pub use store::{InMemoryJackpotStore, JackpotStore};
