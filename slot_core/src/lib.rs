//! # Slot Core
//!
//! Transactional core of a slot arcade backend: game sessions, an audited
//! wallet ledger, progressive jackpot pools and a realtime event hub.
//!
//! ## Architecture
//!
//! Each live game session is an actor that owns its state and processes its
//! inbox one message at a time. A spin flows through the pieces in order:
//!
//! - **Paytable**: draws the reel grid and evaluates paylines
//! - **Jackpot**: takes a contribution from the bet and rolls for the pool
//! - **Wallet**: commits bet, win and jackpot credit as one atomic ledger unit
//! - **Hub**: publishes the result and new balance to the user's connections
//! - **Diagnostics**: best-effort trail that never blocks a spin
//!
//! Finished sessions are written to [`history`].
//!
//! ## Core Modules
//!
//! - [`session`]: Session actors and the session manager
//! - [`wallet`]: Ledger stores and the wallet manager
//! - [`jackpot`]: Shared progressive pools
//! - [`hub`]: Connection registry and ordered delivery
//!
//! ## Example
//!
//! ```
//! use slot_core::{
//!     history::InMemorySessionHistory,
//!     hub::NoopPublisher,
//!     jackpot::{JackpotConfig, JackpotRegistry},
//!     paytable::WeightedPaytable,
//!     session::{SessionConfig, SessionManager, SessionServices},
//!     wallet::{InMemoryLedgerStore, TransactionRef, TransactionType, WalletManager},
//! };
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::default();
//! let wallet = Arc::new(WalletManager::new(Arc::new(InMemoryLedgerStore::new())));
//! let jackpots = JackpotRegistry::with_pools(&config.game_id, &[JackpotConfig::default()])?;
//!
//! let sessions = SessionManager::new(
//!     config,
//!     SessionServices {
//!         wallet: wallet.clone(),
//!         jackpots: Arc::new(jackpots),
//!         evaluator: Arc::new(WeightedPaytable::classic()?),
//!         history: Arc::new(InMemorySessionHistory::new()),
//!         events: Arc::new(NoopPublisher),
//!         diagnostics: None,
//!     },
//! );
//!
//! wallet
//!     .credit(7, 1_000, TransactionType::Deposit, TransactionRef::none())
//!     .await?;
//! sessions.start_game(7, "s-1", 100).await?;
//! let spin = sessions.spin(7, "s-1").await?;
//! assert_eq!(spin.spin_count, 1);
//! sessions.settle(7, "s-1").await?;
//! # Ok(())
//! # }
//! ```

/// Connection pool, schema and query timeouts.
pub mod db;

/// Best-effort diagnostics trail.
pub mod diagnostics;

/// Finished-session records.
pub mod history;

/// Realtime hub.
pub mod hub;

/// Progressive jackpot pools.
pub mod jackpot;

/// Symbols, paylines and spin evaluation.
pub mod paytable;

/// Game session engine.
pub mod session;

/// Wallet ledger.
pub mod wallet;

pub use db::{Database, DatabaseConfig};
pub use hub::{EventPublisher, HubEvent, HubHandle};
pub use jackpot::{JackpotRegistry, PoolKey};
pub use paytable::{PaytableEvaluator, SpinOutcome, WeightedPaytable};
pub use session::{SessionConfig, SessionError, SessionManager, SessionServices};
pub use wallet::{WalletError, WalletManager};
