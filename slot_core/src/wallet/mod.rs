//! Wallet ledger: serialized, audited, atomic balance mutation.
//!
//! Every balance change goes through [`WalletManager`], which applies a unit of
//! credits and debits against a [`LedgerStore`] under a per-user lock. Each op
//! produces exactly one [`WalletTransaction`] and updates the wallet's aggregate
//! counters in the same unit.
//!
//! ## Example
//!
//! ```
//! use slot_core::wallet::{InMemoryLedgerStore, TransactionRef, TransactionType, WalletManager};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let wallet = WalletManager::new(Arc::new(InMemoryLedgerStore::new()));
//!
//! wallet
//!     .credit(1, 1_000, TransactionType::Deposit, TransactionRef::none())
//!     .await?;
//! let bet = wallet
//!     .debit(1, 100, TransactionType::Bet, TransactionRef::session("s-1"))
//!     .await?;
//! assert_eq!(bet.after_balance, 900);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod manager;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use errors::{WalletError, WalletResult};
pub use manager::WalletManager;
pub use memory::InMemoryLedgerStore;
pub use models::{
    Balance, EntryDirection, LedgerCommit, LedgerOp, PageRequest, TransactionFilter,
    TransactionPage, TransactionRef, TransactionStatus, TransactionType, UserId, Wallet,
    WalletTransaction,
};
pub use postgres::PgLedgerStore;
pub use store::LedgerStore;
