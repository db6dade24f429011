//! Storage contract for the ledger.

use super::{
    errors::WalletResult,
    models::{LedgerCommit, LedgerOp, PageRequest, TransactionFilter, TransactionPage, UserId, Wallet},
};
use async_trait::async_trait;

/// Per-user serialized balance storage with an append-only transaction log.
///
/// Implementations must apply every op of one `apply` call under a single
/// per-user lock and either commit all of them or none.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Apply an atomic unit of credits and debits.
    ///
    /// A unit made only of credits creates the wallet if it does not exist.
    /// An empty unit returns the current wallet with no transactions.
    async fn apply(&self, user_id: UserId, ops: &[LedgerOp]) -> WalletResult<LedgerCommit>;

    /// Fetch a wallet
    async fn get_wallet(&self, user_id: UserId) -> WalletResult<Wallet>;

    /// Create an empty wallet if missing, returning the stored one
    async fn open_wallet(&self, user_id: UserId) -> WalletResult<Wallet>;

    /// Page through a user's transactions, newest first
    async fn get_transactions(
        &self,
        user_id: UserId,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> WalletResult<TransactionPage>;

    /// Move `amount` from available to frozen
    async fn freeze(&self, user_id: UserId, amount: i64) -> WalletResult<Wallet>;

    /// Move `amount` from frozen back to available
    async fn unfreeze(&self, user_id: UserId, amount: i64) -> WalletResult<Wallet>;
}
