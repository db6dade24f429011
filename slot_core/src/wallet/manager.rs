//! Wallet service: validated credits and debits over a [`LedgerStore`].

use super::{
    errors::{WalletError, WalletResult},
    models::{
        Balance, EntryDirection, LedgerCommit, LedgerOp, PageRequest, TransactionFilter,
        TransactionPage, TransactionRef, TransactionType, UserId, Wallet, WalletTransaction,
    },
    store::LedgerStore,
};
use crate::hub::{EventPublisher, HubEvent, NoopPublisher};
use std::sync::Arc;

/// Wallet manager
///
/// The only entry point that mutates balances. Every committed unit raises a
/// `BalanceUpdate` event for the owning user.
#[derive(Clone)]
pub struct WalletManager {
    store: Arc<dyn LedgerStore>,
    events: Arc<dyn EventPublisher>,
}

impl WalletManager {
    /// Create a wallet manager that publishes nothing
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            events: Arc::new(NoopPublisher),
        }
    }

    /// Publish balance changes through `events`
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = events;
        self
    }

    /// Credit a wallet, creating it if needed
    ///
    /// # Errors
    ///
    /// * `WalletError::InvalidAmount` - `amount <= 0`
    /// * `WalletError::InvalidTransactionType` - `tx_type` is a debit type
    pub async fn credit(
        &self,
        user_id: UserId,
        amount: i64,
        tx_type: TransactionType,
        reference: TransactionRef,
    ) -> WalletResult<WalletTransaction> {
        self.single(user_id, EntryDirection::Credit, amount, tx_type, reference)
            .await
    }

    /// Debit a wallet
    ///
    /// # Errors
    ///
    /// * `WalletError::InsufficientBalance` - `amount` exceeds the available balance
    /// * `WalletError::InvalidAmount` - `amount <= 0`
    /// * `WalletError::InvalidTransactionType` - `tx_type` is a credit type
    /// * `WalletError::WalletNotFound` - User has no wallet
    pub async fn debit(
        &self,
        user_id: UserId,
        amount: i64,
        tx_type: TransactionType,
        reference: TransactionRef,
    ) -> WalletResult<WalletTransaction> {
        self.single(user_id, EntryDirection::Debit, amount, tx_type, reference)
            .await
    }

    async fn single(
        &self,
        user_id: UserId,
        direction: EntryDirection,
        amount: i64,
        tx_type: TransactionType,
        reference: TransactionRef,
    ) -> WalletResult<WalletTransaction> {
        if tx_type.direction() != direction {
            return Err(WalletError::InvalidTransactionType { tx_type, direction });
        }

        let mut commit = self
            .apply(user_id, &[LedgerOp::new(tx_type, amount, reference)])
            .await?;
        commit
            .transactions
            .pop()
            .ok_or_else(|| WalletError::CorruptRow("unit committed without a row".to_string()))
    }

    /// Apply several ops as one atomic unit and publish the new balance
    pub async fn apply(&self, user_id: UserId, ops: &[LedgerOp]) -> WalletResult<LedgerCommit> {
        let commit = self.commit(user_id, ops).await?;
        if !commit.transactions.is_empty() {
            self.notify_balance(&commit.wallet).await;
        }
        Ok(commit)
    }

    /// Apply an atomic unit without publishing; callers batch the notification
    pub(crate) async fn commit(
        &self,
        user_id: UserId,
        ops: &[LedgerOp],
    ) -> WalletResult<LedgerCommit> {
        let commit = self.store.apply(user_id, ops).await?;
        for tx in &commit.transactions {
            log::debug!(
                "[{}] user {} {} {} ({} -> {})",
                tx.order_no,
                user_id,
                tx.tx_type,
                tx.amount,
                tx.before_balance,
                tx.after_balance
            );
        }
        Ok(commit)
    }

    pub(crate) async fn notify_balance(&self, wallet: &Wallet) {
        self.events.publish(HubEvent::balance_update(wallet)).await;
    }

    /// Balance, frozen amount and available funds
    pub async fn get_balance(&self, user_id: UserId) -> WalletResult<Balance> {
        Ok(self.store.get_wallet(user_id).await?.balance_view())
    }

    pub async fn get_wallet(&self, user_id: UserId) -> WalletResult<Wallet> {
        self.store.get_wallet(user_id).await
    }

    /// Idempotently create an empty wallet
    pub async fn open_wallet(&self, user_id: UserId) -> WalletResult<Wallet> {
        self.store.open_wallet(user_id).await
    }

    pub async fn get_transactions(
        &self,
        user_id: UserId,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> WalletResult<TransactionPage> {
        self.store.get_transactions(user_id, filter, page).await
    }

    pub async fn freeze(&self, user_id: UserId, amount: i64) -> WalletResult<Balance> {
        let wallet = self.store.freeze(user_id, amount).await?;
        log::info!("Froze {} for user {}", amount, user_id);
        self.notify_balance(&wallet).await;
        Ok(wallet.balance_view())
    }

    pub async fn unfreeze(&self, user_id: UserId, amount: i64) -> WalletResult<Balance> {
        let wallet = self.store.unfreeze(user_id, amount).await?;
        log::info!("Unfroze {} for user {}", amount, user_id);
        self.notify_balance(&wallet).await;
        Ok(wallet.balance_view())
    }
}
