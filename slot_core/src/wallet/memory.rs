//! In-process ledger store.

use super::{
    errors::{WalletError, WalletResult},
    models::{
        EntryDirection, LedgerCommit, LedgerOp, PageRequest, TransactionFilter, TransactionPage,
        TransactionStatus, UserId, Wallet, WalletTransaction, generate_order_no,
    },
    store::LedgerStore,
};
use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
};
use tokio::sync::{Mutex, RwLock};

struct UserLedger {
    wallet: Wallet,
    transactions: Vec<WalletTransaction>,
}

impl UserLedger {
    fn new(user_id: UserId) -> Self {
        Self {
            wallet: Wallet::new(user_id),
            transactions: Vec::new(),
        }
    }
}

/// Ledger store keeping wallets in memory behind one mutex per user
pub struct InMemoryLedgerStore {
    users: RwLock<HashMap<UserId, Arc<Mutex<UserLedger>>>>,
    next_tx_id: AtomicI64,
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            next_tx_id: AtomicI64::new(1),
        }
    }

    async fn cell(&self, user_id: UserId) -> Option<Arc<Mutex<UserLedger>>> {
        self.users.read().await.get(&user_id).cloned()
    }

    async fn cell_or_create(&self, user_id: UserId) -> Arc<Mutex<UserLedger>> {
        if let Some(cell) = self.cell(user_id).await {
            return cell;
        }

        let mut users = self.users.write().await;
        users
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(UserLedger::new(user_id))))
            .clone()
    }

    async fn existing(&self, user_id: UserId) -> WalletResult<Arc<Mutex<UserLedger>>> {
        self.cell(user_id)
            .await
            .ok_or(WalletError::WalletNotFound(user_id))
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn apply(&self, user_id: UserId, ops: &[LedgerOp]) -> WalletResult<LedgerCommit> {
        let credits_only = ops
            .iter()
            .all(|op| op.tx_type.direction() == EntryDirection::Credit);
        let cell = if credits_only && !ops.is_empty() {
            self.cell_or_create(user_id).await
        } else {
            self.existing(user_id).await?
        };

        let mut ledger = cell.lock().await;

        // Stage on a copy; the stored wallet only changes once every op passed.
        let mut staged = ledger.wallet.clone();
        let mut balances = Vec::with_capacity(ops.len());
        for op in ops {
            balances.push(staged.apply_op(op)?);
        }

        let now = Utc::now();
        let transactions: Vec<WalletTransaction> = ops
            .iter()
            .zip(balances)
            .map(|(op, (before, after))| WalletTransaction {
                id: self.next_tx_id.fetch_add(1, Ordering::Relaxed),
                order_no: generate_order_no(op.tx_type),
                user_id,
                tx_type: op.tx_type,
                amount: op.amount,
                before_balance: before,
                after_balance: after,
                ref_type: op.reference.ref_type.clone(),
                ref_id: op.reference.ref_id.clone(),
                status: TransactionStatus::Completed,
                created_at: now,
            })
            .collect();

        ledger.wallet = staged;
        ledger.transactions.extend(transactions.iter().cloned());

        Ok(LedgerCommit {
            wallet: ledger.wallet.clone(),
            transactions,
        })
    }

    async fn get_wallet(&self, user_id: UserId) -> WalletResult<Wallet> {
        let cell = self.existing(user_id).await?;
        let ledger = cell.lock().await;
        Ok(ledger.wallet.clone())
    }

    async fn open_wallet(&self, user_id: UserId) -> WalletResult<Wallet> {
        let cell = self.cell_or_create(user_id).await;
        let ledger = cell.lock().await;
        Ok(ledger.wallet.clone())
    }

    async fn get_transactions(
        &self,
        user_id: UserId,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> WalletResult<TransactionPage> {
        page.validate()?;
        let cell = self.existing(user_id).await?;
        let ledger = cell.lock().await;

        let matching: Vec<&WalletTransaction> = ledger
            .transactions
            .iter()
            .rev()
            .filter(|tx| filter.matches(tx))
            .collect();

        let items = matching
            .iter()
            .skip(usize::try_from(page.offset()).unwrap_or(usize::MAX))
            .take(page.page_size as usize)
            .map(|tx| (*tx).clone())
            .collect();

        Ok(TransactionPage {
            items,
            total: matching.len() as u64,
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn freeze(&self, user_id: UserId, amount: i64) -> WalletResult<Wallet> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        let cell = self.existing(user_id).await?;
        let mut ledger = cell.lock().await;

        let available = ledger.wallet.available();
        if amount > available {
            return Err(WalletError::InsufficientBalance {
                user_id,
                available,
                required: amount,
            });
        }
        ledger.wallet.frozen_balance += amount;
        ledger.wallet.updated_at = Utc::now();
        Ok(ledger.wallet.clone())
    }

    async fn unfreeze(&self, user_id: UserId, amount: i64) -> WalletResult<Wallet> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }
        let cell = self.existing(user_id).await?;
        let mut ledger = cell.lock().await;

        if amount > ledger.wallet.frozen_balance {
            return Err(WalletError::InvalidAmount(amount));
        }
        ledger.wallet.frozen_balance -= amount;
        ledger.wallet.updated_at = Utc::now();
        Ok(ledger.wallet.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::models::{TransactionRef, TransactionType};
    use tokio::task::JoinSet;

    fn op(tx_type: TransactionType, amount: i64) -> LedgerOp {
        LedgerOp::new(tx_type, amount, TransactionRef::none())
    }

    async fn funded(amount: i64) -> Arc<InMemoryLedgerStore> {
        let store = Arc::new(InMemoryLedgerStore::new());
        store
            .apply(1, &[op(TransactionType::Deposit, amount)])
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_credit_creates_wallet() {
        let store = InMemoryLedgerStore::new();
        let commit = store
            .apply(7, &[op(TransactionType::Deposit, 250)])
            .await
            .unwrap();

        assert_eq!(commit.wallet.balance, 250);
        assert_eq!(commit.transactions.len(), 1);
        assert_eq!(commit.transactions[0].before_balance, 0);
        assert_eq!(commit.transactions[0].after_balance, 250);
    }

    #[tokio::test]
    async fn test_debit_on_unknown_wallet_fails() {
        let store = InMemoryLedgerStore::new();
        let err = store
            .apply(7, &[op(TransactionType::Bet, 10)])
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::WalletNotFound(7)));
    }

    #[tokio::test]
    async fn test_failed_unit_commits_nothing() {
        let store = funded(100).await;
        let err = store
            .apply(
                1,
                &[
                    op(TransactionType::Win, 50),
                    op(TransactionType::Bet, 500),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientBalance { .. }));

        let wallet = store.get_wallet(1).await.unwrap();
        assert_eq!(wallet.balance, 100);
        assert_eq!(wallet.total_win, 0);

        let page = store
            .get_transactions(1, &TransactionFilter::default(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_concurrent_debits_drain_exactly() {
        const N: i64 = 20;
        let store = funded(N * 10).await;

        let mut tasks = JoinSet::new();
        for _ in 0..N {
            let store = Arc::clone(&store);
            tasks.spawn(async move { store.apply(1, &[op(TransactionType::Bet, 10)]).await });
        }

        let mut ok = 0;
        while let Some(result) = tasks.join_next().await {
            if result.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, N);
        assert_eq!(store.get_wallet(1).await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_one_extra_concurrent_debit_is_rejected() {
        const N: i64 = 20;
        let store = funded(N * 10).await;

        let mut tasks = JoinSet::new();
        for _ in 0..=N {
            let store = Arc::clone(&store);
            tasks.spawn(async move { store.apply(1, &[op(TransactionType::Bet, 10)]).await });
        }

        let mut insufficient = 0;
        while let Some(result) = tasks.join_next().await {
            if let Err(WalletError::InsufficientBalance { .. }) = result.unwrap() {
                insufficient += 1;
            }
        }
        assert_eq!(insufficient, 1);
        assert_eq!(store.get_wallet(1).await.unwrap().balance, 0);
    }

    #[tokio::test]
    async fn test_transactions_newest_first_with_filter() {
        let store = funded(1000).await;
        let session = TransactionRef::session("s-1");
        store
            .apply(
                1,
                &[
                    LedgerOp::new(TransactionType::Bet, 10, session.clone()),
                    LedgerOp::new(TransactionType::Win, 30, session),
                ],
            )
            .await
            .unwrap();
        store
            .apply(1, &[op(TransactionType::Withdraw, 100)])
            .await
            .unwrap();

        let all = store
            .get_transactions(1, &TransactionFilter::default(), PageRequest::new(1, 2))
            .await
            .unwrap();
        assert_eq!(all.total, 4);
        assert_eq!(all.items.len(), 2);
        assert_eq!(all.items[0].tx_type, TransactionType::Withdraw);
        assert_eq!(all.items[1].tx_type, TransactionType::Win);

        let filter = TransactionFilter {
            ref_id: Some("s-1".to_string()),
            ..TransactionFilter::default()
        };
        let by_session = store
            .get_transactions(1, &filter, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(by_session.total, 2);
    }

    #[tokio::test]
    async fn test_frozen_funds_are_not_spendable() {
        let store = funded(100).await;
        store.freeze(1, 80).await.unwrap();

        let err = store
            .apply(1, &[op(TransactionType::Bet, 30)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WalletError::InsufficientBalance {
                available: 20,
                required: 30,
                ..
            }
        ));

        let wallet = store.unfreeze(1, 80).await.unwrap();
        assert_eq!(wallet.available(), 100);
        assert!(store.unfreeze(1, 1).await.is_err());
    }
}
