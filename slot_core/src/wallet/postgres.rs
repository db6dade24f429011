//! PostgreSQL ledger store.
#![allow(clippy::needless_raw_string_hashes)]

use super::{
    errors::{WalletError, WalletResult},
    models::{
        EntryDirection, LedgerCommit, LedgerOp, PageRequest, TransactionFilter, TransactionPage,
        TransactionStatus, UserId, Wallet, WalletTransaction, generate_order_no,
    },
    store::LedgerStore,
};
use crate::db::timeouts::{with_default_timeout, with_transaction_timeout};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction, postgres::PgRow};
use std::sync::Arc;

const WALLET_COLUMNS: &str = "user_id, balance, frozen_balance, total_deposit, total_withdraw, \
     total_bet, total_win, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, order_no, user_id, tx_type, amount, before_balance, \
     after_balance, ref_type, ref_id, status, created_at";

/// Ledger store backed by `wallets` and `wallet_transactions`.
///
/// Each unit runs in one database transaction holding the wallet row lock
/// (`SELECT ... FOR UPDATE`); an uncommitted transaction rolls back on drop.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: Arc<PgPool>,
}

impl PgLedgerStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn lock_wallet(
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
    ) -> WalletResult<Wallet> {
        let row = with_default_timeout(
            sqlx::query(&format!(
                "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1 FOR UPDATE"
            ))
            .bind(user_id)
            .fetch_optional(&mut **tx),
        )
        .await?
        .ok_or(WalletError::WalletNotFound(user_id))?;

        Ok(wallet_from_row(&row))
    }

    async fn ensure_wallet(
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
    ) -> WalletResult<()> {
        with_default_timeout(
            sqlx::query(
                "INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(user_id)
            .execute(&mut **tx),
        )
        .await?;
        Ok(())
    }

    async fn store_wallet(tx: &mut Transaction<'_, Postgres>, wallet: &Wallet) -> WalletResult<()> {
        with_default_timeout(
            sqlx::query(
                r#"
                UPDATE wallets
                SET balance = $2, frozen_balance = $3, total_deposit = $4,
                    total_withdraw = $5, total_bet = $6, total_win = $7, updated_at = NOW()
                WHERE user_id = $1
                "#,
            )
            .bind(wallet.user_id)
            .bind(wallet.balance)
            .bind(wallet.frozen_balance)
            .bind(wallet.total_deposit)
            .bind(wallet.total_withdraw)
            .bind(wallet.total_bet)
            .bind(wallet.total_win)
            .execute(&mut **tx),
        )
        .await?;
        Ok(())
    }

    async fn insert_transaction(
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
        op: &LedgerOp,
        before: i64,
        after: i64,
    ) -> WalletResult<WalletTransaction> {
        let order_no = generate_order_no(op.tx_type);
        let row = with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO wallet_transactions
                    (order_no, user_id, tx_type, amount, before_balance, after_balance,
                     ref_type, ref_id, status)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id, created_at
                "#,
            )
            .bind(&order_no)
            .bind(user_id)
            .bind(op.tx_type.as_str())
            .bind(op.amount)
            .bind(before)
            .bind(after)
            .bind(&op.reference.ref_type)
            .bind(&op.reference.ref_id)
            .bind(TransactionStatus::Completed.to_string())
            .fetch_one(&mut **tx),
        )
        .await?;

        Ok(WalletTransaction {
            id: row.get("id"),
            order_no,
            user_id,
            tx_type: op.tx_type,
            amount: op.amount,
            before_balance: before,
            after_balance: after,
            ref_type: op.reference.ref_type.clone(),
            ref_id: op.reference.ref_id.clone(),
            status: TransactionStatus::Completed,
            created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        })
    }
}

fn wallet_from_row(row: &PgRow) -> Wallet {
    Wallet {
        user_id: row.get("user_id"),
        balance: row.get("balance"),
        frozen_balance: row.get("frozen_balance"),
        total_deposit: row.get("total_deposit"),
        total_withdraw: row.get("total_withdraw"),
        total_bet: row.get("total_bet"),
        total_win: row.get("total_win"),
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
        updated_at: row.get::<chrono::NaiveDateTime, _>("updated_at").and_utc(),
    }
}

fn transaction_from_row(row: &PgRow) -> WalletResult<WalletTransaction> {
    let status: String = row.get("status");
    if status != "completed" {
        return Err(WalletError::CorruptRow(format!("unknown status '{status}'")));
    }

    Ok(WalletTransaction {
        id: row.get("id"),
        order_no: row.get("order_no"),
        user_id: row.get("user_id"),
        tx_type: row.get::<String, _>("tx_type").parse()?,
        amount: row.get("amount"),
        before_balance: row.get("before_balance"),
        after_balance: row.get("after_balance"),
        ref_type: row.get("ref_type"),
        ref_id: row.get("ref_id"),
        status: TransactionStatus::Completed,
        created_at: row.get::<chrono::NaiveDateTime, _>("created_at").and_utc(),
    })
}

fn push_filter<'a>(
    qb: &mut QueryBuilder<'a, Postgres>,
    user_id: UserId,
    filter: &'a TransactionFilter,
) {
    qb.push(" WHERE user_id = ").push_bind(user_id);
    if let Some(tx_type) = filter.tx_type {
        qb.push(" AND tx_type = ").push_bind(tx_type.as_str());
    }
    if let Some(ref_type) = &filter.ref_type {
        qb.push(" AND ref_type = ").push_bind(ref_type);
    }
    if let Some(ref_id) = &filter.ref_id {
        qb.push(" AND ref_id = ").push_bind(ref_id);
    }
    if let Some(since) = filter.since {
        qb.push(" AND created_at >= ").push_bind(since.naive_utc());
    }
    if let Some(until) = filter.until {
        qb.push(" AND created_at < ").push_bind(until.naive_utc());
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn apply(&self, user_id: UserId, ops: &[LedgerOp]) -> WalletResult<LedgerCommit> {
        let mut tx = with_transaction_timeout(self.pool.begin()).await?;

        let credits_only = ops
            .iter()
            .all(|op| op.tx_type.direction() == EntryDirection::Credit);
        if credits_only && !ops.is_empty() {
            Self::ensure_wallet(&mut tx, user_id).await?;
        }

        let mut wallet = Self::lock_wallet(&mut tx, user_id).await?;
        let mut transactions = Vec::with_capacity(ops.len());
        for op in ops {
            let (before, after) = wallet.apply_op(op)?;
            transactions.push(Self::insert_transaction(&mut tx, user_id, op, before, after).await?);
        }

        if !transactions.is_empty() {
            Self::store_wallet(&mut tx, &wallet).await?;
        }
        with_transaction_timeout(tx.commit()).await?;

        log::debug!(
            "Ledger unit committed for user {}: {} transaction(s), balance {}",
            user_id,
            transactions.len(),
            wallet.balance
        );

        Ok(LedgerCommit {
            wallet,
            transactions,
        })
    }

    async fn get_wallet(&self, user_id: UserId) -> WalletResult<Wallet> {
        let row = with_default_timeout(
            sqlx::query(&format!(
                "SELECT {WALLET_COLUMNS} FROM wallets WHERE user_id = $1"
            ))
            .bind(user_id)
            .fetch_optional(self.pool.as_ref()),
        )
        .await?
        .ok_or(WalletError::WalletNotFound(user_id))?;

        Ok(wallet_from_row(&row))
    }

    async fn open_wallet(&self, user_id: UserId) -> WalletResult<Wallet> {
        with_default_timeout(
            sqlx::query(
                "INSERT INTO wallets (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(user_id)
            .execute(self.pool.as_ref()),
        )
        .await?;
        self.get_wallet(user_id).await
    }

    async fn get_transactions(
        &self,
        user_id: UserId,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> WalletResult<TransactionPage> {
        page.validate()?;

        let mut count = QueryBuilder::new("SELECT COUNT(*) FROM wallet_transactions");
        push_filter(&mut count, user_id, filter);
        let total: i64 = with_default_timeout(
            count
                .build_query_scalar()
                .fetch_one(self.pool.as_ref()),
        )
        .await?;

        let mut query =
            QueryBuilder::new(format!("SELECT {TRANSACTION_COLUMNS} FROM wallet_transactions"));
        push_filter(&mut query, user_id, filter);
        query
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(i64::from(page.page_size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));

        let rows = with_default_timeout(query.build().fetch_all(self.pool.as_ref())).await?;
        let items = rows
            .iter()
            .map(transaction_from_row)
            .collect::<WalletResult<Vec<_>>>()?;

        Ok(TransactionPage {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn freeze(&self, user_id: UserId, amount: i64) -> WalletResult<Wallet> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }

        let mut tx = with_transaction_timeout(self.pool.begin()).await?;
        let mut wallet = Self::lock_wallet(&mut tx, user_id).await?;
        if amount > wallet.available() {
            return Err(WalletError::InsufficientBalance {
                user_id,
                available: wallet.available(),
                required: amount,
            });
        }
        wallet.frozen_balance += amount;
        Self::store_wallet(&mut tx, &wallet).await?;
        with_transaction_timeout(tx.commit()).await?;
        Ok(wallet)
    }

    async fn unfreeze(&self, user_id: UserId, amount: i64) -> WalletResult<Wallet> {
        if amount <= 0 {
            return Err(WalletError::InvalidAmount(amount));
        }

        let mut tx = with_transaction_timeout(self.pool.begin()).await?;
        let mut wallet = Self::lock_wallet(&mut tx, user_id).await?;
        if amount > wallet.frozen_balance {
            return Err(WalletError::InvalidAmount(amount));
        }
        wallet.frozen_balance -= amount;
        Self::store_wallet(&mut tx, &wallet).await?;
        with_transaction_timeout(tx.commit()).await?;
        Ok(wallet)
    }
}
