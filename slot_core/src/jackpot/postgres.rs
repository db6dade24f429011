//! PostgreSQL jackpot store.
#![allow(clippy::needless_raw_string_hashes)]

use super::{
    errors::{JackpotError, JackpotResult},
    models::{JackpotPool, JackpotWinRecord, PoolKey},
    store::JackpotStore,
};
use crate::db::timeouts::{with_default_timeout, with_transaction_timeout};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use std::sync::Arc;

const POOL_COLUMNS: &str = "game_id, jackpot_type, amount, min_amount, max_amount, \
     percentage_bps, win_probability, win_count, total_in, total_out, last_won_at, last_winner";

const HISTORY_COLUMNS: &str = "game_id, jackpot_type, user_id, session_id, amount, won_at";

/// Jackpot store backed by `jackpots` and `jackpot_histories`.
///
/// A claim or its undo holds the pool row lock (`SELECT ... FOR UPDATE`) for
/// the pool update and the history write.
#[derive(Clone)]
pub struct PgJackpotStore {
    pool: Arc<PgPool>,
}

impl PgJackpotStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn lock_pool(tx: &mut Transaction<'_, Postgres>, key: &PoolKey) -> JackpotResult<()> {
        with_default_timeout(
            sqlx::query(
                "SELECT amount FROM jackpots WHERE game_id = $1 AND jackpot_type = $2 FOR UPDATE",
            )
            .bind(&key.game_id)
            .bind(&key.jackpot_type)
            .fetch_optional(&mut **tx),
        )
        .await?
        .ok_or_else(|| JackpotError::PoolNotFound(key.clone()))?;
        Ok(())
    }

    async fn update_pool(tx: &mut Transaction<'_, Postgres>, pool: &JackpotPool) -> JackpotResult<()> {
        let updated = with_default_timeout(
            sqlx::query(
                r#"
                UPDATE jackpots
                SET amount = $3, min_amount = $4, max_amount = $5, percentage_bps = $6,
                    win_probability = $7, win_count = $8, total_in = $9, total_out = $10,
                    last_won_at = $11, last_winner = $12, updated_at = NOW()
                WHERE game_id = $1 AND jackpot_type = $2
                "#,
            )
            .bind(&pool.key.game_id)
            .bind(&pool.key.jackpot_type)
            .bind(pool.amount)
            .bind(pool.min_amount)
            .bind(pool.max_amount)
            .bind(i32::try_from(pool.percentage_bps).unwrap_or(i32::MAX))
            .bind(pool.win_probability)
            .bind(i64::try_from(pool.win_count).unwrap_or(i64::MAX))
            .bind(pool.total_in)
            .bind(pool.total_out)
            .bind(pool.last_won_at.map(|t| t.naive_utc()))
            .bind(pool.last_winner)
            .execute(&mut **tx),
        )
        .await?;

        if updated.rows_affected() == 0 {
            return Err(JackpotError::PoolNotFound(pool.key.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl JackpotStore for PgJackpotStore {
    async fn load_pools(&self) -> JackpotResult<Vec<JackpotPool>> {
        let rows = with_default_timeout(
            sqlx::query(&format!("SELECT {POOL_COLUMNS} FROM jackpots"))
                .fetch_all(self.pool.as_ref()),
        )
        .await?;

        rows.iter().map(pool_from_row).collect()
    }

    async fn load_history(&self, limit: usize) -> JackpotResult<Vec<JackpotWinRecord>> {
        let rows = with_default_timeout(
            sqlx::query(&format!(
                "SELECT {HISTORY_COLUMNS} FROM jackpot_histories ORDER BY id DESC LIMIT $1"
            ))
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(self.pool.as_ref()),
        )
        .await?;

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn seed_pool(&self, pool: &JackpotPool) -> JackpotResult<()> {
        with_default_timeout(
            sqlx::query(&format!(
                r#"
                INSERT INTO jackpots ({POOL_COLUMNS})
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (game_id, jackpot_type) DO NOTHING
                "#
            ))
            .bind(&pool.key.game_id)
            .bind(&pool.key.jackpot_type)
            .bind(pool.amount)
            .bind(pool.min_amount)
            .bind(pool.max_amount)
            .bind(i32::try_from(pool.percentage_bps).unwrap_or(i32::MAX))
            .bind(pool.win_probability)
            .bind(i64::try_from(pool.win_count).unwrap_or(i64::MAX))
            .bind(pool.total_in)
            .bind(pool.total_out)
            .bind(pool.last_won_at.map(|t| t.naive_utc()))
            .bind(pool.last_winner)
            .execute(self.pool.as_ref()),
        )
        .await?;

        log::debug!("Jackpot pool {} seeded", pool.key);
        Ok(())
    }

    async fn save_pool(&self, pool: &JackpotPool) -> JackpotResult<()> {
        let mut tx = with_transaction_timeout(self.pool.begin()).await?;
        Self::update_pool(&mut tx, pool).await?;
        with_transaction_timeout(tx.commit()).await?;
        Ok(())
    }

    async fn record_claim(&self, pool: &JackpotPool, win: &JackpotWinRecord) -> JackpotResult<()> {
        let mut tx = with_transaction_timeout(self.pool.begin()).await?;
        Self::lock_pool(&mut tx, &pool.key).await?;
        Self::update_pool(&mut tx, pool).await?;

        with_default_timeout(
            sqlx::query(&format!(
                "INSERT INTO jackpot_histories ({HISTORY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6)"
            ))
            .bind(&win.pool.game_id)
            .bind(&win.pool.jackpot_type)
            .bind(win.user_id)
            .bind(&win.session_id)
            .bind(win.amount)
            .bind(win.won_at.naive_utc())
            .execute(&mut *tx),
        )
        .await?;

        with_transaction_timeout(tx.commit()).await?;
        log::debug!("Jackpot claim on {} persisted ({})", pool.key, win.amount);
        Ok(())
    }

    async fn remove_claim(&self, pool: &JackpotPool, win: &JackpotWinRecord) -> JackpotResult<()> {
        let mut tx = with_transaction_timeout(self.pool.begin()).await?;
        Self::lock_pool(&mut tx, &pool.key).await?;
        Self::update_pool(&mut tx, pool).await?;

        with_default_timeout(
            sqlx::query(
                r#"
                DELETE FROM jackpot_histories
                WHERE id = (
                    SELECT id FROM jackpot_histories
                    WHERE game_id = $1 AND jackpot_type = $2 AND session_id = $3 AND amount = $4
                    ORDER BY id DESC
                    LIMIT 1
                )
                "#,
            )
            .bind(&win.pool.game_id)
            .bind(&win.pool.jackpot_type)
            .bind(&win.session_id)
            .bind(win.amount)
            .execute(&mut *tx),
        )
        .await?;

        with_transaction_timeout(tx.commit()).await?;
        Ok(())
    }
}

fn pool_from_row(row: &PgRow) -> JackpotResult<JackpotPool> {
    let key = PoolKey::new(
        row.get::<String, _>("game_id"),
        row.get::<String, _>("jackpot_type"),
    );
    let percentage_bps = u32::try_from(row.get::<i32, _>("percentage_bps"))
        .map_err(|_| JackpotError::CorruptRow(format!("{key}: negative percentage_bps")))?;
    let win_count = u64::try_from(row.get::<i64, _>("win_count"))
        .map_err(|_| JackpotError::CorruptRow(format!("{key}: negative win_count")))?;

    Ok(JackpotPool {
        amount: row.get("amount"),
        min_amount: row.get("min_amount"),
        max_amount: row.get("max_amount"),
        percentage_bps,
        win_probability: row.get("win_probability"),
        win_count,
        total_in: row.get("total_in"),
        total_out: row.get("total_out"),
        last_won_at: row
            .get::<Option<chrono::NaiveDateTime>, _>("last_won_at")
            .map(|t| t.and_utc()),
        last_winner: row.get("last_winner"),
        key,
    })
}

fn record_from_row(row: &PgRow) -> JackpotWinRecord {
    JackpotWinRecord {
        pool: PoolKey::new(
            row.get::<String, _>("game_id"),
            row.get::<String, _>("jackpot_type"),
        ),
        user_id: row.get("user_id"),
        session_id: row.get("session_id"),
        amount: row.get("amount"),
        won_at: row.get::<chrono::NaiveDateTime, _>("won_at").and_utc(),
    }
}
