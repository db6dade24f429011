//! PostgreSQL connection pooling shared by the ledger, session history and
//! jackpot stores.
//!
//! The schema is owned by the deployment; [`Database::ensure_schema`] applies the
//! bundled DDL for development and tests.

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

pub mod config;
pub mod timeouts;

pub use config::DatabaseConfig;

/// Ledger, session history and jackpot tables
pub const SCHEMA: &str = include_str!("../../migrations/001_schema.sql");

/// Shared Postgres pool
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Open a pool sized by `config`.
    ///
    /// ```no_run
    /// use slot_core::db::{Database, DatabaseConfig};
    ///
    /// # async fn example() -> Result<(), sqlx::Error> {
    /// let db = Database::new(&DatabaseConfig::development()).await?;
    /// db.ensure_schema().await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(config.max_lifetime_secs));
        let pool = options.connect(&config.database_url).await?;

        log::info!(
            "Postgres pool open ({}..={} connections)",
            config.min_connections,
            config.max_connections
        );
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply [`SCHEMA`]; every statement is `IF NOT EXISTS`
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    /// Round trip a trivial statement
    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map(|_| ())
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
