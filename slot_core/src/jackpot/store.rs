//! Storage contract for jackpot pools and their payout history.

use super::{
    errors::JackpotResult,
    models::{JackpotPool, JackpotWinRecord, PoolKey},
};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Durable copy of the registry.
///
/// Writes carry absolute pool values, so a later write repairs an earlier
/// one that failed.
#[async_trait]
pub trait JackpotStore: Send + Sync {
    /// Every stored pool
    async fn load_pools(&self) -> JackpotResult<Vec<JackpotPool>>;

    /// Most recent payouts across all pools, newest first
    async fn load_history(&self, limit: usize) -> JackpotResult<Vec<JackpotWinRecord>>;

    /// Insert a pool unless one with the same key exists
    async fn seed_pool(&self, pool: &JackpotPool) -> JackpotResult<()>;

    /// Overwrite a pool's amount, counters and settings
    async fn save_pool(&self, pool: &JackpotPool) -> JackpotResult<()>;

    /// Store a claimed pool together with its payout row, atomically
    async fn record_claim(&self, pool: &JackpotPool, win: &JackpotWinRecord) -> JackpotResult<()>;

    /// Store a restored pool and delete the payout row of the undone claim
    async fn remove_claim(&self, pool: &JackpotPool, win: &JackpotWinRecord) -> JackpotResult<()>;
}

#[derive(Default)]
struct StoredState {
    pools: HashMap<PoolKey, JackpotPool>,
    history: Vec<JackpotWinRecord>,
}

/// Store that outlives a registry but not the process; used in tests
#[derive(Default)]
pub struct InMemoryJackpotStore {
    state: Mutex<StoredState>,
}

impl InMemoryJackpotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JackpotStore for InMemoryJackpotStore {
    async fn load_pools(&self) -> JackpotResult<Vec<JackpotPool>> {
        Ok(self.state.lock().await.pools.values().cloned().collect())
    }

    async fn load_history(&self, limit: usize) -> JackpotResult<Vec<JackpotWinRecord>> {
        Ok(self
            .state
            .lock()
            .await
            .history
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn seed_pool(&self, pool: &JackpotPool) -> JackpotResult<()> {
        self.state
            .lock()
            .await
            .pools
            .entry(pool.key.clone())
            .or_insert_with(|| pool.clone());
        Ok(())
    }

    async fn save_pool(&self, pool: &JackpotPool) -> JackpotResult<()> {
        self.state
            .lock()
            .await
            .pools
            .insert(pool.key.clone(), pool.clone());
        Ok(())
    }

    async fn record_claim(&self, pool: &JackpotPool, win: &JackpotWinRecord) -> JackpotResult<()> {
        let mut state = self.state.lock().await;
        state.pools.insert(pool.key.clone(), pool.clone());
        state.history.push(win.clone());
        Ok(())
    }

    async fn remove_claim(&self, pool: &JackpotPool, win: &JackpotWinRecord) -> JackpotResult<()> {
        let mut state = self.state.lock().await;
        state.pools.insert(pool.key.clone(), pool.clone());
        if let Some(pos) = state.history.iter().rposition(|r| r == win) {
            state.history.remove(pos);
        }
        Ok(())
    }
}
