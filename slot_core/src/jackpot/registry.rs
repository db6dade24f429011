//! In-process jackpot pool registry with optional write-through storage.

use super::{
    errors::{JackpotError, JackpotResult},
    models::{Contribution, JackpotConfig, JackpotPool, JackpotWin, JackpotWinRecord, PoolKey},
    store::JackpotStore,
};
use crate::wallet::UserId;
use chrono::Utc;
use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};
use tokio::sync::Mutex;

/// Payout records kept per registry
pub const MAX_HISTORY: usize = 1_000;

#[derive(Default)]
struct RegistryState {
    pools: HashMap<PoolKey, JackpotPool>,
    history: VecDeque<JackpotWinRecord>,
}

/// Jackpot pools keyed by `(game_id, jackpot_type)`.
///
/// Contribute and claim are each a single critical section, so a pool can
/// never be paid twice for the same accumulated amount. Store writes happen
/// inside the same section and therefore land in order.
#[derive(Default)]
pub struct JackpotRegistry {
    state: Mutex<RegistryState>,
    store: Option<Arc<dyn JackpotStore>>,
}

impl JackpotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry seeded with one pool per config for `game_id`
    pub fn with_pools(game_id: &str, configs: &[JackpotConfig]) -> JackpotResult<Self> {
        let mut pools = HashMap::new();
        for config in configs {
            config.validate().map_err(JackpotError::InvalidConfig)?;
            let pool = JackpotPool::new(game_id, config);
            pools.insert(pool.key.clone(), pool);
        }

        Ok(Self {
            state: Mutex::new(RegistryState {
                pools,
                history: VecDeque::new(),
            }),
            store: None,
        })
    }

    /// Registry backed by `store`.
    ///
    /// Stored pools keep their amount and counters but take the configured
    /// settings; pools missing from the store are seeded at their minimum.
    pub async fn open(
        game_id: &str,
        configs: &[JackpotConfig],
        store: Arc<dyn JackpotStore>,
    ) -> JackpotResult<Self> {
        let mut stored: HashMap<PoolKey, JackpotPool> = store
            .load_pools()
            .await?
            .into_iter()
            .map(|pool| (pool.key.clone(), pool))
            .collect();

        let mut pools = HashMap::new();
        for config in configs {
            config.validate().map_err(JackpotError::InvalidConfig)?;
            let fresh = JackpotPool::new(game_id, config);

            let pool = match stored.remove(&fresh.key) {
                Some(mut pool) => {
                    pool.min_amount = fresh.min_amount;
                    pool.max_amount = fresh.max_amount;
                    pool.percentage_bps = fresh.percentage_bps;
                    pool.win_probability = fresh.win_probability;
                    pool.amount = pool.amount.min(pool.max_amount);
                    store.save_pool(&pool).await?;
                    log::info!("Jackpot pool {} loaded with {}", pool.key, pool.amount);
                    pool
                }
                None => {
                    store.seed_pool(&fresh).await?;
                    log::info!("Jackpot pool {} seeded with {}", fresh.key, fresh.amount);
                    fresh
                }
            };
            pools.insert(pool.key.clone(), pool);
        }

        let mut history: VecDeque<_> = store.load_history(MAX_HISTORY).await?.into();
        history.make_contiguous().reverse();

        Ok(Self {
            state: Mutex::new(RegistryState { pools, history }),
            store: Some(store),
        })
    }

    /// Write `pool` through to the store; a failure is logged and repaired by
    /// the next write of the same pool
    async fn save(&self, pool: &JackpotPool) {
        let Some(store) = &self.store else { return };
        if let Err(e) = store.save_pool(pool).await {
            log::warn!("Jackpot pool {} not persisted: {}", pool.key, e);
        }
    }

    /// Add or replace a pool
    pub async fn insert(&self, pool: JackpotPool) -> JackpotResult<()> {
        let mut state = self.state.lock().await;
        if let Some(store) = &self.store {
            store.seed_pool(&pool).await?;
            store.save_pool(&pool).await?;
        }
        log::info!("Jackpot pool {} seeded with {}", pool.key, pool.amount);
        state.pools.insert(pool.key.clone(), pool);
        Ok(())
    }

    /// Add `bet_amount × percentage` to the pool, capped at `max_amount`.
    ///
    /// Returns the amount actually added, tagged with the pool's claim count.
    pub async fn contribute(&self, key: &PoolKey, bet_amount: i64) -> JackpotResult<Contribution> {
        let mut state = self.state.lock().await;
        let pool = state
            .pools
            .get_mut(key)
            .ok_or_else(|| JackpotError::PoolNotFound(key.clone()))?;

        let target = pool
            .amount
            .saturating_add(pool.contribution_for(bet_amount))
            .min(pool.max_amount);
        let added = (target - pool.amount).max(0);
        pool.amount += added;
        pool.total_in += added;

        let contribution = Contribution {
            amount: added,
            win_count: pool.win_count,
        };
        if added > 0 {
            self.save(pool).await;
        }
        Ok(contribution)
    }

    /// Take back a contribution whose spin never committed.
    ///
    /// Once the pool has been claimed since the contribution, the contribution
    /// was paid out with it and nothing is taken back. Returns whether the
    /// pool changed.
    pub async fn revert_contribution(
        &self,
        key: &PoolKey,
        contribution: &Contribution,
    ) -> JackpotResult<bool> {
        let mut state = self.state.lock().await;
        let pool = state
            .pools
            .get_mut(key)
            .ok_or_else(|| JackpotError::PoolNotFound(key.clone()))?;

        if pool.win_count != contribution.win_count {
            log::debug!(
                "Jackpot {} claimed since contribution of {}; leaving pool at {}",
                key,
                contribution.amount,
                pool.amount
            );
            return Ok(false);
        }

        let removed = contribution
            .amount
            .clamp(0, pool.total_in)
            .min(pool.amount);
        if removed == 0 {
            return Ok(false);
        }
        pool.amount -= removed;
        pool.total_in -= removed;
        self.save(pool).await;
        Ok(true)
    }

    /// Claim the pool if it is eligible and `decide` says so.
    ///
    /// `decide` sees the pool under the registry lock; it should only roll
    /// against the pool's probability. With a store attached the claim is
    /// persisted before it takes effect, and a failed write leaves the pool
    /// untouched.
    pub async fn try_claim<F>(
        &self,
        key: &PoolKey,
        user_id: UserId,
        session_id: &str,
        decide: F,
    ) -> JackpotResult<Option<JackpotWin>>
    where
        F: FnOnce(&JackpotPool) -> bool,
    {
        let mut state = self.state.lock().await;
        let pool = state
            .pools
            .get_mut(key)
            .ok_or_else(|| JackpotError::PoolNotFound(key.clone()))?;

        if !pool.is_eligible() || !decide(&*pool) {
            return Ok(None);
        }

        let now = Utc::now();
        let win = JackpotWin {
            pool: key.clone(),
            amount: pool.amount,
            user_id,
            session_id: session_id.to_string(),
            won_at: now,
            previous: Some((pool.last_won_at, pool.last_winner)),
        };
        let record = JackpotWinRecord {
            pool: key.clone(),
            user_id,
            session_id: win.session_id.clone(),
            amount: win.amount,
            won_at: now,
        };

        let mut claimed = pool.clone();
        claimed.amount = claimed.min_amount;
        claimed.win_count += 1;
        claimed.total_out += win.amount;
        claimed.last_won_at = Some(now);
        claimed.last_winner = Some(user_id);

        if let Some(store) = &self.store {
            store.record_claim(&claimed, &record).await?;
        }
        *pool = claimed;

        log::info!(
            "Jackpot {} won by user {} in session {}: {}",
            key,
            user_id,
            session_id,
            win.amount
        );

        state.history.push_back(record);
        if state.history.len() > MAX_HISTORY {
            state.history.pop_front();
        }

        Ok(Some(win))
    }

    /// Undo a claim whose ledger unit failed.
    ///
    /// Contributions made since the claim stay in the pool.
    pub async fn restore(&self, win: &JackpotWin) -> JackpotResult<()> {
        let mut state = self.state.lock().await;
        let pool = state
            .pools
            .get_mut(&win.pool)
            .ok_or_else(|| JackpotError::PoolNotFound(win.pool.clone()))?;

        let accrued_since = (pool.amount - pool.min_amount).max(0);
        pool.amount = win.amount.saturating_add(accrued_since).min(pool.max_amount);
        pool.win_count = pool.win_count.saturating_sub(1);
        pool.total_out -= win.amount;
        if let Some((last_won_at, last_winner)) = win.previous {
            pool.last_won_at = last_won_at;
            pool.last_winner = last_winner;
        }

        let record = JackpotWinRecord {
            pool: win.pool.clone(),
            user_id: win.user_id,
            session_id: win.session_id.clone(),
            amount: win.amount,
            won_at: win.won_at,
        };
        if let Some(store) = &self.store {
            if let Err(e) = store.remove_claim(pool, &record).await {
                log::warn!("Jackpot {} restore not persisted: {}", win.pool, e);
            }
        }

        if let Some(pos) = state.history.iter().rposition(|r| r == &record) {
            state.history.remove(pos);
        }

        log::warn!(
            "Jackpot {} claim by user {} restored ({})",
            win.pool,
            win.user_id,
            win.amount
        );
        Ok(())
    }

    pub async fn get(&self, key: &PoolKey) -> Option<JackpotPool> {
        self.state.lock().await.pools.get(key).cloned()
    }

    pub async fn contains(&self, key: &PoolKey) -> bool {
        self.state.lock().await.pools.contains_key(key)
    }

    pub async fn list(&self) -> Vec<JackpotPool> {
        let mut pools: Vec<_> = self.state.lock().await.pools.values().cloned().collect();
        pools.sort_by(|a, b| a.key.to_string().cmp(&b.key.to_string()));
        pools
    }

    /// Most recent payouts for a pool, newest first
    pub async fn history(&self, key: &PoolKey, limit: usize) -> Vec<JackpotWinRecord> {
        self.state
            .lock()
            .await
            .history
            .iter()
            .rev()
            .filter(|r| &r.pool == key)
            .take(limit)
            .cloned()
            .collect()
    }
}
