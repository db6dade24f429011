//! Session manager: registry of live session actors.

use super::{
    actor::{SessionActor, SessionHandle},
    config::SessionConfig,
    errors::{SessionError, SessionResult},
    messages::SessionMessage,
    models::{
        BatchSpinResult, EarlyStopPolicy, GameSession, MAX_SESSION_ID_LEN, SessionId,
        SessionSnapshot, SessionState, SettleResult, SpinResult, StartGameResult,
    },
};
use crate::{
    diagnostics::{DiagnosticRecord, DiagnosticsSink},
    history::SessionHistory,
    hub::{EventPublisher, HubEvent},
    jackpot::{JackpotRegistry, PoolKey},
    paytable::PaytableEvaluator,
    wallet::{LedgerOp, TransactionRef, TransactionType, UserId, WalletManager},
};
use chrono::{DateTime, Utc};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Weak},
};
use tokio::{
    sync::{Mutex, RwLock, oneshot},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

/// Collaborators shared by every session actor
pub struct SessionServices {
    pub wallet: Arc<WalletManager>,
    pub jackpots: Arc<JackpotRegistry>,
    pub evaluator: Arc<dyn PaytableEvaluator>,
    pub history: Arc<dyn SessionHistory>,
    pub events: Arc<dyn EventPublisher>,
    pub diagnostics: Option<DiagnosticsSink>,
}

#[derive(Default)]
struct SessionRegistry {
    live: HashMap<SessionId, SessionHandle>,
    /// Ids whose opening debit is in flight
    reserved: HashSet<SessionId>,
}

impl SessionRegistry {
    fn prune_closed(&mut self) {
        self.live.retain(|_, handle| !handle.is_closed());
    }

    fn occupied(&self) -> usize {
        self.live.len() + self.reserved.len()
    }
}

struct ManagerInner {
    config: SessionConfig,
    services: Arc<SessionServices>,
    registry: RwLock<SessionRegistry>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Session manager coordinating all live sessions
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<ManagerInner>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, services: SessionServices) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                services: Arc::new(services),
                registry: RwLock::new(SessionRegistry::default()),
                sweeper: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn services(&self) -> &SessionServices {
        &self.inner.services
    }

    fn jackpot_key(&self) -> PoolKey {
        PoolKey::new(&self.inner.config.game_id, &self.inner.config.jackpot_type)
    }

    /// Open a session: debit the opening bet and spawn the session actor.
    ///
    /// Once started the operation runs to completion even if the caller
    /// stops waiting, so a committed debit always ends with a live session.
    pub async fn start_game(
        &self,
        user_id: UserId,
        session_id: &str,
        bet_amount: i64,
    ) -> SessionResult<StartGameResult> {
        self.inner.config.check_bet(bet_amount)?;
        if session_id.is_empty() || session_id.len() > MAX_SESSION_ID_LEN {
            return Err(SessionError::InvalidSessionId(session_id.to_string()));
        }

        let manager = self.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move { manager.open_session(user_id, session_id, bet_amount).await })
            .await
            .map_err(|e| SessionError::Internal(format!("start_game task failed: {e}")))?
    }

    async fn open_session(
        &self,
        user_id: UserId,
        session_id: SessionId,
        bet_amount: i64,
    ) -> SessionResult<StartGameResult> {
        {
            let mut registry = self.inner.registry.write().await;
            registry.prune_closed();
            if registry.occupied() >= self.inner.config.max_sessions {
                return Err(SessionError::CapacityExceeded(self.inner.config.max_sessions));
            }
            if registry.live.contains_key(&session_id) || registry.reserved.contains(&session_id) {
                return Err(SessionError::SessionExists(session_id));
            }
            registry.reserved.insert(session_id.clone());
        }

        let services = &self.inner.services;
        let opening = LedgerOp::new(
            TransactionType::Bet,
            bet_amount,
            TransactionRef::session(&session_id),
        );
        let commit = match services.wallet.commit(user_id, &[opening]).await {
            Ok(commit) => commit,
            Err(e) => {
                self.inner.registry.write().await.reserved.remove(&session_id);
                log::debug!(
                    "Session {} not opened for user {}: {}",
                    session_id,
                    user_id,
                    e
                );
                return Err(e.into());
            }
        };

        let mut session = GameSession::new(
            session_id.clone(),
            user_id,
            self.inner.config.game_id.clone(),
            bet_amount,
        );
        session.state = SessionState::Active;
        session.bet_prepaid = true;

        let key = self.jackpot_key();
        let jackpot_key = if services.jackpots.contains(&key).await {
            Some(key)
        } else {
            None
        };

        let snapshot = session.snapshot();
        let start_event = HubEvent::game_start(&session, commit.wallet.balance);
        let (actor, handle) = SessionActor::new(
            session,
            Arc::clone(services),
            jackpot_key,
            self.inner.config.inbox_capacity,
        );
        tokio::spawn(actor.run());

        {
            let mut registry = self.inner.registry.write().await;
            registry.reserved.remove(&session_id);
            registry.live.insert(session_id.clone(), handle);
        }

        if let Some(diagnostics) = &services.diagnostics {
            diagnostics.record(
                DiagnosticRecord::new("start")
                    .user(user_id)
                    .session(session_id.clone())
                    .detail(serde_json::json!({
                        "bet": bet_amount,
                        "balance": commit.wallet.balance,
                    })),
            );
        }

        services.events.publish(start_event).await;
        services.wallet.notify_balance(&commit.wallet).await;

        log::info!(
            "Session {} started for user {} with bet {}",
            session_id,
            user_id,
            bet_amount
        );

        Ok(StartGameResult {
            balance: commit.wallet.balance_view(),
            session: snapshot,
        })
    }

    /// Look up a live session owned by `user_id`
    async fn handle_for(&self, user_id: UserId, session_id: &str) -> SessionResult<SessionHandle> {
        let registry = self.inner.registry.read().await;
        let handle = registry
            .live
            .get(session_id)
            .filter(|h| !h.is_closed())
            .ok_or_else(|| SessionError::SessionNotFound(session_id.to_string()))?;
        if handle.user_id() != user_id {
            return Err(SessionError::Forbidden);
        }
        Ok(handle.clone())
    }

    async fn forget(&self, session_id: &str) {
        self.inner.registry.write().await.live.remove(session_id);
    }

    /// Send a request to the session and wait for its reply
    async fn request<T, F>(&self, user_id: UserId, session_id: &str, build: F) -> SessionResult<T>
    where
        F: FnOnce(oneshot::Sender<T>) -> SessionMessage,
    {
        let handle = self.handle_for(user_id, session_id).await?;
        let (tx, rx) = oneshot::channel();

        let reply = match handle.send(build(tx)).await {
            Ok(()) => rx
                .await
                .map_err(|_| SessionError::SessionNotFound(session_id.to_string())),
            Err(e) => Err(e),
        };
        if reply.is_err() {
            self.forget(session_id).await;
        }
        reply
    }

    pub async fn spin(&self, user_id: UserId, session_id: &str) -> SessionResult<SpinResult> {
        self.request(user_id, session_id, |response| SessionMessage::Spin { response })
            .await?
    }

    pub async fn batch_spin(
        &self,
        user_id: UserId,
        session_id: &str,
        count: u32,
        policy: EarlyStopPolicy,
    ) -> SessionResult<BatchSpinResult> {
        if !(1..=super::config::MAX_BATCH_SPINS).contains(&count) {
            return Err(SessionError::InvalidSpinCount(count));
        }
        self.request(user_id, session_id, |response| SessionMessage::BatchSpin {
            count,
            policy,
            response,
        })
        .await?
    }

    /// Settle and close the session. A second settle finds no session.
    pub async fn settle(&self, user_id: UserId, session_id: &str) -> SessionResult<SettleResult> {
        let result = self
            .request(user_id, session_id, |response| SessionMessage::Settle { response })
            .await?;
        if result.is_ok() {
            self.forget(session_id).await;
        }
        result
    }

    pub async fn get_session_info(
        &self,
        user_id: UserId,
        session_id: &str,
    ) -> SessionResult<SessionSnapshot> {
        self.request(user_id, session_id, |response| SessionMessage::GetInfo { response })
            .await
    }

    /// Snapshots of a user's live sessions, ordered by start time
    pub async fn list_user_sessions(&self, user_id: UserId) -> Vec<SessionSnapshot> {
        let handles: Vec<SessionHandle> = {
            let registry = self.inner.registry.read().await;
            registry
                .live
                .values()
                .filter(|h| h.user_id() == user_id && !h.is_closed())
                .cloned()
                .collect()
        };

        let snapshots = futures_util::future::join_all(handles.iter().map(|handle| async move {
            let (tx, rx) = oneshot::channel();
            handle
                .send(SessionMessage::GetInfo { response: tx })
                .await
                .ok()?;
            rx.await.ok()
        }))
        .await;

        let mut sessions: Vec<SessionSnapshot> = snapshots.into_iter().flatten().collect();
        sessions.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        sessions
    }

    pub async fn active_session_count(&self) -> usize {
        let registry = self.inner.registry.read().await;
        registry.live.values().filter(|h| !h.is_closed()).count()
    }

    /// Expire sessions idle past the timeout as of `now`
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<SessionId> {
        let handles: Vec<SessionHandle> = {
            let registry = self.inner.registry.read().await;
            registry.live.values().cloned().collect()
        };
        let timeout = chrono::Duration::from_std(self.inner.config.session_timeout())
            .unwrap_or(chrono::Duration::MAX);

        let mut removed = Vec::new();
        for handle in handles {
            let (tx, rx) = oneshot::channel();
            let message = SessionMessage::Expire {
                now,
                timeout,
                response: tx,
            };
            let gone = match handle.send(message).await {
                Ok(()) => rx.await.unwrap_or(true),
                Err(_) => true,
            };
            if gone {
                removed.push(handle.session_id().to_string());
            }
        }

        if !removed.is_empty() {
            let mut registry = self.inner.registry.write().await;
            for session_id in &removed {
                registry.live.remove(session_id);
            }
            log::info!("Swept {} expired sessions", removed.len());
        }
        removed.sort();
        removed
    }

    /// Start the periodic expiry sweep. Calling it twice is a no-op.
    pub async fn start_sweeper(&self) {
        let mut sweeper = self.inner.sweeper.lock().await;
        if sweeper.is_some() {
            return;
        }

        let weak: Weak<ManagerInner> = Arc::downgrade(&self.inner);
        let period = self.inner.config.sweep_interval();
        *sweeper = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                let manager = SessionManager { inner };
                manager.sweep_expired(Utc::now()).await;
            }
        }));
        log::info!("Session sweeper running every {:?}", period);
    }

    /// Stop the sweeper and close every session actor
    pub async fn shutdown(&self) {
        if let Some(task) = self.inner.sweeper.lock().await.take() {
            task.abort();
        }

        let handles: Vec<SessionHandle> = {
            let mut registry = self.inner.registry.write().await;
            registry.reserved.clear();
            registry.live.drain().map(|(_, h)| h).collect()
        };
        for handle in &handles {
            let _ = handle.send(SessionMessage::Close).await;
        }
        log::info!("Session manager shut down ({} sessions closed)", handles.len());
    }
}
