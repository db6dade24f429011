//! Session actor: the serialization point for one game session.

use super::{
    errors::{SessionError, SessionResult},
    manager::SessionServices,
    messages::SessionMessage,
    models::{
        BatchSpinResult, EarlyStopPolicy, GameSession, SessionId, SessionState, SettleResult,
        SpinResult, StopReason,
    },
};
use crate::{
    diagnostics::DiagnosticRecord,
    history::GameRecord,
    hub::HubEvent,
    jackpot::{Contribution, JackpotWin, PoolKey},
    paytable::SpinOutcome,
    wallet::{LedgerOp, TransactionRef, TransactionType, UserId, Wallet},
};
use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Session actor handle for sending messages
#[derive(Clone, Debug)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    session_id: SessionId,
    user_id: UserId,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// The actor has stopped
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Send a message to the session
    pub async fn send(&self, message: SessionMessage) -> SessionResult<()> {
        self.sender
            .send(message)
            .await
            .map_err(|_| SessionError::SessionNotFound(self.session_id.clone()))
    }
}

/// One committed spin
struct SpinStep {
    outcome: SpinOutcome,
    wallet: Wallet,
}

enum Flow {
    Continue,
    Stop,
}

/// Actor owning a single session's state
pub struct SessionActor {
    session: GameSession,
    inbox: mpsc::Receiver<SessionMessage>,
    services: Arc<SessionServices>,
    jackpot_key: Option<PoolKey>,
    rng: StdRng,
}

impl SessionActor {
    /// Create an actor for an already-funded session
    pub fn new(
        session: GameSession,
        services: Arc<SessionServices>,
        jackpot_key: Option<PoolKey>,
        inbox_capacity: usize,
    ) -> (Self, SessionHandle) {
        let (sender, inbox) = mpsc::channel(inbox_capacity.max(1));
        let handle = SessionHandle {
            sender,
            session_id: session.session_id.clone(),
            user_id: session.user_id,
        };
        let actor = Self {
            session,
            inbox,
            services,
            jackpot_key,
            rng: StdRng::from_os_rng(),
        };
        (actor, handle)
    }

    /// Use a fixed RNG seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Run the session actor event loop
    pub async fn run(mut self) {
        log::debug!(
            "Session {} (user {}) running",
            self.session.session_id,
            self.session.user_id
        );

        while let Some(message) = self.inbox.recv().await {
            if let Flow::Stop = self.handle_message(message).await {
                break;
            }
        }

        log::debug!(
            "Session {} stopped in state {}",
            self.session.session_id,
            self.session.state
        );
    }

    async fn handle_message(&mut self, message: SessionMessage) -> Flow {
        match message {
            SessionMessage::Spin { response } => {
                let result = self.handle_spin().await;
                let _ = response.send(result);
            }

            SessionMessage::BatchSpin {
                count,
                policy,
                response,
            } => {
                let result = self.handle_batch(count, policy).await;
                let _ = response.send(result);
            }

            SessionMessage::Settle { response } => {
                let result = self.handle_settle().await;
                let settled = result.is_ok();
                let _ = response.send(result);
                if settled {
                    return Flow::Stop;
                }
            }

            SessionMessage::GetInfo { response } => {
                let _ = response.send(self.session.snapshot());
            }

            SessionMessage::Expire {
                now,
                timeout,
                response,
            } => {
                let expired = self.session.is_idle(now, timeout);
                if expired {
                    self.expire(now).await;
                }
                let _ = response.send(expired);
                if expired {
                    return Flow::Stop;
                }
            }

            SessionMessage::Close => {
                log::info!(
                    "Session {} closed at shutdown ({} spins)",
                    self.session.session_id,
                    self.session.spin_count
                );
                return Flow::Stop;
            }
        }

        Flow::Continue
    }

    fn reference(&self) -> TransactionRef {
        TransactionRef::session(&self.session.session_id)
    }

    /// Draw, evaluate, feed the jackpot and settle one spin in a single
    /// ledger unit. On failure the session is left untouched.
    async fn execute_spin(&mut self) -> SessionResult<SpinStep> {
        let services = Arc::clone(&self.services);
        let bet = self.session.bet_amount;
        let user_id = self.session.user_id;

        let mut outcome = services.evaluator.spin(&mut self.rng, bet);

        let mut contribution = Contribution::default();
        let mut jackpot: Option<JackpotWin> = None;
        if let Some(key) = &self.jackpot_key {
            contribution = services.jackpots.contribute(key, bet).await?;
            let roll: f64 = self.rng.random();
            let evaluator = &services.evaluator;
            let claim = services
                .jackpots
                .try_claim(key, user_id, &self.session.session_id, |pool| {
                    roll < evaluator.jackpot_probability(pool)
                })
                .await;
            match claim {
                Ok(win) => jackpot = win,
                Err(e) => {
                    self.undo_jackpot(contribution, None).await;
                    return Err(e.into());
                }
            }
        }

        let reference = self.reference();
        let mut ops = Vec::with_capacity(3);
        if !self.session.bet_prepaid {
            ops.push(LedgerOp::new(TransactionType::Bet, bet, reference.clone()));
        }
        if outcome.win_amount > 0 {
            ops.push(LedgerOp::new(
                TransactionType::Win,
                outcome.win_amount,
                reference.clone(),
            ));
        }
        if let Some(win) = &jackpot {
            ops.push(LedgerOp::new(TransactionType::Jackpot, win.amount, reference));
        }

        let commit = match services.wallet.commit(user_id, &ops).await {
            Ok(commit) => commit,
            Err(e) => {
                self.undo_jackpot(contribution, jackpot.as_ref()).await;
                return Err(e.into());
            }
        };

        outcome.jackpot_win = jackpot;
        let total = outcome.total_win();

        let session = &mut self.session;
        session.bet_prepaid = false;
        session.spin_count += 1;
        session.total_bet += bet;
        session.total_win += total;
        session.jackpot_win += outcome.jackpot_win.as_ref().map_or(0, |j| j.amount);
        session.last_activity_at = Utc::now();
        session.last_result = Some(outcome.clone());

        if let Some(diagnostics) = &services.diagnostics {
            diagnostics.record(
                DiagnosticRecord::new("spin")
                    .user(user_id)
                    .session(session.session_id.clone())
                    .detail(serde_json::json!({
                        "spin": session.spin_count,
                        "bet": bet,
                        "win": outcome.win_amount,
                        "jackpot": outcome.jackpot_win.as_ref().map(|j| j.amount),
                        "balance": commit.wallet.balance,
                    })),
            );
        }

        Ok(SpinStep {
            outcome,
            wallet: commit.wallet,
        })
    }

    /// Restore the claim first so a pool won by this spin gets its claim
    /// count back before the contribution is checked against it
    async fn undo_jackpot(&self, contribution: Contribution, win: Option<&JackpotWin>) {
        if let Some(win) = win {
            if let Err(e) = self.services.jackpots.restore(win).await {
                log::error!("Session {}: jackpot restore failed: {}", self.session.session_id, e);
            }
        }
        if let (Some(key), true) = (&self.jackpot_key, contribution.amount > 0) {
            if let Err(e) = self
                .services
                .jackpots
                .revert_contribution(key, &contribution)
                .await
            {
                log::error!(
                    "Session {}: jackpot contribution revert failed: {}",
                    self.session.session_id,
                    e
                );
            }
        }
    }

    async fn handle_spin(&mut self) -> SessionResult<SpinResult> {
        let step = self.execute_spin().await?;

        let events = &self.services.events;
        events
            .publish(HubEvent::game_result(&self.session, step.outcome.clone()))
            .await;
        self.services.wallet.notify_balance(&step.wallet).await;
        events.publish(HubEvent::game_state(&self.session)).await;

        Ok(SpinResult {
            outcome: step.outcome,
            balance: step.wallet.balance_view(),
            state: self.session.state,
            total_bet: self.session.total_bet,
            total_win: self.session.total_win,
            spin_count: self.session.spin_count,
        })
    }

    async fn handle_batch(
        &mut self,
        count: u32,
        policy: EarlyStopPolicy,
    ) -> SessionResult<BatchSpinResult> {
        if !(1..=super::config::MAX_BATCH_SPINS).contains(&count) {
            return Err(SessionError::InvalidSpinCount(count));
        }

        let mut spins = Vec::new();
        let mut total_bet = 0;
        let mut total_win = 0;
        let mut stop_reason = StopReason::Completed;
        let mut last_wallet = None;

        for i in 0..count {
            match self.execute_spin().await {
                Ok(step) => {
                    let win = step.outcome.total_win();
                    total_bet += step.outcome.bet_amount;
                    total_win += win;
                    last_wallet = Some(step.wallet);
                    spins.push(step.outcome);

                    if i + 1 == count {
                        break;
                    }
                    if policy.big_win_threshold.is_some_and(|t| win > t) {
                        stop_reason = StopReason::BigWin;
                        break;
                    }
                    if policy.max_total_win.is_some_and(|max| total_win >= max) {
                        stop_reason = StopReason::MaxWinReached;
                        break;
                    }
                }
                Err(e) if spins.is_empty() => return Err(e),
                Err(e) => {
                    stop_reason = if e.is_insufficient_balance() {
                        StopReason::InsufficientBalance
                    } else {
                        log::warn!(
                            "Session {}: batch stopped after {} spins: {}",
                            self.session.session_id,
                            spins.len(),
                            e
                        );
                        StopReason::Error
                    };
                    break;
                }
            }
        }

        let wallet = match last_wallet {
            Some(wallet) => wallet,
            None => self.services.wallet.get_wallet(self.session.user_id).await?,
        };

        let total_spins = spins.len() as u32;
        let stopped_early = stop_reason != StopReason::Completed;

        let events = &self.services.events;
        events
            .publish(HubEvent::BatchResult {
                user_id: self.session.user_id,
                session_id: self.session.session_id.clone(),
                total_spins,
                total_bet,
                total_win,
                stopped_early,
                stop_reason,
            })
            .await;
        self.services.wallet.notify_balance(&wallet).await;
        events.publish(HubEvent::game_state(&self.session)).await;

        Ok(BatchSpinResult {
            total_spins,
            total_bet,
            total_win,
            stopped_early,
            stop_reason,
            state: self.session.state,
            balance: wallet.balance_view(),
            spins,
        })
    }

    async fn handle_settle(&mut self) -> SessionResult<SettleResult> {
        let user_id = self.session.user_id;
        let refunded = self.session.bet_prepaid;

        let wallet = if refunded {
            let refund = LedgerOp::new(
                TransactionType::Refund,
                self.session.bet_amount,
                self.reference(),
            );
            let commit = self.services.wallet.commit(user_id, &[refund]).await?;
            self.session.bet_prepaid = false;
            commit.wallet
        } else {
            self.services.wallet.get_wallet(user_id).await?
        };

        let now = Utc::now();
        self.session.state = SessionState::Settled;
        self.session.last_activity_at = now;
        self.finish(now, "settle").await;

        if refunded {
            self.services.wallet.notify_balance(&wallet).await;
        }
        self.services
            .events
            .publish(HubEvent::game_state(&self.session))
            .await;

        log::info!(
            "Session {} settled: {} spins, bet {}, won {}",
            self.session.session_id,
            self.session.spin_count,
            self.session.total_bet,
            self.session.total_win
        );

        Ok(SettleResult {
            total_bet: self.session.total_bet,
            total_win: self.session.total_win,
            balance: wallet.balance_view(),
            rtp: self.session.rtp(),
            spin_count: self.session.spin_count,
        })
    }

    async fn expire(&mut self, now: DateTime<Utc>) {
        self.session.state = SessionState::Expired;
        self.finish(now, "expire").await;
        self.services
            .events
            .publish(HubEvent::game_state(&self.session))
            .await;
        log::info!(
            "Session {} (user {}) expired after {} spins",
            self.session.session_id,
            self.session.user_id,
            self.session.spin_count
        );
    }

    /// Write the history record; a failure here never undoes the ledger.
    async fn finish(&self, ended_at: DateTime<Utc>, kind: &str) {
        let record = GameRecord::from_session(&self.session, ended_at);
        if let Err(e) = self.services.history.record(&record).await {
            log::error!(
                "Session {}: history record failed: {}",
                self.session.session_id,
                e
            );
        }

        if let Some(diagnostics) = &self.services.diagnostics {
            diagnostics.record(
                DiagnosticRecord::new(kind)
                    .user(self.session.user_id)
                    .session(self.session.session_id.clone())
                    .detail(serde_json::json!({
                        "spins": record.spin_count,
                        "total_bet": record.total_bet,
                        "total_win": record.total_win,
                        "rtp": record.rtp,
                    })),
            );
        }
    }
}
