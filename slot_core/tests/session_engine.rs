//! Integration tests for the session engine.
//!
//! A scripted evaluator makes every spin's payout deterministic so the
//! ledger, jackpot and event effects can be checked exactly.

use rand::RngCore;
use slot_core::{
    history::{InMemorySessionHistory, SessionHistory},
    hub::{HubEvent, RecordingPublisher},
    jackpot::{JackpotConfig, JackpotPool, JackpotRegistry, PoolKey},
    paytable::{LineWin, PaytableEvaluator, SpinOutcome, Symbol},
    session::{
        EarlyStopPolicy, SessionConfig, SessionError, SessionManager, SessionServices,
        SessionState, StopReason,
    },
    wallet::{
        InMemoryLedgerStore, PageRequest, TransactionFilter, TransactionRef, TransactionType,
        WalletManager,
    },
};
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

/// Pays the scripted amounts in order, then nothing
struct ScriptedEvaluator {
    wins: Mutex<VecDeque<i64>>,
    jackpot_probability: f64,
}

impl ScriptedEvaluator {
    fn new(wins: &[i64]) -> Self {
        Self {
            wins: Mutex::new(wins.iter().copied().collect()),
            jackpot_probability: 0.0,
        }
    }

    fn always_jackpot(mut self) -> Self {
        self.jackpot_probability = 1.0;
        self
    }
}

impl PaytableEvaluator for ScriptedEvaluator {
    fn spin(&self, _rng: &mut dyn RngCore, bet: i64) -> SpinOutcome {
        let win = self.wins.lock().unwrap().pop_front().unwrap_or(0);
        let lines = if win > 0 {
            vec![LineWin {
                line: 0,
                symbol: Symbol::Seven,
                count: 3,
                payout: win,
            }]
        } else {
            Vec::new()
        };
        SpinOutcome {
            grid: vec![vec![Symbol::Seven; 3]; 3],
            lines,
            bet_amount: bet,
            win_amount: win,
            jackpot_win: None,
        }
    }

    fn jackpot_probability(&self, _pool: &JackpotPool) -> f64 {
        self.jackpot_probability
    }
}

struct Harness {
    sessions: SessionManager,
    wallet: Arc<WalletManager>,
    jackpots: Arc<JackpotRegistry>,
    history: Arc<InMemorySessionHistory>,
    events: Arc<RecordingPublisher>,
}

impl Harness {
    fn new(config: SessionConfig, evaluator: ScriptedEvaluator) -> Self {
        let events = Arc::new(RecordingPublisher::default());
        let wallet = Arc::new(
            WalletManager::new(Arc::new(InMemoryLedgerStore::new())).with_events(events.clone()),
        );
        let jackpots = Arc::new(
            JackpotRegistry::with_pools(&config.game_id, &[JackpotConfig::default()]).unwrap(),
        );
        let history = Arc::new(InMemorySessionHistory::new());

        let sessions = SessionManager::new(
            config,
            SessionServices {
                wallet: wallet.clone(),
                jackpots: jackpots.clone(),
                evaluator: Arc::new(evaluator),
                history: history.clone(),
                events: events.clone(),
                diagnostics: None,
            },
        );

        Self {
            sessions,
            wallet,
            jackpots,
            history,
            events,
        }
    }

    fn with_wins(wins: &[i64]) -> Self {
        Self::new(SessionConfig::default(), ScriptedEvaluator::new(wins))
    }

    async fn deposit(&self, user_id: i64, amount: i64) {
        self.wallet
            .credit(user_id, amount, TransactionType::Deposit, TransactionRef::none())
            .await
            .unwrap();
    }

    async fn balance(&self, user_id: i64) -> i64 {
        self.wallet.get_balance(user_id).await.unwrap().balance
    }

    fn pool_key(&self) -> PoolKey {
        let config = self.sessions.config();
        PoolKey::new(config.game_id.as_str(), config.jackpot_type.as_str())
    }
}

#[tokio::test]
async fn test_spins_accumulate_session_aggregates() {
    let h = Harness::with_wins(&[0, 250, 0]);
    h.deposit(1, 1_000).await;
    h.sessions.start_game(1, "s-1", 100).await.unwrap();

    for _ in 0..3 {
        h.sessions.spin(1, "s-1").await.unwrap();
    }

    let info = h.sessions.get_session_info(1, "s-1").await.unwrap();
    assert_eq!(info.spin_count, 3);
    assert_eq!(info.total_bet, 300);
    assert_eq!(info.total_win, 250);
    assert!(!info.bet_prepaid);
    assert_eq!(h.balance(1).await, 1_000 - 300 + 250);
}

#[tokio::test]
async fn test_first_spin_consumes_opening_bet() {
    let h = Harness::with_wins(&[]);
    h.deposit(1, 1_000).await;
    h.sessions.start_game(1, "s-1", 100).await.unwrap();

    h.sessions.spin(1, "s-1").await.unwrap();
    assert_eq!(h.balance(1).await, 900);

    h.sessions.spin(1, "s-1").await.unwrap();
    assert_eq!(h.balance(1).await, 800);

    let bets = h
        .wallet
        .get_transactions(
            1,
            &TransactionFilter {
                tx_type: Some(TransactionType::Bet),
                ref_id: Some("s-1".to_string()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(bets.total, 2);
}

#[tokio::test]
async fn test_batch_stops_on_big_win() {
    let h = Harness::with_wins(&[0, 0, 0, 0, 0, 0, 1_200, 0, 0]);
    h.deposit(1, 10_000).await;
    h.sessions.start_game(1, "s-1", 100).await.unwrap();

    let policy = EarlyStopPolicy {
        big_win_threshold: Some(1_000),
        max_total_win: None,
    };
    let batch = h.sessions.batch_spin(1, "s-1", 20, policy).await.unwrap();

    assert_eq!(batch.total_spins, 7);
    assert!(batch.stopped_early);
    assert_eq!(batch.stop_reason, StopReason::BigWin);
    assert_eq!(batch.stop_reason.as_str(), "big_win");
    assert_eq!(batch.total_bet, 700);
    assert_eq!(batch.total_win, 1_200);
    assert_eq!(batch.spins.len(), 7);
    assert_eq!(batch.balance.balance, 10_000 - 700 + 1_200);
}

#[tokio::test]
async fn test_batch_stops_at_max_total_win() {
    let h = Harness::with_wins(&[50; 10]);
    h.deposit(1, 10_000).await;
    h.sessions.start_game(1, "s-1", 100).await.unwrap();

    let policy = EarlyStopPolicy {
        big_win_threshold: None,
        max_total_win: Some(120),
    };
    let batch = h.sessions.batch_spin(1, "s-1", 10, policy).await.unwrap();

    assert_eq!(batch.total_spins, 3);
    assert_eq!(batch.stop_reason, StopReason::MaxWinReached);
    assert_eq!(batch.total_win, 150);
}

#[tokio::test]
async fn test_batch_completes_when_nothing_triggers() {
    let h = Harness::with_wins(&[]);
    h.deposit(1, 10_000).await;
    h.sessions.start_game(1, "s-1", 10).await.unwrap();

    let policy = EarlyStopPolicy {
        big_win_threshold: Some(1),
        max_total_win: Some(1),
    };
    let batch = h.sessions.batch_spin(1, "s-1", 5, policy).await.unwrap();

    assert_eq!(batch.total_spins, 5);
    assert!(!batch.stopped_early);
    assert_eq!(batch.stop_reason, StopReason::Completed);
    assert_eq!(batch.state, SessionState::Active);
}

#[tokio::test]
async fn test_last_spin_win_is_not_an_early_stop() {
    let h = Harness::with_wins(&[0, 0, 5_000]);
    h.deposit(1, 10_000).await;
    h.sessions.start_game(1, "s-1", 100).await.unwrap();

    let policy = EarlyStopPolicy {
        big_win_threshold: Some(1_000),
        max_total_win: None,
    };
    let batch = h.sessions.batch_spin(1, "s-1", 3, policy).await.unwrap();

    assert_eq!(batch.total_spins, 3);
    assert_eq!(batch.stop_reason, StopReason::Completed);
}

#[tokio::test]
async fn test_batch_stops_when_balance_runs_out() {
    let h = Harness::with_wins(&[]);
    h.deposit(1, 300).await;
    h.sessions.start_game(1, "s-1", 100).await.unwrap();

    let batch = h
        .sessions
        .batch_spin(1, "s-1", 10, EarlyStopPolicy::default())
        .await
        .unwrap();

    assert_eq!(batch.total_spins, 3);
    assert_eq!(batch.stop_reason, StopReason::InsufficientBalance);
    assert_eq!(batch.balance.balance, 0);

    // Nothing left for a further spin either
    let err = h.sessions.spin(1, "s-1").await.unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_BALANCE");
    let info = h.sessions.get_session_info(1, "s-1").await.unwrap();
    assert_eq!(info.spin_count, 3);
}

#[tokio::test]
async fn test_failed_spin_returns_jackpot_contribution() {
    let h = Harness::with_wins(&[]);
    h.deposit(1, 100).await;
    h.sessions.start_game(1, "s-1", 100).await.unwrap();

    h.sessions.spin(1, "s-1").await.unwrap();
    let pool = h.jackpots.get(&h.pool_key()).await.unwrap();
    assert_eq!(pool.amount, 10_001);

    let err = h.sessions.spin(1, "s-1").await.unwrap_err();
    assert!(err.is_insufficient_balance());

    let pool = h.jackpots.get(&h.pool_key()).await.unwrap();
    assert_eq!(pool.amount, 10_001);
    assert_eq!(pool.total_in, 1);
}

#[tokio::test]
async fn test_jackpot_credit_lands_in_the_same_unit() {
    let h = Harness::new(
        SessionConfig::default(),
        ScriptedEvaluator::new(&[]).always_jackpot(),
    );
    h.deposit(1, 1_000).await;
    h.sessions.start_game(1, "s-1", 100).await.unwrap();

    let spin = h.sessions.spin(1, "s-1").await.unwrap();
    let jackpot = spin.outcome.jackpot_win.expect("jackpot won");
    assert_eq!(jackpot.amount, 10_001);
    assert_eq!(spin.total_win, 10_001);
    assert_eq!(spin.balance.balance, 900 + 10_001);

    let pool = h.jackpots.get(&h.pool_key()).await.unwrap();
    assert_eq!(pool.amount, pool.min_amount);
    assert_eq!(pool.win_count, 1);
    assert_eq!(pool.last_winner, Some(1));

    let credits = h
        .wallet
        .get_transactions(
            1,
            &TransactionFilter {
                tx_type: Some(TransactionType::Jackpot),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(credits.total, 1);
    assert_eq!(credits.items[0].amount, 10_001);
}

#[tokio::test]
async fn test_settle_records_history_and_closes() {
    let h = Harness::with_wins(&[40]);
    h.deposit(1, 1_000).await;
    h.sessions.start_game(1, "s-1", 100).await.unwrap();
    h.sessions.spin(1, "s-1").await.unwrap();

    let settled = h.sessions.settle(1, "s-1").await.unwrap();
    assert_eq!(settled.spin_count, 1);
    assert_eq!(settled.total_bet, 100);
    assert_eq!(settled.total_win, 40);
    assert!((settled.rtp - 0.4).abs() < f64::EPSILON);
    assert_eq!(settled.balance.balance, 940);

    let records = h.history.list_by_user(1, 10).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].final_state, SessionState::Settled);
    assert_eq!(records[0].total_win, 40);

    let err = h.sessions.settle(1, "s-1").await.unwrap_err();
    assert!(matches!(err, SessionError::SessionNotFound(_)));
    assert_eq!(h.sessions.active_session_count().await, 0);
}

#[tokio::test]
async fn test_sweep_expires_idle_sessions_only() {
    let h = Harness::with_wins(&[]);
    h.deposit(1, 1_000).await;
    h.sessions.start_game(1, "idle", 100).await.unwrap();
    h.sessions.start_game(1, "busy", 100).await.unwrap();

    // Nothing is idle yet
    let now = chrono::Utc::now();
    assert!(h.sessions.sweep_expired(now).await.is_empty());

    let later = now + chrono::Duration::hours(1);
    let expired = h.sessions.sweep_expired(later).await;
    assert_eq!(expired, vec!["busy".to_string(), "idle".to_string()]);
    assert_eq!(h.sessions.active_session_count().await, 0);

    let records = h.history.list_by_user(1, 10).await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.final_state == SessionState::Expired));

    // Expiry keeps the opening bets
    assert_eq!(h.balance(1).await, 800);

    let err = h.sessions.spin(1, "idle").await.unwrap_err();
    assert_eq!(err.code(), "SESSION_NOT_FOUND");
}

#[tokio::test]
async fn test_capacity_limit() {
    let config = SessionConfig {
        max_sessions: 2,
        ..SessionConfig::default()
    };
    let h = Harness::new(config, ScriptedEvaluator::new(&[]));
    h.deposit(1, 1_000).await;

    h.sessions.start_game(1, "a", 10).await.unwrap();
    h.sessions.start_game(1, "b", 10).await.unwrap();
    let err = h.sessions.start_game(1, "c", 10).await.unwrap_err();
    assert_eq!(err.code(), "CAPACITY_EXCEEDED");
    assert_eq!(h.balance(1).await, 980);

    h.sessions.settle(1, "a").await.unwrap();
    h.sessions.start_game(1, "c", 10).await.unwrap();
}

#[tokio::test]
async fn test_concurrent_spins_on_one_session_are_serialized() {
    let h = Harness::with_wins(&[]);
    h.deposit(1, 10_000).await;
    h.sessions.start_game(1, "s-1", 10).await.unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..20 {
        let sessions = h.sessions.clone();
        tasks.spawn(async move { sessions.spin(1, "s-1").await.unwrap().spin_count });
    }
    let mut counts = Vec::new();
    while let Some(count) = tasks.join_next().await {
        counts.push(count.unwrap());
    }
    counts.sort_unstable();

    assert_eq!(counts, (1..=20).collect::<Vec<u32>>());
    assert_eq!(h.balance(1).await, 10_000 - 200);
}

#[tokio::test]
async fn test_spin_publishes_result_balance_and_state() {
    let h = Harness::with_wins(&[30]);
    h.deposit(1, 1_000).await;
    h.events.clear().await;

    h.sessions.start_game(1, "s-1", 100).await.unwrap();
    h.sessions.spin(1, "s-1").await.unwrap();

    let events = h.events.events().await;
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| match e {
            HubEvent::GameStart { .. } => "game_start",
            HubEvent::GameResult { .. } => "game_result",
            HubEvent::BalanceUpdate { .. } => "balance_update",
            HubEvent::GameState { .. } => "game_state",
            _ => "other",
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            "game_start",
            "balance_update",
            "game_result",
            "balance_update",
            "game_state"
        ]
    );

    match &events[3] {
        HubEvent::BalanceUpdate { balance, .. } => assert_eq!(*balance, 930),
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_abandoned_start_game_still_opens_session() {
    let h = Harness::with_wins(&[]);
    h.deposit(1, 1_000).await;

    // The caller gives up before the opening bet is committed
    let abandoned = tokio::time::timeout(Duration::ZERO, h.sessions.start_game(1, "s-1", 100)).await;
    assert!(abandoned.is_err());

    for _ in 0..100 {
        if h.sessions.active_session_count().await == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let debited = h.balance(1).await == 900;
    let live = h.sessions.get_session_info(1, "s-1").await.is_ok();
    assert!(debited, "opening bet should be committed");
    assert_eq!(debited, live, "ledger and live sessions disagree");

    let err = h.sessions.start_game(1, "s-1", 100).await.unwrap_err();
    assert!(matches!(err, SessionError::SessionExists(_)));
    assert_eq!(h.balance(1).await, 900);
}

#[tokio::test]
async fn test_abandoned_spins_keep_ledger_and_session_in_step() {
    let h = Harness::with_wins(&[]);
    h.deposit(1, 1_000).await;
    h.sessions.start_game(1, "s-1", 100).await.unwrap();

    for _ in 0..3 {
        let _ = tokio::time::timeout(Duration::ZERO, h.sessions.spin(1, "s-1")).await;
    }

    // Requests are served in order, so this one sees every abandoned spin
    let last = h.sessions.spin(1, "s-1").await.unwrap();
    let spins = i64::from(last.spin_count);
    assert!((1..=4).contains(&spins));
    assert_eq!(last.total_bet, 100 * spins);
    assert_eq!(last.balance.balance, 1_000 - 100 * spins);
    assert_eq!(h.balance(1).await, 1_000 - 100 * spins);

    let info = h.sessions.get_session_info(1, "s-1").await.unwrap();
    assert_eq!(info.spin_count, last.spin_count);

    let pool = h.jackpots.get(&h.pool_key()).await.unwrap();
    assert_eq!(pool.total_in, spins);
}

