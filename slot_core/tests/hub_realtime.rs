//! End-to-end tests of engine events reaching connected clients.

use async_trait::async_trait;
use futures_util::stream;
use slot_core::{
    history::InMemorySessionHistory,
    hub::{
        ClientSink, DEFAULT_CLIENT_QUEUE, Frame, GameDispatcher, HubActor,
        HubHandle, HubResult, InboundFrame, read_loop,
    },
    jackpot::JackpotRegistry,
    paytable::WeightedPaytable,
    session::{SessionConfig, SessionManager, SessionServices},
    wallet::{InMemoryLedgerStore, TransactionRef, TransactionType, WalletManager},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

/// Forwards every frame to the test as parsed JSON
struct ChannelSink {
    frames: mpsc::UnboundedSender<serde_json::Value>,
}

#[async_trait]
impl ClientSink for ChannelSink {
    async fn send_text(&mut self, frame: Frame) -> HubResult<()> {
        let value = serde_json::from_str(&frame).unwrap();
        let _ = self.frames.send(value);
        Ok(())
    }

    async fn close(&mut self) {}
}

fn sink() -> (ChannelSink, mpsc::UnboundedReceiver<serde_json::Value>) {
    let (frames, rx) = mpsc::unbounded_channel();
    (ChannelSink { frames }, rx)
}

async fn next_of_type(
    rx: &mut mpsc::UnboundedReceiver<serde_json::Value>,
    kind: &str,
) -> serde_json::Value {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let frame = rx.recv().await.expect("connection closed");
            if frame["type"] == kind {
                return frame;
            }
        }
    })
    .await
    .expect("timed out waiting for frame")
}

async fn setup() -> (SessionManager, Arc<WalletManager>, HubHandle) {
    let hub = HubActor::spawn(DEFAULT_CLIENT_QUEUE);
    let events = Arc::new(hub.clone());
    let wallet = Arc::new(
        WalletManager::new(Arc::new(InMemoryLedgerStore::new())).with_events(events.clone()),
    );
    let sessions = SessionManager::new(
        SessionConfig::default(),
        SessionServices {
            wallet: wallet.clone(),
            jackpots: Arc::new(JackpotRegistry::new()),
            evaluator: Arc::new(WeightedPaytable::classic().unwrap()),
            history: Arc::new(InMemorySessionHistory::new()),
            events,
            diagnostics: None,
        },
    );
    wallet
        .credit(1, 10_000, TransactionType::Deposit, TransactionRef::none())
        .await
        .unwrap();
    (sessions, wallet, hub)
}

#[tokio::test]
async fn test_engine_events_reach_every_user_connection() {
    let (sessions, _wallet, hub) = setup().await;
    let (first, mut first_rx) = sink();
    let (second, mut second_rx) = sink();
    let (stranger, mut stranger_rx) = sink();
    hub.connect(1, first).await.unwrap();
    hub.connect(1, second).await.unwrap();
    hub.connect(2, stranger).await.unwrap();

    sessions.start_game(1, "s-1", 100).await.unwrap();
    let spin = sessions.spin(1, "s-1").await.unwrap();

    for rx in [&mut first_rx, &mut second_rx] {
        let start = next_of_type(rx, "game_start").await;
        assert_eq!(start["session_id"], "s-1");
        let result = next_of_type(rx, "game_result").await;
        assert_eq!(result["spin_count"], 1);
        let balance = next_of_type(rx, "balance_update").await;
        assert_eq!(balance["balance"], spin.balance.balance);
    }

    hub.shutdown().await;
    assert!(
        tokio::time::timeout(Duration::from_millis(200), stranger_rx.recv())
            .await
            .map_or(true, |frame| frame.is_none())
    );
}

#[tokio::test]
async fn test_dispatcher_spin_over_connection() {
    let (sessions, _wallet, hub) = setup().await;
    sessions.start_game(1, "s-1", 100).await.unwrap();

    let (client, mut rx) = sink();
    let conn = hub.connect(1, client).await.unwrap();
    let ctx = conn.context(hub.clone());

    let frames = stream::iter(vec![
        Ok::<_, String>(InboundFrame::Text(
            r#"{"type":"subscribe","session_id":"s-1"}"#.to_string(),
        )),
        Ok(InboundFrame::Text(r#"{"type":"spin","session_id":"s-1"}"#.to_string())),
        Ok(InboundFrame::Text(r#"{"type":"spin","session_id":"nope"}"#.to_string())),
        Ok(InboundFrame::Close),
    ]);
    let dispatcher = Arc::new(GameDispatcher::new(sessions.clone()));
    read_loop(ctx, frames, dispatcher).await;

    let subscribed = next_of_type(&mut rx, "subscribed").await;
    assert_eq!(subscribed["session_id"], "s-1");
    let result = next_of_type(&mut rx, "game_result").await;
    assert_eq!(result["session_id"], "s-1");
    let error = next_of_type(&mut rx, "error").await;
    assert_eq!(error["code"], "SESSION_NOT_FOUND");

    assert_eq!(hub.online_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_other_users_session_cannot_be_subscribed() {
    let (sessions, wallet, hub) = setup().await;
    wallet
        .credit(2, 1_000, TransactionType::Deposit, TransactionRef::none())
        .await
        .unwrap();
    sessions.start_game(2, "theirs", 100).await.unwrap();

    let (client, mut rx) = sink();
    let conn = hub.connect(1, client).await.unwrap();
    let ctx = conn.context(hub.clone());
    let frames = stream::iter(vec![Ok::<_, String>(InboundFrame::Text(
        r#"{"type":"subscribe","session_id":"theirs"}"#.to_string(),
    ))]);
    read_loop(ctx, frames, Arc::new(GameDispatcher::new(sessions))).await;

    let error = next_of_type(&mut rx, "error").await;
    assert_eq!(error["code"], "FORBIDDEN");
}
