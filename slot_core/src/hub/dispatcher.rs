//! Inbound side of a connection: frame decoding and message dispatch.

use super::{
    actor::HubHandle,
    client::ClientId,
    events::HubEvent,
};
use crate::{session::SessionManager, wallet::UserId};
use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::{fmt::Display, sync::Arc};
use tokio::sync::watch;

/// Messages clients may send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping,
    /// Receive the session's events on this connection
    Subscribe { session_id: String },
    Unsubscribe,
    Spin { session_id: String },
    GetSession { session_id: String },
}

/// Transport-neutral inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Text(String),
    Binary(Vec<u8>),
    /// Transport-level keepalive, answered by the transport itself
    Ping,
    Close,
}

/// Identity of the connection a message came from
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub client_id: ClientId,
    pub user_id: UserId,
    pub hub: HubHandle,
    /// Closes when the hub drops the client
    pub disconnected: watch::Receiver<()>,
}

/// Application protocol handler
#[async_trait]
pub trait MessageDispatcher: Send + Sync {
    /// Handle one message; a returned event is sent back to this client only
    async fn dispatch(&self, ctx: &ClientContext, message: ClientMessage) -> Option<HubEvent>;
}

/// Read frames until the peer closes, the transport fails or the hub drops
/// the client, then unregister.
pub async fn read_loop<St, E, D>(ctx: ClientContext, mut stream: St, dispatcher: Arc<D>)
where
    St: Stream<Item = Result<InboundFrame, E>> + Unpin,
    E: Display,
    D: MessageDispatcher + ?Sized,
{
    let mut disconnected = ctx.disconnected.clone();

    loop {
        let frame = tokio::select! {
            biased;
            _ = disconnected.changed() => {
                log::debug!("Client {}: dropped by hub", ctx.client_id);
                break;
            }
            frame = stream.next() => frame,
        };
        let Some(frame) = frame else { break };

        let reply = match frame {
            Ok(InboundFrame::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => dispatcher.dispatch(&ctx, message).await,
                Err(e) => {
                    log::debug!("Client {}: undecodable message: {}", ctx.client_id, e);
                    Some(HubEvent::error("INVALID_MESSAGE", "Unrecognized message"))
                }
            },
            Ok(InboundFrame::Binary(_)) => Some(HubEvent::error(
                "INVALID_MESSAGE",
                "Binary frames are not supported",
            )),
            Ok(InboundFrame::Ping) => None,
            Ok(InboundFrame::Close) => break,
            Err(e) => {
                log::debug!("Client {}: read error: {}", ctx.client_id, e);
                break;
            }
        };

        if let Some(reply) = reply {
            if ctx.hub.send_to_client(ctx.client_id, &reply).await.is_err() {
                break;
            }
        }
    }

    ctx.hub.unregister(ctx.client_id).await;
    log::info!("Client {} (user {}) disconnected", ctx.client_id, ctx.user_id);
}

/// Protocol handler backed by the session engine
#[derive(Clone)]
pub struct GameDispatcher {
    sessions: SessionManager,
}

impl GameDispatcher {
    pub fn new(sessions: SessionManager) -> Self {
        Self { sessions }
    }
}

#[async_trait]
impl MessageDispatcher for GameDispatcher {
    async fn dispatch(&self, ctx: &ClientContext, message: ClientMessage) -> Option<HubEvent> {
        match message {
            ClientMessage::Ping => Some(HubEvent::Pong),

            ClientMessage::Subscribe { session_id } => {
                if let Err(e) = self
                    .sessions
                    .get_session_info(ctx.user_id, &session_id)
                    .await
                {
                    return Some(HubEvent::error(e.code(), e.client_message()));
                }
                match ctx
                    .hub
                    .bind_session(ctx.client_id, Some(session_id.clone()))
                    .await
                {
                    Ok(_) => Some(HubEvent::Subscribed { session_id }),
                    Err(e) => Some(HubEvent::error(e.code(), e.client_message())),
                }
            }

            ClientMessage::Unsubscribe => match ctx.hub.bind_session(ctx.client_id, None).await {
                Ok(_) => Some(HubEvent::Unsubscribed),
                Err(e) => Some(HubEvent::error(e.code(), e.client_message())),
            },

            // Results arrive through the engine's published events.
            ClientMessage::Spin { session_id } => {
                match self.sessions.spin(ctx.user_id, &session_id).await {
                    Ok(_) => None,
                    Err(e) => Some(HubEvent::error(e.code(), e.client_message())),
                }
            }

            ClientMessage::GetSession { session_id } => {
                match self
                    .sessions
                    .get_session_info(ctx.user_id, &session_id)
                    .await
                {
                    Ok(session) => Some(HubEvent::Session { session }),
                    Err(e) => Some(HubEvent::error(e.code(), e.client_message())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{
        actor::{DEFAULT_CLIENT_QUEUE, HubActor},
        client::{ClientSink, Frame},
        errors::HubResult,
    };
    use futures_util::stream;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };
    use tokio::sync::Mutex;

    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ClientSink for RecordingSink {
        async fn send_text(&mut self, frame: Frame) -> HubResult<()> {
            self.frames.lock().await.push(frame.to_string());
            Ok(())
        }

        async fn close(&mut self) {}
    }

    struct PingOnly;

    #[async_trait]
    impl MessageDispatcher for PingOnly {
        async fn dispatch(&self, _ctx: &ClientContext, message: ClientMessage) -> Option<HubEvent> {
            match message {
                ClientMessage::Ping => Some(HubEvent::Pong),
                _ => None,
            }
        }
    }

    /// Sink whose writes never complete
    struct StalledSink;

    #[async_trait]
    impl ClientSink for StalledSink {
        async fn send_text(&mut self, _frame: Frame) -> HubResult<()> {
            std::future::pending::<()>().await;
            Ok(())
        }

        async fn close(&mut self) {}
    }

    #[derive(Default)]
    struct CountingDispatcher {
        seen: AtomicUsize,
    }

    #[async_trait]
    impl MessageDispatcher for CountingDispatcher {
        async fn dispatch(&self, _ctx: &ClientContext, _message: ClientMessage) -> Option<HubEvent> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            None
        }
    }

    #[test]
    fn test_client_message_wire_format() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","session_id":"s-1"}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Subscribe {
                session_id: "s-1".to_string()
            }
        );
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"fold"}"#).is_err());
    }

    #[tokio::test]
    async fn test_read_loop_replies_and_unregisters_on_close() {
        let hub = HubActor::spawn(DEFAULT_CLIENT_QUEUE);
        let sink = RecordingSink::default();
        let conn = hub.connect(5, sink.clone()).await.unwrap();
        let ctx = conn.context(hub.clone());

        let frames = stream::iter(vec![
            Ok::<_, String>(InboundFrame::Text(r#"{"type":"ping"}"#.to_string())),
            Ok(InboundFrame::Text("not json".to_string())),
            Ok(InboundFrame::Close),
            Ok(InboundFrame::Text(r#"{"type":"ping"}"#.to_string())),
        ]);
        read_loop(ctx, frames, Arc::new(PingOnly)).await;
        conn.writer.await.unwrap();

        let frames = sink.frames.lock().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], r#"{"type":"pong"}"#);
        assert!(frames[1].contains("INVALID_MESSAGE"));
        assert_eq!(hub.online_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_read_error_unregisters() {
        let hub = HubActor::spawn(DEFAULT_CLIENT_QUEUE);
        let conn = hub.connect(5, RecordingSink::default()).await.unwrap();
        let ctx = conn.context(hub.clone());

        let frames = stream::iter(vec![Err::<InboundFrame, _>("connection reset")]);
        read_loop(ctx, frames, Arc::new(PingOnly)).await;

        assert_eq!(hub.online_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shed_client_stops_dispatching() {
        let hub = HubActor::spawn(2);
        let conn = hub.connect(9, StalledSink).await.unwrap();
        let ctx = conn.context(hub.clone());

        let mut shed = false;
        for _ in 0..20 {
            hub.send_to_user(9, &HubEvent::Pong).await.unwrap();
            if hub.online_count().await.unwrap() == 0 {
                shed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(shed, "stalled client was never dropped");

        let spin = r#"{"type":"spin","session_id":"s-1"}"#;
        let frames = stream::iter((0..5).map(|_| Ok::<_, String>(InboundFrame::Text(spin.to_string()))));
        let dispatcher = Arc::new(CountingDispatcher::default());
        tokio::time::timeout(
            Duration::from_secs(1),
            read_loop(ctx, frames, dispatcher.clone()),
        )
        .await
        .expect("read loop kept running");
        assert_eq!(dispatcher.seen.load(Ordering::SeqCst), 0);

        let writer = tokio::time::timeout(Duration::from_secs(1), conn.writer)
            .await
            .expect("writer kept running");
        assert!(writer.unwrap_err().is_cancelled());
    }
}
