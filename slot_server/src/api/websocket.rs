//! WebSocket endpoint attaching clients to the realtime hub.
//!
//! # Connection Flow
//!
//! 1. Client connects via `GET /ws` with the `X-User-Id` header (browsers,
//!    which cannot set headers on upgrade, may pass `?user_id=` instead)
//! 2. The socket's write half is registered with the hub; a writer task
//!    drains the connection's queue in order
//! 3. The read half runs the hub's read loop with the game dispatcher
//! 4. On close or read error the client is unregistered and the writer
//!    closes the socket
//!
//! # Client Messages
//!
//! ```javascript
//! const ws = new WebSocket('ws://localhost:7070/ws?user_id=7');
//! ws.send(JSON.stringify({ type: "subscribe", session_id: "s-1" }));
//! ws.send(JSON.stringify({ type: "spin", session_id: "s-1" }));
//! ```
//!
//! Results arrive as `game_result`, `balance_update` and `game_state` events.

use async_trait::async_trait;
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use log::{info, warn};
use serde::Deserialize;
use slot_core::hub::{
    ClientSink, Frame, GameDispatcher, HubError, HubResult, InboundFrame, read_loop,
};
use std::sync::Arc;

use super::{
    AppState,
    middleware::user_id_from_headers,
    rate_limiter::{MessageBudget, RateLimitedDispatcher},
};
use crate::{logging::log_security_event, metrics};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    user_id: Option<i64>,
}

/// Write half of an axum socket
pub struct AxumSink {
    sender: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl ClientSink for AxumSink {
    async fn send_text(&mut self, frame: Frame) -> HubResult<()> {
        self.sender
            .send(Message::Text(frame.to_string().into()))
            .await
            .map_err(|e| HubError::Transport(e.to_string()))?;
        metrics::websocket_messages_sent();
        Ok(())
    }

    async fn close(&mut self) {
        let _ = self.sender.send(Message::Close(None)).await;
        let _ = self.sender.close().await;
    }
}

/// Transport frame to hub frame
fn inbound(message: Message) -> InboundFrame {
    match message {
        Message::Text(text) => InboundFrame::Text(text.as_str().to_string()),
        Message::Binary(bytes) => InboundFrame::Binary(bytes.to_vec()),
        Message::Ping(_) | Message::Pong(_) => InboundFrame::Ping,
        Message::Close(_) => InboundFrame::Close,
    }
}

/// Upgrade to a realtime connection.
///
/// # Response
///
/// On success, upgrades the connection (101 Switching Protocols).
/// Without a valid user id, returns `401 Unauthorized`.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    let user_id = match user_id_from_headers(&headers).or(query.user_id.filter(|id| *id > 0)) {
        Some(id) => id,
        None => {
            log_security_event("ws_missing_identity", None, None, "Rejected socket upgrade");
            return (StatusCode::UNAUTHORIZED, "Missing user id").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: i64, state: AppState) {
    let (sender, receiver) = socket.split();

    let connection = match state.hub.connect(user_id, AxumSink { sender }).await {
        Ok(connection) => connection,
        Err(e) => {
            warn!("Hub refused connection for user {}: {}", user_id, e);
            return;
        }
    };

    metrics::websocket_connections_total();
    refresh_online_gauges(&state).await;
    info!(
        "WebSocket connected: client={}, user={}",
        connection.client_id, user_id
    );

    let ctx = connection.context(state.hub.clone());
    let dispatcher = Arc::new(RateLimitedDispatcher::new(
        Arc::new(GameDispatcher::new(state.sessions.clone())),
        MessageBudget::default(),
    ));

    let frames = receiver.map(|message| message.map(inbound));
    read_loop(ctx, frames, dispatcher).await;

    // The writer exits once the hub drops the client's queue, or is aborted
    // if the client was dropped for falling behind.
    let _ = connection.writer.await;
    refresh_online_gauges(&state).await;
}

async fn refresh_online_gauges(state: &AppState) {
    if let Ok(count) = state.hub.online_count().await {
        metrics::websocket_connections_active(count as u64);
    }
    if let Ok(users) = state.hub.online_users().await {
        metrics::online_users(users.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::ws::{CloseFrame, Utf8Bytes};

    #[test]
    fn test_inbound_mapping() {
        assert_eq!(
            inbound(Message::Text(Utf8Bytes::from_static(r#"{"type":"ping"}"#))),
            InboundFrame::Text(r#"{"type":"ping"}"#.to_string())
        );
        assert_eq!(
            inbound(Message::Binary(vec![1u8, 2].into())),
            InboundFrame::Binary(vec![1, 2])
        );
        assert_eq!(inbound(Message::Ping(Vec::<u8>::new().into())), InboundFrame::Ping);
        assert_eq!(
            inbound(Message::Close(Some(CloseFrame {
                code: 1000,
                reason: Utf8Bytes::from_static("bye"),
            }))),
            InboundFrame::Close
        );
    }
}
