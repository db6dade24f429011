//! Per-connection transport seam and the single writer that owns it.

use super::errors::HubResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use uuid::Uuid;

pub type ClientId = Uuid;

/// Encoded outbound frame, shared between recipients
pub type Frame = Arc<str>;

/// Write half of a client transport (e.g. a WebSocket sink).
///
/// Only the writer task spawned by [`spawn_writer`] ever touches it.
#[async_trait]
pub trait ClientSink: Send + 'static {
    async fn send_text(&mut self, frame: Frame) -> HubResult<()>;

    async fn close(&mut self);
}

/// Drain `queue` into `sink` in enqueue order until the queue closes or a
/// write fails, then close the transport.
pub fn spawn_writer<S>(client_id: ClientId, mut sink: S, mut queue: mpsc::Receiver<Frame>) -> JoinHandle<()>
where
    S: ClientSink,
{
    tokio::spawn(async move {
        while let Some(frame) = queue.recv().await {
            if let Err(e) = sink.send_text(frame).await {
                log::debug!("Client {}: write failed: {}", client_id, e);
                break;
            }
        }
        sink.close().await;
        log::debug!("Client {}: writer stopped", client_id);
    })
}
