//! Best-effort diagnostics trail.
//!
//! Records are queued with `try_send` and written as JSON lines by a
//! background task. A full buffer drops the record; write errors are logged
//! and discarded. Nothing here can fail or block a caller.
//!
//! [`DiagnosticsWriter::finish`] closes the buffer and waits until every
//! queued record is on disk.

use crate::wallet::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};
use tokio::{
    fs::OpenOptions,
    io::{AsyncWrite, AsyncWriteExt, BufWriter},
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

pub const DEFAULT_BUFFER: usize = 1_024;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// One diagnostics line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub at: DateTime<Utc>,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub detail: serde_json::Value,
}

impl DiagnosticRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            kind: kind.into(),
            user_id: None,
            session_id: None,
            detail: serde_json::Value::Null,
        }
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Handle on the background writer task.
///
/// Dropping it without [`finish`](Self::finish) also closes the buffer; the
/// task then drains and exits on its own.
#[derive(Debug)]
pub struct DiagnosticsWriter {
    task: JoinHandle<()>,
    stop: oneshot::Sender<()>,
}

impl DiagnosticsWriter {
    /// Stop accepting records, write out the queued ones and flush
    pub async fn finish(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            log::warn!("Diagnostics writer ended abnormally: {}", e);
        }
    }
}

/// Cloneable producer side of the diagnostics buffer
#[derive(Clone, Debug)]
pub struct DiagnosticsSink {
    sender: mpsc::Sender<DiagnosticRecord>,
    dropped: Arc<AtomicU64>,
}

impl DiagnosticsSink {
    /// Spawn a writer task appending to `writer`
    pub fn spawn<W>(writer: W, capacity: usize, flush_every: Duration) -> (Self, DiagnosticsWriter)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (sink, records) = Self::channel(capacity);
        let (stop, stopped) = oneshot::channel();
        let task = tokio::spawn(write_loop(records, stopped, writer, flush_every));
        (sink, DiagnosticsWriter { task, stop })
    }

    /// Append to the file at `path`, creating it if needed
    pub async fn open(
        path: impl AsRef<Path>,
        capacity: usize,
    ) -> std::io::Result<(Self, DiagnosticsWriter)> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        log::info!("Diagnostics trail at {}", path.as_ref().display());
        Ok(Self::spawn(file, capacity, DEFAULT_FLUSH_INTERVAL))
    }

    /// Sink paired with its raw receiver, without a writer task
    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<DiagnosticRecord>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let sink = Self {
            sender,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        (sink, receiver)
    }

    /// Queue a record; returns `false` if it was dropped
    pub fn record(&self, record: DiagnosticRecord) -> bool {
        match self.sender.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(record)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped == 1 || dropped % 100 == 0 {
                    log::warn!(
                        "Diagnostics buffer full, dropped '{}' record ({} dropped so far)",
                        record.kind,
                        dropped
                    );
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Records lost to a full or closed buffer
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

async fn write_loop<W>(
    mut records: mpsc::Receiver<DiagnosticRecord>,
    mut stop: oneshot::Receiver<()>,
    writer: W,
    flush_every: Duration,
) where
    W: AsyncWrite + Unpin,
{
    let mut out = BufWriter::new(writer);
    let mut ticker = interval(flush_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = &mut stop, if !stopping => {
                // Queued records still drain below; new ones count as dropped
                stopping = true;
                records.close();
            }
            record = records.recv() => {
                let Some(record) = record else { break };
                let mut line = match serde_json::to_vec(&record) {
                    Ok(line) => line,
                    Err(e) => {
                        log::warn!("Diagnostics record not encodable: {}", e);
                        continue;
                    }
                };
                line.push(b'\n');
                if let Err(e) = out.write_all(&line).await {
                    log::warn!("Diagnostics write failed: {}", e);
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = out.flush().await {
                    log::warn!("Diagnostics flush failed: {}", e);
                }
            }
        }
    }

    if let Err(e) = out.flush().await {
        log::warn!("Diagnostics flush failed: {}", e);
    }
}
