//! Registry actor owning every live client connection.

use super::{
    client::{ClientId, ClientSink, Frame, spawn_writer},
    dispatcher::ClientContext,
    errors::{HubError, HubResult},
    events::{EventPublisher, HubEvent},
};
use crate::wallet::UserId;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap, HashSet};
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot, watch,
    },
    task::{AbortHandle, JoinHandle},
};
use uuid::Uuid;

/// Default per-client outbound queue
pub const DEFAULT_CLIENT_QUEUE: usize = 64;

const COMMAND_QUEUE: usize = 1_024;

/// Commands handled by the hub actor, in arrival order
#[derive(Debug)]
pub enum HubCommand {
    Register {
        client_id: ClientId,
        user_id: UserId,
        queue: mpsc::Sender<Frame>,
        writer: AbortHandle,
        /// Dropped when the client leaves the registry
        disconnect: watch::Sender<()>,
        response: oneshot::Sender<()>,
    },
    Unregister {
        client_id: ClientId,
    },
    BindSession {
        client_id: ClientId,
        session_id: Option<String>,
        response: oneshot::Sender<bool>,
    },
    SendToClient {
        client_id: ClientId,
        frame: Frame,
        response: oneshot::Sender<bool>,
    },
    SendToUser {
        user_id: UserId,
        frame: Frame,
        response: oneshot::Sender<usize>,
    },
    SendToSession {
        session_id: String,
        frame: Frame,
        response: oneshot::Sender<usize>,
    },
    Broadcast {
        frame: Frame,
        response: oneshot::Sender<usize>,
    },
    /// Deliver to a user's clients and a session's subscribers, each once
    Publish {
        user_id: Option<UserId>,
        session_id: Option<String>,
        frame: Frame,
    },
    OnlineCount {
        response: oneshot::Sender<usize>,
    },
    OnlineUsers {
        response: oneshot::Sender<Vec<UserId>>,
    },
    Shutdown,
}

struct ClientEntry {
    user_id: UserId,
    session_id: Option<String>,
    queue: mpsc::Sender<Frame>,
    writer: AbortHandle,
    /// Held only to be dropped with the entry
    _disconnect: watch::Sender<()>,
}

/// Single owner of the connection registry
pub struct HubActor {
    inbox: mpsc::Receiver<HubCommand>,
    clients: HashMap<ClientId, ClientEntry>,
    by_user: HashMap<UserId, HashSet<ClientId>>,
    by_session: HashMap<String, HashSet<ClientId>>,
}

impl HubActor {
    /// Create a hub actor and its handle
    pub fn new(client_queue: usize) -> (Self, HubHandle) {
        let (sender, inbox) = mpsc::channel(COMMAND_QUEUE);
        let actor = Self {
            inbox,
            clients: HashMap::new(),
            by_user: HashMap::new(),
            by_session: HashMap::new(),
        };
        let handle = HubHandle {
            sender,
            client_queue: client_queue.max(1),
        };
        (actor, handle)
    }

    /// Spawn the actor and return its handle
    pub fn spawn(client_queue: usize) -> HubHandle {
        let (actor, handle) = Self::new(client_queue);
        tokio::spawn(actor.run());
        handle
    }

    /// Run the hub event loop
    pub async fn run(mut self) {
        log::info!("Realtime hub starting");

        while let Some(command) = self.inbox.recv().await {
            if !self.handle_command(command) {
                break;
            }
        }

        let remaining = self.clients.len();
        self.clients.clear();
        log::info!("Realtime hub stopped ({} client(s) dropped)", remaining);
    }

    fn handle_command(&mut self, command: HubCommand) -> bool {
        match command {
            HubCommand::Register {
                client_id,
                user_id,
                queue,
                writer,
                disconnect,
                response,
            } => {
                self.clients.insert(
                    client_id,
                    ClientEntry {
                        user_id,
                        session_id: None,
                        queue,
                        writer,
                        _disconnect: disconnect,
                    },
                );
                self.by_user.entry(user_id).or_default().insert(client_id);
                log::debug!("Client {} registered for user {}", client_id, user_id);
                let _ = response.send(());
            }

            HubCommand::Unregister { client_id } => {
                self.remove(client_id);
            }

            HubCommand::BindSession {
                client_id,
                session_id,
                response,
            } => {
                let bound = self.bind(client_id, session_id);
                let _ = response.send(bound);
            }

            HubCommand::SendToClient {
                client_id,
                frame,
                response,
            } => {
                let delivered = self.deliver([client_id], &frame) == 1;
                let _ = response.send(delivered);
            }

            HubCommand::SendToUser {
                user_id,
                frame,
                response,
            } => {
                let targets = self.user_clients(user_id);
                let _ = response.send(self.deliver(targets, &frame));
            }

            HubCommand::SendToSession {
                session_id,
                frame,
                response,
            } => {
                let targets = self.session_clients(&session_id);
                let _ = response.send(self.deliver(targets, &frame));
            }

            HubCommand::Broadcast { frame, response } => {
                let targets: Vec<ClientId> = self.clients.keys().copied().collect();
                let _ = response.send(self.deliver(targets, &frame));
            }

            HubCommand::Publish {
                user_id,
                session_id,
                frame,
            } => {
                let mut targets = BTreeSet::new();
                if let Some(user_id) = user_id {
                    targets.extend(self.user_clients(user_id));
                }
                if let Some(session_id) = session_id {
                    targets.extend(self.session_clients(&session_id));
                }
                self.deliver(targets, &frame);
            }

            HubCommand::OnlineCount { response } => {
                let _ = response.send(self.clients.len());
            }

            HubCommand::OnlineUsers { response } => {
                let mut users: Vec<UserId> = self.by_user.keys().copied().collect();
                users.sort_unstable();
                let _ = response.send(users);
            }

            HubCommand::Shutdown => return false,
        }

        true
    }

    fn user_clients(&self, user_id: UserId) -> Vec<ClientId> {
        self.by_user
            .get(&user_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    fn session_clients(&self, session_id: &str) -> Vec<ClientId> {
        self.by_session
            .get(session_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Enqueue `frame` to each target without waiting.
    ///
    /// A full or closed queue means the client cannot keep up; it is dropped,
    /// its writer aborted and its read loop signalled.
    fn deliver(&mut self, targets: impl IntoIterator<Item = ClientId>, frame: &Frame) -> usize {
        let mut delivered = 0;
        let mut shed = Vec::new();

        for client_id in targets {
            let Some(entry) = self.clients.get(&client_id) else {
                continue;
            };
            match entry.queue.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    log::warn!(
                        "Client {} (user {}) outbound queue full, disconnecting",
                        client_id,
                        entry.user_id
                    );
                    shed.push(client_id);
                }
                Err(TrySendError::Closed(_)) => shed.push(client_id),
            }
        }

        for client_id in shed {
            if let Some(entry) = self.remove(client_id) {
                entry.writer.abort();
            }
        }
        delivered
    }

    fn bind(&mut self, client_id: ClientId, session_id: Option<String>) -> bool {
        let Some(entry) = self.clients.get_mut(&client_id) else {
            return false;
        };

        if let Some(previous) = entry.session_id.take() {
            if let Some(ids) = self.by_session.get_mut(&previous) {
                ids.remove(&client_id);
                if ids.is_empty() {
                    self.by_session.remove(&previous);
                }
            }
        }
        if let Some(session_id) = &session_id {
            self.by_session
                .entry(session_id.clone())
                .or_default()
                .insert(client_id);
        }
        entry.session_id = session_id;
        true
    }

    /// Drop a client from every index. Dropping the returned entry closes
    /// its queue and fires its disconnect signal.
    fn remove(&mut self, client_id: ClientId) -> Option<ClientEntry> {
        let entry = self.clients.remove(&client_id)?;

        if let Some(ids) = self.by_user.get_mut(&entry.user_id) {
            ids.remove(&client_id);
            if ids.is_empty() {
                self.by_user.remove(&entry.user_id);
            }
        }
        if let Some(session_id) = &entry.session_id {
            if let Some(ids) = self.by_session.get_mut(session_id) {
                ids.remove(&client_id);
                if ids.is_empty() {
                    self.by_session.remove(session_id);
                }
            }
        }
        log::debug!("Client {} unregistered (user {})", client_id, entry.user_id);
        Some(entry)
    }
}

/// A registered connection
#[derive(Debug)]
pub struct ClientConnection {
    pub client_id: ClientId,
    pub user_id: UserId,
    pub writer: JoinHandle<()>,
    /// Closes once the hub has dropped this client
    pub disconnected: watch::Receiver<()>,
}

impl ClientConnection {
    /// Context for this connection's read loop
    pub fn context(&self, hub: HubHandle) -> ClientContext {
        ClientContext {
            client_id: self.client_id,
            user_id: self.user_id,
            hub,
            disconnected: self.disconnected.clone(),
        }
    }
}

/// Cloneable handle to the hub actor
#[derive(Clone, Debug)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
    client_queue: usize,
}

impl HubHandle {
    async fn send(&self, command: HubCommand) -> HubResult<()> {
        self.sender.send(command).await.map_err(|_| HubError::Closed)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> HubCommand) -> HubResult<T> {
        let (tx, rx) = oneshot::channel();
        self.send(build(tx)).await?;
        rx.await.map_err(|_| HubError::Closed)
    }

    /// Register a client and spawn the writer that owns `sink`
    pub async fn connect<S: ClientSink>(&self, user_id: UserId, sink: S) -> HubResult<ClientConnection> {
        let client_id = Uuid::new_v4();
        let (queue, outbound) = mpsc::channel(self.client_queue);
        let writer = spawn_writer(client_id, sink, outbound);
        let (disconnect, disconnected) = watch::channel(());

        self.request(|response| HubCommand::Register {
            client_id,
            user_id,
            queue,
            writer: writer.abort_handle(),
            disconnect,
            response,
        })
        .await?;

        Ok(ClientConnection {
            client_id,
            user_id,
            writer,
            disconnected,
        })
    }

    pub async fn unregister(&self, client_id: ClientId) {
        let _ = self.send(HubCommand::Unregister { client_id }).await;
    }

    /// Route session events to this client as well; `None` unbinds
    pub async fn bind_session(&self, client_id: ClientId, session_id: Option<String>) -> HubResult<bool> {
        self.request(|response| HubCommand::BindSession {
            client_id,
            session_id,
            response,
        })
        .await
    }

    /// Fails with [`HubError::ClientGone`] when the client is no longer
    /// registered or was dropped for falling behind
    pub async fn send_to_client(&self, client_id: ClientId, event: &HubEvent) -> HubResult<()> {
        let frame = event.to_frame()?;
        let delivered = self
            .request(|response| HubCommand::SendToClient {
                client_id,
                frame,
                response,
            })
            .await?;
        if delivered {
            Ok(())
        } else {
            Err(HubError::ClientGone(client_id))
        }
    }

    /// Returns the number of clients the event was queued for
    pub async fn send_to_user(&self, user_id: UserId, event: &HubEvent) -> HubResult<usize> {
        let frame = event.to_frame()?;
        self.request(|response| HubCommand::SendToUser {
            user_id,
            frame,
            response,
        })
        .await
    }

    pub async fn send_to_session(&self, session_id: &str, event: &HubEvent) -> HubResult<usize> {
        let frame = event.to_frame()?;
        let session_id = session_id.to_string();
        self.request(|response| HubCommand::SendToSession {
            session_id,
            frame,
            response,
        })
        .await
    }

    pub async fn broadcast(&self, event: &HubEvent) -> HubResult<usize> {
        let frame = event.to_frame()?;
        self.request(|response| HubCommand::Broadcast { frame, response })
            .await
    }

    pub async fn online_count(&self) -> HubResult<usize> {
        self.request(|response| HubCommand::OnlineCount { response })
            .await
    }

    pub async fn online_users(&self) -> HubResult<Vec<UserId>> {
        self.request(|response| HubCommand::OnlineUsers { response })
            .await
    }

    pub async fn shutdown(&self) {
        let _ = self.send(HubCommand::Shutdown).await;
    }
}

#[async_trait]
impl EventPublisher for HubHandle {
    async fn publish(&self, event: HubEvent) {
        let route = event.route();
        let (user_id, session_id) = (route.user_id, route.session_id.map(str::to_string));
        if user_id.is_none() && session_id.is_none() {
            return;
        }

        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                log::error!("Failed to encode hub event: {}", e);
                return;
            }
        };

        if self
            .send(HubCommand::Publish {
                user_id,
                session_id,
                frame,
            })
            .await
            .is_err()
        {
            log::debug!("Hub closed; event dropped");
        }
    }
}
