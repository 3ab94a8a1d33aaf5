//! The hub loop: sole owner of the set of active connections.
//!
//! Registration, unregistration and broadcast arrive on three channels and are
//! processed one at a time by a single task, so the active set needs no lock.
//! `tokio::select!` picks among ready channels at random; no ordering between
//! the three request kinds is promised. A registration is acknowledged only
//! after the loop has processed it, so anything a connection submits after
//! [`HubHandle::register`] returns is handled after its registration.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::sync::mpsc::error::TrySendError;

use super::client::{Client, ConnId};
use super::presence::{PresenceGateway, UserExistence};

/// Capacity of each request channel. Submitters wait when it is full.
const REQUEST_CAPACITY: usize = 256;

/// Returned by [`HubHandle`] when the hub loop is no longer running.
#[derive(Debug, thiserror::Error)]
#[error("hub loop has stopped")]
pub struct HubClosed;

/// A registration and the ack the loop sends once it has been processed.
type RegisterRequest = (Client, oneshot::Sender<()>);

/// Tunables for the hub loop.
#[derive(Debug, Clone, Default)]
pub struct HubOptions {
    /// Mark a user offline when their connection is dropped as a slow
    /// consumer, the same way an explicit unregister does.
    pub offline_on_evict: bool,
}

/// Cloneable submission side of the hub. Store in AppState.
#[derive(Clone)]
pub struct HubHandle {
    register_tx: mpsc::Sender<RegisterRequest>,
    unregister_tx: mpsc::Sender<ConnId>,
    broadcast_tx: mpsc::Sender<Bytes>,
    connected: Arc<AtomicUsize>,
}

impl HubHandle {
    /// Submit a freshly accepted connection and wait until the loop has
    /// processed it.
    ///
    /// Returning `Ok` does not mean the connection was admitted: if presence
    /// cannot be updated the hub drops the handle, which closes its outbound
    /// buffer.
    pub async fn register(&self, client: Client) -> Result<(), HubClosed> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.register_tx
            .send((client, ack_tx))
            .await
            .map_err(|_| HubClosed)?;
        ack_rx.await.map_err(|_| HubClosed)
    }

    /// Submit a closed connection for removal. Unknown ids are ignored.
    pub async fn unregister(&self, conn_id: ConnId) -> Result<(), HubClosed> {
        self.unregister_tx.send(conn_id).await.map_err(|_| HubClosed)
    }

    /// Submit a payload for delivery to every active connection.
    pub async fn broadcast(&self, payload: Bytes) -> Result<(), HubClosed> {
        self.broadcast_tx.send(payload).await.map_err(|_| HubClosed)
    }

    /// Number of active connections as of the last request the hub finished.
    pub fn connected_count(&self) -> usize {
        self.connected.load(Ordering::Relaxed)
    }
}

pub struct Hub {
    clients: HashSet<Client>,
    presence: Arc<dyn PresenceGateway>,
    options: HubOptions,
    connected: Arc<AtomicUsize>,
    register_rx: mpsc::Receiver<RegisterRequest>,
    unregister_rx: mpsc::Receiver<ConnId>,
    broadcast_rx: mpsc::Receiver<Bytes>,
}

impl Hub {
    pub fn new(presence: Arc<dyn PresenceGateway>, options: HubOptions) -> (Self, HubHandle) {
        let (register_tx, register_rx) = mpsc::channel(REQUEST_CAPACITY);
        let (unregister_tx, unregister_rx) = mpsc::channel(REQUEST_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(REQUEST_CAPACITY);
        let connected = Arc::new(AtomicUsize::new(0));

        let hub = Self {
            clients: HashSet::new(),
            presence,
            options,
            connected: connected.clone(),
            register_rx,
            unregister_rx,
            broadcast_rx,
        };
        let handle = HubHandle {
            register_tx,
            unregister_tx,
            broadcast_tx,
            connected,
        };
        (hub, handle)
    }

    /// Run the loop until every [`HubHandle`] has been dropped.
    ///
    /// Remaining connections are dropped on return, closing their buffers.
    pub async fn run(mut self) {
        tracing::info!(offline_on_evict = self.options.offline_on_evict, "hub loop started");

        loop {
            tokio::select! {
                Some((client, ack)) = self.register_rx.recv() => {
                    self.register(client).await;
                    self.publish_count();
                    // The submitter may have given up waiting.
                    let _ = ack.send(());
                }
                Some(conn_id) = self.unregister_rx.recv() => {
                    self.unregister(&conn_id).await;
                    self.publish_count();
                }
                Some(payload) = self.broadcast_rx.recv() => {
                    self.broadcast(payload).await;
                    self.publish_count();
                }
                else => break,
            }
        }

        tracing::info!(remaining = self.clients.len(), "hub loop stopped");
    }

    fn publish_count(&self) {
        self.connected.store(self.clients.len(), Ordering::Relaxed);
    }

    async fn register(&mut self, client: Client) {
        let result = match self.presence.exists(&client.user_id).await {
            Ok(UserExistence::Exists) => {
                self.presence.set_online_status(&client.user_id, true).await
            }
            Ok(UserExistence::NotExists) => {
                self.presence
                    .create_user(&client.username, &client.user_id)
                    .await
            }
            Err(err) => Err(err),
        };

        if let Err(err) = result {
            tracing::warn!(
                conn_id = %client.conn_id(),
                user_id = %client.user_id,
                %err,
                "registration aborted, presence update failed"
            );
            return;
        }

        let conn_id = client.conn_id().clone();
        let user_id = client.user_id.clone();
        if self.clients.insert(client) {
            tracing::debug!(%conn_id, %user_id, "client connected");
        } else {
            tracing::warn!(%conn_id, %user_id, "duplicate registration ignored");
        }
    }

    async fn unregister(&mut self, conn_id: &ConnId) {
        let Some(client) = self.clients.get(conn_id) else {
            tracing::debug!(%conn_id, "unregister for inactive connection ignored");
            return;
        };

        self.mark_offline(&client.user_id).await;

        if let Some(client) = self.clients.take(conn_id) {
            tracing::debug!(%conn_id, user_id = %client.user_id, "client disconnected");
        }
    }

    async fn broadcast(&mut self, payload: Bytes) {
        let mut evicted = Vec::new();

        self.clients.retain(|client| match client.try_deliver(payload.clone()) {
            Ok(()) => {
                tracing::debug!(conn_id = %client.conn_id(), "sent to client");
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(
                    conn_id = %client.conn_id(),
                    user_id = %client.user_id,
                    "outbound buffer full, dropping client"
                );
                evicted.push(client.user_id.clone());
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(
                    conn_id = %client.conn_id(),
                    "outbound receiver gone, dropping client"
                );
                evicted.push(client.user_id.clone());
                false
            }
        });

        if self.options.offline_on_evict {
            for user_id in &evicted {
                self.mark_offline(user_id).await;
            }
        }
    }

    /// Flip a known user offline. Failures are logged and otherwise ignored.
    async fn mark_offline(&self, user_id: &str) {
        match self.presence.exists(user_id).await {
            Ok(UserExistence::Exists) => {
                if let Err(err) = self.presence.set_online_status(user_id, false).await {
                    tracing::warn!(%user_id, %err, "failed to mark user offline");
                }
            }
            Ok(UserExistence::NotExists) => {}
            Err(err) => tracing::warn!(%user_id, %err, "presence lookup failed"),
        }
    }
}
