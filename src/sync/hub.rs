// src/sync/hub.rs

//! Single-owner registry of connected clients.
//!
//! All access goes through [`Hub`], which forwards commands to one task that
//! owns the client map. No locks are involved.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Capacity of each client's outbound queue.
pub const OUTBOUND_CAPACITY: usize = 256;

pub type ClientId = u64;

#[derive(Debug)]
enum HubCommand {
    Register {
        id: ClientId,
        queue: mpsc::Sender<String>,
    },
    Unregister(ClientId),
    Broadcast(String),
    ClientCount(oneshot::Sender<usize>),
    Stop(oneshot::Sender<()>),
}

/// Cloneable handle to the hub task.
#[derive(Debug, Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<HubCommand>,
    next_id: Arc<AtomicU64>,
}

impl Hub {
    /// Start the hub task. Must be called inside a tokio runtime.
    pub fn spawn() -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(hub_loop(rx));
        let hub = Self {
            commands: tx,
            next_id: Arc::new(AtomicU64::new(1)),
        };
        (hub, handle)
    }

    /// Register a new client and return its outbound queue.
    ///
    /// Returns `None` once the hub has stopped.
    pub fn register(&self) -> Option<(ClientId, mpsc::Receiver<String>)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (queue, rx) = mpsc::channel(OUTBOUND_CAPACITY);
        self.commands
            .send(HubCommand::Register { id, queue })
            .ok()?;
        Some((id, rx))
    }

    pub fn unregister(&self, id: ClientId) {
        let _ = self.commands.send(HubCommand::Unregister(id));
    }

    /// Queue `message` for every registered client without blocking.
    pub fn broadcast(&self, message: impl Into<String>) {
        let _ = self.commands.send(HubCommand::Broadcast(message.into()));
    }

    /// Number of registered clients, or 0 once the hub has stopped.
    pub async fn client_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(HubCommand::ClientCount(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    /// Close every client queue and end the hub task.
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(HubCommand::Stop(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn hub_loop(mut commands: mpsc::UnboundedReceiver<HubCommand>) {
    let mut clients: HashMap<ClientId, mpsc::Sender<String>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            HubCommand::Register { id, queue } => {
                clients.insert(id, queue);
                debug!(target: "sync", client = id, clients = clients.len(), "client registered");
            }
            HubCommand::Unregister(id) => {
                if clients.remove(&id).is_some() {
                    debug!(target: "sync", client = id, clients = clients.len(), "client unregistered");
                }
            }
            HubCommand::Broadcast(message) => {
                // Dropping a sender closes that client's queue; its write
                // pump then closes the connection.
                clients.retain(|id, queue| match queue.try_send(message.clone()) {
                    Ok(()) => true,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(target: "sync", client = *id, "client queue full; dropping client");
                        false
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => false,
                });
            }
            HubCommand::ClientCount(reply) => {
                let _ = reply.send(clients.len());
            }
            HubCommand::Stop(ack) => {
                clients.clear();
                let _ = ack.send(());
                break;
            }
        }
    }

    debug!(target: "sync", "hub stopped");
}
