// src/sync/server.rs

//! HTTP endpoint that upgrades browser connections to websockets.

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::sync::client::{serve_client, KeepAlive};
use crate::sync::hub::Hub;

/// Route clients connect to.
pub const SYNC_ROUTE: &str = "/sync";

/// Payload pushed to every client after a reload.
pub const SYNC_MESSAGE: &str = "sync";

/// Upper bound for [`SyncServer::stop`].
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Websocket server plus the hub that fans messages out to its clients.
#[derive(Debug)]
pub struct SyncServer {
    hub: Hub,
    local_addr: SocketAddr,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncServer {
    /// Bind `addr` and start accepting connections.
    pub async fn start(addr: SocketAddr, keepalive: KeepAlive) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let cancel = CancellationToken::new();
        let (hub, hub_task) = Hub::spawn();

        let accept_task = tokio::spawn(accept_loop(
            listener,
            hub.clone(),
            keepalive,
            cancel.clone(),
        ));

        info!(target: "sync", "listening on ws://{local_addr}{SYNC_ROUTE}");

        Ok(Self {
            hub,
            local_addr,
            cancel,
            tasks: Mutex::new(vec![accept_task, hub_task]),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Tell every connected client to refresh.
    pub fn sync(&self) {
        debug!(target: "sync", "broadcasting {SYNC_MESSAGE:?}");
        self.hub.broadcast(SYNC_MESSAGE);
    }

    /// Disconnect all clients and stop accepting. Bounded by
    /// [`SHUTDOWN_TIMEOUT`].
    pub async fn stop(&self) {
        self.hub.stop().await;
        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        let joined = timeout(SHUTDOWN_TIMEOUT, async {
            for task in tasks {
                let _ = task.await;
            }
        })
        .await;
        if joined.is_err() {
            warn!(target: "sync", "server did not stop within {:?}", SHUTDOWN_TIMEOUT);
        }
        info!(target: "sync", "server stopped");
    }
}

async fn accept_loop(listener: TcpListener, hub: Hub, keepalive: KeepAlive, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(stream, peer, hub.clone(), keepalive));
                }
                Err(err) => warn!(target: "sync", error = %err, "accept failed"),
            },
        }
    }
    debug!(target: "sync", "accept loop finished");
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, hub: Hub, keepalive: KeepAlive) {
    // A peer that connects and never finishes the upgrade must not pin this task.
    let socket = match timeout(keepalive.write_wait, accept_hdr_async(stream, check_route)).await {
        Ok(Ok(socket)) => socket,
        Ok(Err(err)) => {
            debug!(target: "sync", %peer, error = %err, "handshake failed");
            return;
        }
        Err(_) => {
            debug!(target: "sync", %peer, "handshake timed out");
            return;
        }
    };

    let Some((id, queue)) = hub.register() else {
        return;
    };
    info!(target: "sync", %peer, client = id, "client connected");
    serve_client(socket, hub, id, queue, keepalive).await;
    info!(target: "sync", %peer, client = id, "client disconnected");
}

/// Only the sync route upgrades. Any origin is accepted.
fn check_route(request: &Request, response: Response) -> std::result::Result<Response, ErrorResponse> {
    if request.uri().path() == SYNC_ROUTE {
        return Ok(response);
    }
    let mut not_found = ErrorResponse::new(Some(format!("no route {}", request.uri().path())));
    *not_found.status_mut() = StatusCode::NOT_FOUND;
    Err(not_found)
}
