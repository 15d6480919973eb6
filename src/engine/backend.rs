// src/engine/backend.rs

//! Seams between the refresh controller and the components it drives.
//!
//! Production uses [`Reloader`] and [`SyncServer`]; tests can plug in
//! recorders that don't spawn processes or open sockets.

use std::future::Future;
use std::pin::Pin;

use crate::reload::Reloader;
use crate::sync::SyncServer;

/// Something that can rebuild and restart the user's program.
pub trait ReloadBackend: Send + Sync {
    /// Start a new cycle and wait until it has launched.
    ///
    /// Resolves to `false` if the cycle failed or was superseded.
    fn reload(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;
}

/// Something that can tell browsers to refresh.
pub trait SyncBackend: Send + Sync {
    /// Fire-and-forget broadcast.
    fn sync(&self);
}

impl ReloadBackend for Reloader {
    fn reload(&self) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        Box::pin(async move {
            let launched = self.run().await;
            launched.await.is_ok()
        })
    }
}

impl SyncBackend for SyncServer {
    fn sync(&self) {
        SyncServer::sync(self);
    }
}
