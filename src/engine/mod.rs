// src/engine/mod.rs

//! Orchestration for devmon.
//!
//! This module ties together:
//! - change detection (the notification source),
//! - the [`RefreshController`] loop that reloads and syncs on every change,
//! - the [`Environment`] owning all long-lived components.

pub mod backend;
pub mod environment;
pub mod refresh;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Settings;
use crate::errors::Result;
use crate::types::{ChangeNotification, ReloadState};
use crate::watch::Notifier;

pub use backend::{ReloadBackend, SyncBackend};
pub use environment::Environment;
pub use refresh::RefreshController;

/// Top-level handle: configure, optionally subscribe, then start.
#[derive(Debug)]
pub struct Devmon {
    settings: Arc<Settings>,
    shutdown: CancellationToken,
    subscriber: Option<mpsc::UnboundedSender<ChangeNotification>>,
}

impl Devmon {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            shutdown: CancellationToken::new(),
            subscriber: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Receive one notification per evaluated batch, including explicit
    /// no-change acknowledgments.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ChangeNotification> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriber = Some(tx);
        rx
    }

    /// Cancelling this token stops a running session.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Set up the environment and start the refresh loop.
    ///
    /// Once this returns, the tree has been crawled and changes are being
    /// detected.
    pub async fn spawn(self) -> Result<RunningDevmon> {
        let (notifier, changes) = Notifier::channel();
        let notifier = match self.subscriber {
            Some(subscriber) => notifier.with_subscriber(subscriber),
            None => notifier,
        };

        let env = Environment::setup(Arc::clone(&self.settings), notifier).await?;
        let controller = env.controller(changes, self.shutdown.clone());
        let controller = tokio::spawn(controller.run());

        Ok(RunningDevmon {
            env,
            controller,
            shutdown: self.shutdown,
        })
    }

    /// Run until the shutdown token is cancelled, then tear down.
    pub async fn start(self) -> Result<()> {
        let running = self.spawn().await?;
        running.wait().await;
        Ok(())
    }
}

/// A started session.
#[derive(Debug)]
pub struct RunningDevmon {
    env: Environment,
    controller: JoinHandle<usize>,
    shutdown: CancellationToken,
}

impl RunningDevmon {
    /// Address of the sync server, if enabled.
    pub fn sync_addr(&self) -> Option<SocketAddr> {
        self.env.sync_server().map(|s| s.local_addr())
    }

    pub fn reload_state(&self) -> Option<ReloadState> {
        self.env.reloader().map(|r| r.state())
    }

    /// Wait for the shutdown token, then tear everything down.
    pub async fn wait(self) {
        self.shutdown.cancelled().await;
        self.finish().await;
    }

    /// Cancel and tear down.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.finish().await;
    }

    async fn finish(self) {
        info!(target: "devmon", "shutting down");
        let _ = self.controller.await;
        self.env.teardown().await;
    }
}
