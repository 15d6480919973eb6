// src/engine/refresh.rs

//! The top-level reload loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::backend::{ReloadBackend, SyncBackend};
use crate::types::ChangeNotification;

/// Runs one refresh at startup and one per change notification, strictly
/// one after another.
///
/// A refresh reloads the program (when a reload backend is present) and
/// then, if the program launched, syncs the browsers (when a sync backend is
/// present).
pub struct RefreshController {
    reloader: Option<Arc<dyn ReloadBackend>>,
    sync: Option<Arc<dyn SyncBackend>>,
    changes: mpsc::Receiver<ChangeNotification>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RefreshController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshController")
            .field("reload", &self.reloader.is_some())
            .field("sync", &self.sync.is_some())
            .finish_non_exhaustive()
    }
}

impl RefreshController {
    pub fn new(
        reloader: Option<Arc<dyn ReloadBackend>>,
        sync: Option<Arc<dyn SyncBackend>>,
        changes: mpsc::Receiver<ChangeNotification>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reloader,
            sync,
            changes,
            cancel,
        }
    }

    /// Loop until cancelled or the notification source goes away.
    ///
    /// Returns the number of refreshes that completed.
    pub async fn run(mut self) -> usize {
        let mut completed = 0;

        if self.refresh().await {
            completed += 1;
        }

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,

                notification = self.changes.recv() => match notification {
                    Some(n) if n.changed => {
                        debug!(target: "devmon", paths = n.paths.len(), "change detected");
                        if self.refresh().await {
                            completed += 1;
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        info!(target: "devmon", "refresh loop stopped");
        completed
    }

    async fn refresh(&self) -> bool {
        let launched = match &self.reloader {
            Some(reloader) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                launched = reloader.reload() => launched,
            },
            None => true,
        };

        if !launched {
            warn!(target: "devmon", "program did not start; skipping sync");
            return false;
        }

        if let Some(sync) = &self.sync {
            sync.sync();
        }
        true
    }
}
