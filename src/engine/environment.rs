// src/engine/environment.rs

//! Wiring of the long-lived components and their ordered teardown.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::engine::backend::{ReloadBackend, SyncBackend};
use crate::engine::refresh::RefreshController;
use crate::errors::Result;
use crate::fs::RealFileSystem;
use crate::reload::Reloader;
use crate::sync::{KeepAlive, SyncServer};
use crate::types::ChangeNotification;
use crate::watch::{Detector, EventBatcher, Notifier};

/// Everything one watch session needs, built from [`Settings`].
#[derive(Debug)]
pub struct Environment {
    settings: Arc<Settings>,
    batcher: Arc<EventBatcher>,
    detector_cancel: CancellationToken,
    detector_task: JoinHandle<()>,
    reloader: Option<Reloader>,
    sync: Option<Arc<SyncServer>>,
}

impl Environment {
    /// Prepare directories, crawl the tree, and start the watch and sync
    /// services. Returns once every included directory is being watched.
    pub async fn setup(settings: Arc<Settings>, notifier: Notifier) -> Result<Self> {
        if settings.reload.enabled {
            tokio::fs::create_dir_all(&settings.reload.build_dir).await?;
            tokio::fs::create_dir_all(&settings.log_dir).await?;
        }

        let (batcher, batches) = EventBatcher::new(settings.delay)?;
        let batcher = Arc::new(batcher);

        let detector = Detector::new(
            &settings,
            Arc::new(RealFileSystem),
            batcher.clone(),
            notifier,
        );
        let detector = match detector.observe_blocking().await {
            Ok(detector) => detector,
            Err(err) => {
                batcher.close();
                return Err(err);
            }
        };

        let detector_cancel = CancellationToken::new();
        let detector_task = detector.spawn(batches, detector_cancel.clone());

        let reloader = settings
            .reload
            .enabled
            .then(|| Reloader::new(Arc::clone(&settings)));

        let sync = if settings.sync.enabled {
            let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, settings.sync.port));
            match SyncServer::start(addr, KeepAlive::default()).await {
                Ok(server) => Some(Arc::new(server)),
                Err(err) => {
                    detector_cancel.cancel();
                    batcher.close();
                    return Err(err);
                }
            }
        } else {
            None
        };

        Ok(Self {
            settings,
            batcher,
            detector_cancel,
            detector_task,
            reloader,
            sync,
        })
    }

    pub fn reloader(&self) -> Option<&Reloader> {
        self.reloader.as_ref()
    }

    pub fn sync_server(&self) -> Option<&Arc<SyncServer>> {
        self.sync.as_ref()
    }

    /// A controller driving this environment's reloader and sync server.
    pub fn controller(
        &self,
        changes: mpsc::Receiver<ChangeNotification>,
        cancel: CancellationToken,
    ) -> RefreshController {
        let reloader = self
            .reloader
            .clone()
            .map(|r| Arc::new(r) as Arc<dyn ReloadBackend>);
        let sync = self
            .sync
            .clone()
            .map(|s| s as Arc<dyn SyncBackend>);
        RefreshController::new(reloader, sync, changes, cancel)
    }

    /// Stop detection, the program, the sync server, and finally the OS
    /// watcher, in that order.
    pub async fn teardown(self) {
        self.detector_cancel.cancel();
        if let Err(err) = self.detector_task.await {
            warn!(target: "detection", error = %err, "detector task failed");
        }

        if let Some(reloader) = &self.reloader {
            reloader.cleanup().await;
        }

        if let Some(sync) = &self.sync {
            sync.stop().await;
        }

        self.batcher.close();

        if self.settings.reload.enabled && self.settings.reload.clean_build_dir {
            let build_dir = &self.settings.reload.build_dir;
            match tokio::fs::remove_dir_all(build_dir).await {
                Ok(()) => debug!(target: "devmon", "removed {}", build_dir.display()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => warn!(target: "devmon", error = %err, "cannot remove {}", build_dir.display()),
            }
        }

        info!(target: "devmon", "stopped");
    }
}
