// src/reload/mod.rs

//! Build/run/kill supervision of the user's program.
//!
//! - [`build`] runs the build command and writes the build log.
//! - [`run`] launches the program and mirrors its output.
//! - [`kill`] watches a running program and tears it down on request.
//! - [`command`] builds the platform-specific child commands.
//!
//! At most one build and one running program exist at any time. Every
//! [`Reloader::run`] first cleans up the previous cycle.

pub mod build;
pub mod command;
pub mod kill;
pub mod run;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::Settings;
use crate::types::ReloadState;

pub use kill::{platform_terminator, ProcessTerminator, KILL_GRACE};

/// Handle to a running program's supervisor.
#[derive(Debug)]
struct ActiveRun {
    stop: oneshot::Sender<()>,
    finished: oneshot::Receiver<()>,
}

#[derive(Debug, Default)]
struct Inner {
    state: ReloadState,
    build_cancel: Option<CancellationToken>,
    active: Option<ActiveRun>,
}

#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) settings: Arc<Settings>,
    pub(crate) terminator: Arc<dyn ProcessTerminator>,
    /// Single permit: held for a whole build-and-launch sequence.
    build_guard: Semaphore,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set_state(&self, state: ReloadState) {
        self.lock().state = state;
    }
}

/// Cloneable handle to the build/run supervisor.
#[derive(Debug, Clone)]
pub struct Reloader {
    shared: Arc<Shared>,
}

impl Reloader {
    pub fn new(settings: Arc<Settings>) -> Self {
        Self::with_terminator(settings, platform_terminator())
    }

    pub fn with_terminator(settings: Arc<Settings>, terminator: Arc<dyn ProcessTerminator>) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings,
                terminator,
                build_guard: Semaphore::new(1),
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    pub fn state(&self) -> ReloadState {
        self.shared.lock().state
    }

    /// Whether a program instance is currently owned by the reloader.
    pub fn is_running(&self) -> bool {
        self.shared.lock().active.is_some()
    }

    /// Clean up the previous cycle, then build and launch in the background.
    ///
    /// The returned receiver resolves once the program has been spawned. It
    /// fails (sender dropped) if the build fails, the launch fails, or a later
    /// `run`/`cleanup` supersedes this cycle.
    pub async fn run(&self) -> oneshot::Receiver<()> {
        self.cleanup().await;

        let (launched_tx, launched_rx) = oneshot::channel();
        let cancel = CancellationToken::new();
        if let Some(previous) = self.shared.lock().build_cancel.replace(cancel.clone()) {
            previous.cancel();
        }

        let this = self.clone();
        tokio::spawn(async move { this.start(cancel, launched_tx).await });
        launched_rx
    }

    /// Stop any pending build and any running program.
    ///
    /// Returns after the program has been terminated and its binary removed.
    pub async fn cleanup(&self) {
        self.build_cleanup().await;
        self.run_cleanup().await;
    }

    /// Cancel the pending build and wait until its task has wound down.
    async fn build_cleanup(&self) {
        let token = self.shared.lock().build_cancel.take();
        if let Some(token) = token {
            token.cancel();
        }
        // Wait for an in-flight start to release the guard.
        let _permit = self.shared.build_guard.acquire().await;
    }

    /// Signal the running program to stop and wait for the acknowledgment.
    async fn run_cleanup(&self) {
        let active = {
            let mut inner = self.shared.lock();
            let active = inner.active.take();
            if active.is_some() {
                inner.state = ReloadState::Killing;
            }
            active
        };
        if let Some(active) = active {
            let _ = active.stop.send(());
            let _ = active.finished.await;
        }
    }

    async fn start(&self, cancel: CancellationToken, launched: oneshot::Sender<()>) {
        let Ok(_permit) = self.shared.build_guard.acquire().await else {
            return;
        };
        if cancel.is_cancelled() {
            debug!(target: "build", "build cancelled before start");
            return;
        }

        // Another cycle may have launched while this one was queued.
        self.run_cleanup().await;

        self.shared.set_state(ReloadState::Building);
        let settings = &self.shared.settings.reload;
        match build::build(settings, &cancel, self.shared.terminator.as_ref()).await {
            Ok(build::BuildOutcome::Built) => {}
            Ok(build::BuildOutcome::Cancelled) => {
                debug!(target: "build", "build cancelled");
                self.shared.set_state(ReloadState::Idle);
                return;
            }
            Err(err) => {
                error!(target: "build", "{err}");
                self.shared.set_state(ReloadState::Idle);
                return;
            }
        }

        let child = match run::launch(settings) {
            Ok(child) => child,
            Err(err) => {
                error!(target: "run", "{err}");
                self.shared.set_state(ReloadState::Idle);
                return;
            }
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let (finished_tx, finished_rx) = oneshot::channel();
        tokio::spawn(kill::supervise(
            child,
            stop_rx,
            finished_tx,
            Arc::clone(&self.shared),
        ));

        let superseded = {
            let mut inner = self.shared.lock();
            let active = ActiveRun {
                stop: stop_tx,
                finished: finished_rx,
            };
            if cancel.is_cancelled() {
                Some(active)
            } else {
                inner.active = Some(active);
                inner.state = ReloadState::Running;
                None
            }
        };

        if let Some(pending) = superseded {
            // Cleanup ran between build and launch and is waiting on the
            // guard we still hold: stop the fresh instance before releasing.
            debug!(target: "run", "launch superseded; stopping program");
            let _ = pending.stop.send(());
            let _ = pending.finished.await;
            return;
        }

        info!(target: "run", "program running");
        let _ = launched.send(());
    }
}
