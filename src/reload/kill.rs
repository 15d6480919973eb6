// src/reload/kill.rs

//! Stopping the user's program.
//!
//! [`ProcessTerminator`] hides the platform difference: POSIX signals the
//! whole process group and escalates, Windows kills the process tree.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::errors::{DevmonError, Result};
use crate::reload::Shared;
use crate::types::ReloadState;

/// Delay between the graceful and the forceful signal.
pub const KILL_GRACE: Duration = Duration::from_millis(100);

/// Terminates a child together with everything it spawned.
pub trait ProcessTerminator: Send + Sync + Debug {
    /// Stop the process tree rooted at `pid` and reap `child`.
    ///
    /// `pid` is the id the child was spawned with. It stays meaningful after
    /// the child itself has exited and been reaped, so stragglers it left in
    /// its group are still reached.
    fn terminate<'a>(
        &'a self,
        pid: u32,
        child: &'a mut Child,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// SIGINT to the process group, grace delay, SIGKILL, reap.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct ProcessGroupTerminator {
    pub grace: Duration,
}

#[cfg(unix)]
impl Default for ProcessGroupTerminator {
    fn default() -> Self {
        Self { grace: KILL_GRACE }
    }
}

#[cfg(unix)]
impl ProcessTerminator for ProcessGroupTerminator {
    fn terminate<'a>(
        &'a self,
        pid: u32,
        child: &'a mut Child,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let pgid = pid as libc::pid_t;

            signal_group(pgid, libc::SIGINT)?;
            tokio::time::sleep(self.grace).await;
            signal_group(pgid, libc::SIGKILL)?;

            child
                .wait()
                .await
                .map_err(|e| DevmonError::Terminate(format!("reaping {pid}: {e}")))?;
            Ok(())
        })
    }
}

#[cfg(unix)]
fn signal_group(pgid: libc::pid_t, signal: libc::c_int) -> Result<()> {
    // SAFETY: kill(2) has no memory-safety preconditions.
    let rc = unsafe { libc::kill(-pgid, signal) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Group already gone.
        return Ok(());
    }
    Err(DevmonError::Terminate(format!(
        "signal {signal} to process group {pgid}: {err}"
    )))
}

/// `taskkill /T /F /PID <pid>`.
#[cfg(windows)]
#[derive(Debug, Clone, Default)]
pub struct TreeKillTerminator;

#[cfg(windows)]
impl ProcessTerminator for TreeKillTerminator {
    fn terminate<'a>(
        &'a self,
        pid: u32,
        child: &'a mut Child,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let status = tokio::process::Command::new("taskkill")
                .args(["/T", "/F", "/PID", &pid.to_string()])
                .status()
                .await
                .map_err(|e| DevmonError::Terminate(format!("taskkill {pid}: {e}")))?;
            if !status.success() {
                return Err(DevmonError::Terminate(format!(
                    "taskkill {pid} exited with {status}"
                )));
            }
            child
                .wait()
                .await
                .map_err(|e| DevmonError::Terminate(format!("reaping {pid}: {e}")))?;
            Ok(())
        })
    }
}

/// The terminator for the current platform.
pub fn platform_terminator() -> Arc<dyn ProcessTerminator> {
    #[cfg(unix)]
    {
        Arc::new(ProcessGroupTerminator::default())
    }
    #[cfg(windows)]
    {
        Arc::new(TreeKillTerminator)
    }
}

/// Watch a running child until asked to stop, then tear it down.
///
/// A child that exits by itself is logged and the state drops back to idle,
/// but the slot stays occupied until the stop signal: whatever the program
/// left running in its process group is only stopped then.
pub(crate) async fn supervise(
    mut child: Child,
    mut stop_rx: oneshot::Receiver<()>,
    finished_tx: oneshot::Sender<()>,
    shared: Arc<Shared>,
) {
    let pid = child.id();

    // A dropped sender also means stop.
    let natural_exit = tokio::select! {
        _ = &mut stop_rx => None,
        status = child.wait() => Some(status),
    };

    let mut exited: Option<ExitStatus> = None;
    if let Some(status) = natural_exit {
        match status {
            Ok(status) => {
                info!(target: "run", "program exited with {status}");
                exited = Some(status);
            }
            Err(err) => warn!(target: "run", error = %err, "waiting for program"),
        }
        shared.set_state(ReloadState::Idle);
        let _ = stop_rx.await;
    }

    shared.set_state(ReloadState::Killing);

    if let Some(pid) = pid {
        match shared.terminator.terminate(pid, &mut child).await {
            Ok(()) if exited.is_some() => debug!(target: "run", "process group {pid} cleared"),
            Ok(()) => info!(target: "run", "program stopped"),
            Err(err) => match child.try_wait() {
                Ok(Some(status)) => {
                    debug!(target: "run", error = %err, "program already exited with {status}");
                }
                _ => {
                    error!(target: "run", error = %err, "cannot stop program; exiting to avoid an orphaned process");
                    std::process::exit(1);
                }
            },
        }
    }

    remove_binary(&shared).await;
    shared.set_state(ReloadState::Idle);
    let _ = finished_tx.send(());
}

async fn remove_binary(shared: &Shared) {
    let binary = &shared.settings.reload.binary;
    match tokio::fs::remove_file(binary).await {
        Ok(()) => debug!(target: "run", "removed {}", binary.display()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(target: "run", error = %err, "cannot remove {}", binary.display()),
    }
}
