// src/reload/build.rs

//! Build step: run the build command and capture its output in the build log.

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ReloadSettings;
use crate::errors::{DevmonError, Result};
use crate::reload::command::build_command;
use crate::reload::kill::ProcessTerminator;

/// How a build ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Built,
    /// `cancel` fired; the build's process group has been stopped and reaped.
    Cancelled,
}

/// Run the configured build command to completion or until `cancel` fires.
///
/// Combined stdout/stderr is written to the build log. On cancellation the
/// whole process group is stopped through `terminator` before returning, so
/// nothing from this build outlives the call.
pub async fn build(
    settings: &ReloadSettings,
    cancel: &CancellationToken,
    terminator: &dyn ProcessTerminator,
) -> Result<BuildOutcome> {
    tokio::fs::create_dir_all(&settings.build_dir).await?;
    if let Some(log_dir) = settings.build_log.parent() {
        tokio::fs::create_dir_all(log_dir).await?;
    }

    let cmdline = settings.effective_build_command();
    info!(target: "build", "building: {cmdline}");

    let mut child = build_command(&cmdline, &settings.working_dir)
        .spawn()
        .map_err(|e| DevmonError::Build(format!("spawning `{cmdline}`: {e}")))?;
    let pid = child.id();

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let output = tokio::spawn(async move {
        let (mut out, err) = tokio::join!(read_all(stdout), read_all(stderr));
        out.extend_from_slice(&err);
        out
    });

    let finished = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        status = child.wait() => Some(status),
    };

    let Some(status) = finished else {
        if let Some(pid) = pid {
            if let Err(err) = terminator.terminate(pid, &mut child).await {
                warn!(target: "build", error = %err, "stopping cancelled build");
            }
        }
        output.abort();
        return Ok(BuildOutcome::Cancelled);
    };
    let status = status.map_err(|e| DevmonError::Build(format!("waiting for `{cmdline}`: {e}")))?;

    let log = output.await.unwrap_or_default();
    tokio::fs::write(&settings.build_log, &log).await?;

    for line in String::from_utf8_lossy(&log).lines() {
        debug!(target: "build", "{line}");
    }

    if !status.success() {
        return Err(DevmonError::Build(format!(
            "`{cmdline}` exited with {status}; see {}",
            settings.build_log.display()
        )));
    }

    info!(target: "build", "build finished");
    Ok(BuildOutcome::Built)
}

async fn read_all<R: AsyncRead + Unpin>(reader: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        let _ = reader.read_to_end(&mut buf).await;
    }
    buf
}
