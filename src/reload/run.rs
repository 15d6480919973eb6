// src/reload/run.rs

//! Launching the user's program and mirroring its output.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tracing::{info, warn};

use crate::config::ReloadSettings;
use crate::errors::{DevmonError, Result};
use crate::reload::command::program_command;

/// Spawn the program and start forwarding its output line by line.
pub fn launch(settings: &ReloadSettings) -> Result<Child> {
    let cmdline = settings.effective_run_command();
    if cfg!(windows) && !cmdline.trim_end_matches('"').ends_with(".exe") {
        warn!(target: "run", "`{cmdline}` does not end in .exe; cmd may refuse to run it");
    }

    let mut child = program_command(
        settings.run_command.as_deref(),
        &settings.binary,
        &settings.working_dir,
    )
    .spawn()
    .map_err(|e| DevmonError::Launch(format!("`{cmdline}`: {e}")))?;

    info!(target: "run", pid = child.id(), "started {cmdline}");

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                info!(target: "app", "{line}");
            }
        });
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                warn!(target: "app", "{line}");
            }
        });
    }

    Ok(child)
}
