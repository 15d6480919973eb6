// src/reload/command.rs

//! Child process construction.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// Build a shell command appropriate for the platform.
pub fn shell_command(cmdline: &str, working_dir: &Path) -> Command {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmdline);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmdline);
        c
    };
    cmd.current_dir(working_dir)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    cmd
}

/// Command for the build: piped output, own process group, so a cancelled
/// build can be stopped together with the compiler it started.
pub fn build_command(cmdline: &str, working_dir: &Path) -> Command {
    let mut cmd = shell_command(cmdline, working_dir);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Command for the user's program: piped output, own process group.
///
/// Without a custom command line the binary is executed directly, so a
/// missing binary surfaces as a spawn error.
pub fn program_command(run_command: Option<&str>, binary: &Path, working_dir: &Path) -> Command {
    let mut cmd = match run_command {
        Some(cmdline) => shell_command(cmdline, working_dir),
        None => {
            let mut c = Command::new(binary);
            c.current_dir(working_dir)
                .stdin(Stdio::null())
                .kill_on_drop(true);
            c
        }
    };
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}
