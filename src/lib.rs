// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod reload;
pub mod sync;
pub mod types;
pub mod watch;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::{load_raw, resolve_settings, Settings};

pub use engine::{Devmon, RunningDevmon};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - the resolved settings
/// - the watch/reload/sync session
/// - Ctrl-C (and SIGTERM) handling
pub async fn run(args: CliArgs, settings: Settings) -> Result<()> {
    if args.dry_run {
        print_dry_run(&settings);
        return Ok(());
    }

    let devmon = Devmon::new(settings);
    spawn_signal_listener(devmon.shutdown_token());

    info!(target: "devmon", root = %devmon.settings().root.display(), "starting");
    devmon.start().await?;
    Ok(())
}

/// Load the config named by the CLI (or the default) and apply CLI
/// overrides before resolving it.
pub fn settings_from_args(args: &CliArgs) -> errors::Result<Settings> {
    let (mut raw, base) = load_raw(args.config.as_deref())?;
    if args.no_reload {
        raw.reload.enabled = false;
    }
    if args.no_sync {
        raw.sync.enabled = false;
    }
    if let Some(port) = args.port {
        raw.sync.port = port;
    }
    resolve_settings(raw, &base)
}

fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    eprintln!("failed to listen for Ctrl+C: {e}");
                    return;
                }
            }
            _ = terminate_signal() => {}
        }
        shutdown.cancel();
    });
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        }
        Err(_) => std::future::pending::<()>().await,
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await
}

/// Simple dry-run output: print the resolved settings.
fn print_dry_run(settings: &Settings) {
    println!("devmon dry-run");
    println!("  root = {}", settings.root.display());
    println!("  delay = {:?}", settings.delay);
    println!("  log_dir = {}", settings.log_dir.display());
    println!();

    println!("watch:");
    println!("  include_exts: {:?}", settings.watch.include_exts);
    println!("  exclude_dirs: {:?}", settings.watch.exclude_dirs);
    if !settings.watch.include_dirs.is_empty() {
        println!("  include_dirs: {:?}", settings.watch.include_dirs);
    }
    if !settings.watch.exclude_files.is_empty() {
        println!("  exclude_files: {:?}", settings.watch.exclude_files);
    }

    let reload = &settings.reload;
    println!("reload: {}", if reload.enabled { "enabled" } else { "disabled" });
    if reload.enabled {
        println!("  build: {}", reload.effective_build_command());
        println!("  run: {}", reload.effective_run_command());
        println!("  build log: {}", reload.build_log.display());
    }

    if settings.sync.enabled {
        println!("sync: ws://localhost:{}{}", settings.sync.port, sync::SYNC_ROUTE);
    } else {
        println!("sync: disabled");
    }

    debug!("dry-run complete (no execution)");
}
