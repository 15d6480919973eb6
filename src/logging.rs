// src/logging.rs

//! Logging setup for `devmon` using `tracing` + `tracing-subscriber`.
//!
//! Status lines carry their subsystem as the target (`detection`, `build`,
//! `run`, `sync`, `devmon`); the program's own output is mirrored under
//! `app`. `DEVMON_LOG` takes full filter directives, so
//! `DEVMON_LOG=info,detection=debug` shows why each batch was (not) a change.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cli::LogLevel;

/// Environment variable read when no `--log-level` is given.
pub const LOG_ENV: &str = "DEVMON_LOG";

/// Install the global subscriber, writing to stderr. Call once at startup.
pub fn init_logging(cli_level: Option<LogLevel>, time: bool) -> Result<()> {
    let env = std::env::var(LOG_ENV).ok();
    let filter = log_filter(cli_level, env.as_deref());

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    let installed = if time {
        builder.try_init()
    } else {
        builder.without_time().try_init()
    };
    installed.map_err(|e| anyhow!("installing log subscriber: {e}"))
}

/// The CLI level wins over `env` directives; `info` otherwise.
///
/// Unparseable directives fall back to `info` rather than failing startup.
pub fn log_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.as_str());
    }
    env.map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| EnvFilter::try_new(s).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}
