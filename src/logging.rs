#![forbid(unsafe_code)]

use anyhow::Context as _;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::Layout;

/// Routes daemon logs to the log file. Keep the returned guard alive for the
/// lifetime of the process or buffered lines are lost.
pub fn init_file_logging(
    layout: &Layout,
    level: &str,
) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(&layout.log_dir)
        .with_context(|| format!("failed to create {}", layout.log_dir.display()))?;

    let file_appender = tracing_appender::rolling::never(&layout.log_dir, &layout.log_file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(guard)
}

/// Logs to stderr; used by the one-shot subcommands.
pub fn init_stderr_logging(level: &str) {
    let _ = tracing_subscriber::registry()
        .with(env_filter(level))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}
