//! Log output for the gateway binary.
//!
//! `serve` with `--logs-dir` gets a JSON file (one per day) next to the
//! human-readable stderr stream; every submission's `request_id` span field
//! is carried into the JSON records. One-shot commands only log to stderr so
//! stdout stays reserved for results.
//!
//! The configured level is a fallback; `RUST_LOG` takes precedence.

use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// File name prefix; the appender adds a `.YYYY-MM-DD` suffix.
pub const LOG_FILE_PREFIX: &str = "snippet-gate.log";

/// Keeps the background log writer alive.
///
/// Hold it until `serve` returns; dropping it flushes buffered records.
pub struct LoggingGuard {
    _writer: WorkerGuard,
}

fn filter(fallback_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback_level))
}

/// Install JSON file logging plus stderr for the long-running `serve` loop.
///
/// # Errors
///
/// Fails if `logs_dir` cannot be created or another global subscriber is
/// already installed.
pub fn init_service(logs_dir: &Path, fallback_level: &str) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(filter(fallback_level))
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(LoggingGuard { _writer: guard })
}

/// Install stderr-only logging for one-shot commands.
///
/// A subscriber that is already installed is left in place.
pub fn init_console(fallback_level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(fallback_level))
        .with_writer(std::io::stderr)
        .try_init();
}
