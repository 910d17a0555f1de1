//! Logging initialisation shared by the binaries.

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Map the wire log-level names onto a tracing directive.
fn directive(level: &str) -> &'static str {
    match level {
        "debug" => "debug",
        "warn" => "warn",
        "critical" => "error",
        _ => "info",
    }
}

/// Initialise the global subscriber.
///
/// With a non-empty directory, output goes to a daily-rolling file named
/// after `prefix`; the returned guard must be held for the lifetime of
/// the process so buffered lines are flushed on exit. Otherwise output
/// goes to stdout.
///
/// # Errors
/// Returns an error when a global subscriber is already installed or the
/// level cannot be parsed.
#[must_use = "hold the guard for the lifetime of the process"]
pub fn init(level: &str, directory: &str, prefix: &str) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(directive(level))
        .map_err(|error| anyhow::anyhow!("invalid log level '{level}': {error}"))?;
    if directory.is_empty() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|error| anyhow::anyhow!("failed to initialise logging: {error}"))?;
        return Ok(None);
    }
    let appender = tracing_appender::rolling::daily(directory, format!("{prefix}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialise logging: {error}"))?;
    Ok(Some(guard))
}
