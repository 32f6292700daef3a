//! Tracing subscriber setup for test binaries.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the test harness. Both functions are no-ops if a global
//! subscriber is already set, so every test may call them.

use carbon_shared::errors::{CarbonError, CarbonResult};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

/// Log file prefix; files roll daily as `carbon-test-container.log.<date>`.
pub const LOG_FILE_PREFIX: &str = "carbon-test-container.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// Log to stderr and to a daily-rolling file under `dir`.
///
/// Keep the returned guard alive for as long as file output is wanted.
pub fn init_logging_with_file(dir: &Path) -> CarbonResult<WorkerGuard> {
    std::fs::create_dir_all(dir).map_err(|e| {
        CarbonError::Config(format!("failed to create log directory {}: {}", dir.display(), e))
    })?;

    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false),
        )
        .try_init();

    Ok(guard)
}
