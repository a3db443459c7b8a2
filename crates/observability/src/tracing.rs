//! Tracing/logging initialization.
//!
//! JSON output so the downstream log collector can index the per-request
//! fields emitted by the fault boundary.

use tracing_subscriber::EnvFilter;

use crate::level::LogLevel;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    init_with_filter(filter);
}

/// Initialize with a fixed minimum level, ignoring `RUST_LOG`.
pub fn init_with_level(level: LogLevel) {
    init_with_filter(EnvFilter::new(level.as_filter()));
}

fn init_with_filter(filter: EnvFilter) {
    // JSON logs + timestamps.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
