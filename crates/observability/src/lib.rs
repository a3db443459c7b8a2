//! Tracing/logging setup shared by the controller and every worker.

pub mod level;
pub mod tracing;

pub use level::LogLevel;

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Initialize with an explicit minimum level instead of `RUST_LOG`.
pub fn init_with_level(level: LogLevel) {
    tracing::init_with_level(level);
}
