//! Logging setup.
//!
//! The library only emits `tracing` events; binaries and tests that want to
//! see them install a subscriber here.

use tracing_subscriber::EnvFilter;

/// Installs a stderr subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once: returns false when a global subscriber was
/// already installed.
pub fn init_stderr_logging() -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .with_writer(std::io::stderr)
        .try_init()
        .is_ok()
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
