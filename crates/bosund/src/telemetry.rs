//! Telemetry initialization for the bosun daemon.

use tracing_subscriber::EnvFilter;

/// Initialize the `tracing` subscriber.
///
/// Respects the `RUST_LOG` env var if set, otherwise uses the configured
/// level. Call once at startup, before any `tracing` events are emitted.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
