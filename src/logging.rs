//! Tracing initialization, in the teacher's style (`chopin_core::logging`).
//! Call once at process startup, before constructing a `Server`/`Client`.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging with sensible defaults. The level is controlled by
/// `RUST_LOG`; falls back to `info` if unset or invalid.
///
/// # Panics
///
/// Panics if called more than once per process.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Like [`init_logging`], but with a programmatic default level instead of
/// `RUST_LOG`'s "info" fallback.
pub fn init_logging_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
