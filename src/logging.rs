// Logging setup for embedders, binaries, and tests

use tracing_subscriber::EnvFilter;

/// Initialize structured logging from RUST_LOG, defaulting to info.
/// Safe to call repeatedly; only the first call installs a subscriber.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
