//! Development-time tracing for the repair binaries.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. Episode logs written
//! with `--log-dir` (`io/episode_log`) are product artifacts and do not depend
//! on it.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format, so
/// stdout stays machine-readable.
///
/// # Example
/// ```bash
/// RUST_LOG=repair=debug repair run --task task.json
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
