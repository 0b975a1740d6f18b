//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the logging system with tracing.
///
/// Filtering comes from `RUST_LOG`; when unset, the workspace crates log
/// at `debug` and everything else at `info`.
///
/// # Example
/// ```
/// ember_core::init_logging();
/// tracing::info!("engine starting");
/// ```
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ember_rhi=debug,ember_renderer=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
