//! Tracing subscriber setup for binaries and tests that embed the crate.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs a formatted tracing subscriber filtered by `RUST_LOG`.
///
/// Falls back to `default_directive` when `RUST_LOG` is unset, empty or
/// invalid. A subscriber installed earlier is left in place, so repeated
/// calls from tests are harmless.
pub fn init(default_directive: &str) {
    let filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|raw| {
            let directive = raw.trim();
            if directive.is_empty() {
                return None;
            }
            EnvFilter::try_new(directive).ok()
        })
        .or_else(|| EnvFilter::try_new(default_directive).ok())
        .unwrap_or_else(|| EnvFilter::new("off"));

    let installed = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
