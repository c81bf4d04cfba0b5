//! Tracing subscriber setup. Opt-in: library crates only emit events;
//! embedders call this (or install their own subscriber).

use tracing_subscriber::{fmt, EnvFilter};

/// Install a global subscriber honouring `ENGRAM_LOG` (falling back to
/// `info`). JSON output suits log shippers; pretty suits terminals.
/// Returns quietly when a subscriber is already installed.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_env("ENGRAM_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let result = if json {
        fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .try_init()
    } else {
        fmt().with_env_filter(filter).try_init()
    };
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
