// src/telemetry.rs
//! Tracing setup for the demo binary. Library code only emits events; the
//! binary decides whether and how they are rendered.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Compact stdout logs, filtered by `RUST_LOG` (default `info`).
/// Safe to call once; later calls are ignored.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}
