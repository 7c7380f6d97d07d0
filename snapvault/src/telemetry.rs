//! Tracing initialization.
//!
//! Sets up tracing-subscriber with an `EnvFilter` (honouring `RUST_LOG`) and a
//! console fmt layer. Called once from `main` before the application starts.

use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber.
///
/// Defaults to `info` when `RUST_LOG` is unset. Safe to call only once per
/// process; returns an error if a subscriber is already installed.
pub fn init_telemetry() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    info!("Telemetry initialized");
    Ok(())
}
