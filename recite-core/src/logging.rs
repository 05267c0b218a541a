//! Tracing subscriber setup for binaries and hosts embedding the engine

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Install a compact subscriber writing to stderr
///
/// `RUST_LOG` wins over `default_level` when set. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| Error::Config(format!("invalid log level {default_level:?}: {e}")))?;

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .compact()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("tracing already initialized: {e}")))
}
