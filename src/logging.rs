//! Diagnostic logging setup.
//!
//! Logs go to stderr so command output on stdout stays parseable.
//! `RUST_LOG` wins when set; otherwise the `[logging] level` from the
//! config file is used.

use anyhow::{anyhow, Result};
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("invalid log level '{}': {}", level, e))?;

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    debug!(level, "logging initialized");
    Ok(())
}
