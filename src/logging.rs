//! Tracing subscriber setup
//!
//! The library itself only emits `tracing` events. Applications embedding the
//! tracker can call [`init`] once to install a formatter driven by
//! [`LoggingConfig`]; `RUST_LOG` still takes precedence over the configured
//! level.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Build the env filter for a logging config
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let level = config.log_level()?;
    Ok(EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy())
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails on an unknown level or format, or when a global subscriber is
/// already set.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match config.format.to_lowercase().as_str() {
        "json" => builder.json().try_init(),
        "pretty" => builder.pretty().try_init(),
        "compact" => builder.compact().try_init(),
        other => anyhow::bail!("Invalid log format: {}", other),
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to install tracing subscriber: {}", e))
}
