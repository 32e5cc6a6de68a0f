// Configuration File Support
//
// TOML configuration for the quota tracker with environment variable
// overrides. Every section is optional; missing keys fall back to defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::QuotaError;
use crate::quota::InitialFill;

/// Default refill tick (1 second)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct QuotaConfig {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Registry configuration
    pub registry: RegistryConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Log format (json, pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    /// Interval between refill passes. Written as whole milliseconds in
    /// TOML under `tick_interval_ms`.
    #[serde(rename = "tick_interval_ms", with = "duration_ms")]
    pub tick_interval: Duration,

    /// Token count newly registered buckets start with
    pub initial_fill: InitialFill,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            initial_fill: InitialFill::Full,
        }
    }
}

impl RegistryConfig {
    /// Registry configuration with a custom tick
    pub fn with_tick_interval(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            ..Self::default()
        }
    }

    /// Get refill tick duration
    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Validate the registry configuration
    pub fn validate(&self) -> Result<(), QuotaError> {
        if self.tick_interval.is_zero() {
            return Err(QuotaError::InvalidConfig(
                "tick interval must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Millisecond encoding for the tick interval. Ticks with a sub-millisecond
/// part refuse to serialize instead of being rounded.
mod duration_ms {
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if value.subsec_nanos() % 1_000_000 != 0 {
            return Err(S::Error::custom(format!(
                "tick interval {:?} is not a whole number of milliseconds",
                value
            )));
        }
        let millis = u64::try_from(value.as_millis())
            .map_err(|_| S::Error::custom("tick interval overflows u64 milliseconds"))?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

impl QuotaConfig {
    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed or
    /// fails validation. If the file does not exist, returns defaults with
    /// environment overrides applied.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file from {:?}", path))?;
            let config: QuotaConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file from {:?}", path))?;
            tracing::info!("Loaded configuration from {:?}", path);
            config
        } else {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            Self::default()
        };

        let config = config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply process environment overrides
    ///
    /// Environment variables take precedence over config file values:
    /// - QUOTA_TRACKER_LOG_LEVEL
    /// - QUOTA_TRACKER_LOG_FORMAT
    /// - QUOTA_TRACKER_TICK_INTERVAL_MS
    /// - QUOTA_TRACKER_INITIAL_FILL
    pub fn apply_env_overrides(self) -> Self {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source. Unparseable values
    /// are ignored and the existing setting is kept.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("QUOTA_TRACKER_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("QUOTA_TRACKER_LOG_FORMAT") {
            self.logging.format = format;
        }

        if let Some(tick) = lookup("QUOTA_TRACKER_TICK_INTERVAL_MS") {
            match tick.parse::<u64>() {
                Ok(tick) if tick > 0 => {
                    self.registry.tick_interval = Duration::from_millis(tick);
                }
                _ => tracing::warn!("Ignoring invalid QUOTA_TRACKER_TICK_INTERVAL_MS: {}", tick),
            }
        }
        if let Some(fill) = lookup("QUOTA_TRACKER_INITIAL_FILL") {
            match fill.parse::<InitialFill>() {
                Ok(fill) => self.registry.initial_fill = fill,
                Err(e) => tracing::warn!("Ignoring QUOTA_TRACKER_INITIAL_FILL: {}", e),
            }
        }

        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "Invalid log level: {}. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            ),
        }

        match self.logging.format.to_lowercase().as_str() {
            "json" | "pretty" | "compact" => {}
            _ => anyhow::bail!(
                "Invalid log format: {}. Must be one of: json, pretty, compact",
                self.logging.format
            ),
        }

        self.registry.validate()?;
        Ok(())
    }

    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.logging.log_level()
    }
}

impl LoggingConfig {
    /// Convert log level string to tracing::Level
    pub fn log_level(&self) -> Result<tracing::Level> {
        self.level
            .to_lowercase()
            .parse()
            .map_err(|e| anyhow::anyhow!("Failed to parse log level: {}", e))
    }
}
