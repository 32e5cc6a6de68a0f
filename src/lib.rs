//! Quota Tracker Library
//!
//! In-process per-key rate limiting. Callers register a [`Rule`] (rate plus
//! burst window) for a string key, then spend tokens against it with
//! [`QuotaRegistry::use_token`]. A background tokio task refills every bucket
//! once per tick.

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod quota;

pub use config::{LoggingConfig, QuotaConfig, RegistryConfig};
pub use error::QuotaError;
pub use quota::{
    Bucket, BucketState, Decision, InitialFill, KeyId, QuotaRegistry, Rule, RuleSnapshot,
};
