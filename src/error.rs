//! Quota Tracker Error Types
//!
//! Failures a caller of the registry can observe. Running out of tokens is not
//! an error; see [`crate::quota::Decision`].

/// Error types for quota operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QuotaError {
    /// No rule has been registered for the key
    #[error("key {0} does not exist as a quota rule")]
    RuleNotFound(String),

    /// Rule parameters cannot produce a usable bucket
    #[error("Invalid rule: {0}")]
    InvalidRule(String),

    /// Registry configuration is unusable
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The refill task needs a tokio runtime to run on
    #[error("Refill task requires a running tokio runtime")]
    NoRuntime,
}

impl QuotaError {
    /// Whether this error reports an unknown key
    pub fn is_not_found(&self) -> bool {
        matches!(self, QuotaError::RuleNotFound(_))
    }
}
