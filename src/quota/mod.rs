//! Per-Key Quota Tracking
//!
//! Tick-driven token buckets behind a single-lock registry.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                QuotaRegistry                  │
//! │   Mutex<HashMap<KeyId, Bucket>>               │
//! │        ▲                     ▲                │
//! │        │ add_rule / get_rule │ refill_all     │
//! │        │ use_token           │ (every tick)   │
//! │   callers (any thread)   refill task (tokio)  │
//! └───────────────────────────────────────────────┘
//! ```

pub mod bucket;
pub mod registry;

#[cfg(test)]
mod proptests;

pub use bucket::{Bucket, BucketState, InitialFill, Rule, RuleSnapshot};
pub use registry::{Decision, KeyId, QuotaRegistry};
