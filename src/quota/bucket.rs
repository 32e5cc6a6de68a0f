//! Quota Rules and Tick-Driven Token Buckets
//!
//! A [`Bucket`] holds the live state of one [`Rule`]. Tokens are whole numbers
//! and are only added by [`Bucket::refill`], which the registry calls once per
//! tick. There is no timestamp bookkeeping: a bucket that is never refilled
//! never gains tokens.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::QuotaError;

/// Token count a bucket starts with when its rule is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitialFill {
    /// Start at capacity; the full burst is usable immediately
    #[default]
    Full,
    /// Start at zero; tokens appear after the first refill tick
    Empty,
}

impl std::str::FromStr for InitialFill {
    type Err = QuotaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(InitialFill::Full),
            "empty" => Ok(InitialFill::Empty),
            other => Err(QuotaError::InvalidConfig(format!(
                "unknown initial fill policy: {}. Must be 'full' or 'empty'",
                other
            ))),
        }
    }
}

/// A quota rule: `rate` tokens per second, with up to `rate * window` tokens
/// spendable in a single burst.
///
/// A rate of 2 with a 3 second window allows 6 requests in any 3 second span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Tokens granted per second
    pub rate: f64,

    /// Span over which the full burst may be consumed
    pub window: Duration,
}

impl Rule {
    /// Create a rule from a per-second rate and a window
    pub fn new(rate: f64, window: Duration) -> Self {
        Self { rate, window }
    }

    /// Maximum tokens a bucket for this rule can hold
    pub fn capacity(&self) -> u64 {
        whole_tokens(self.rate, self.window)
    }

    /// Tokens a bucket for this rule gains per refill tick
    pub fn tokens_per_tick(&self, tick_interval: Duration) -> u64 {
        whole_tokens(self.rate, tick_interval)
    }

    /// Reject rules that would produce a bucket which can never accept
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::InvalidRule`] for a non-finite or non-positive
    /// rate, a zero window, or a capacity that rounds down to zero.
    pub fn validate(&self) -> Result<(), QuotaError> {
        if !self.rate.is_finite() || self.rate <= 0.0 {
            return Err(QuotaError::InvalidRule(format!(
                "rate must be a positive number, got {}",
                self.rate
            )));
        }
        if self.window.is_zero() {
            return Err(QuotaError::InvalidRule("window must be non-zero".to_string()));
        }
        if self.capacity() == 0 {
            return Err(QuotaError::InvalidRule(format!(
                "rate {} over a {:?} window allows no requests",
                self.rate, self.window
            )));
        }
        Ok(())
    }
}

/// floor(rate * span), with anything non-positive or NaN collapsing to zero.
///
/// The product is nudged up by a few ulps before flooring so that decimal
/// rates land on the integer they denote: 0.29 * 100.0 evaluates to
/// 28.999999999999996 and must still give 29.
fn whole_tokens(rate: f64, span: Duration) -> u64 {
    let tokens = rate * span.as_secs_f64();
    if tokens.is_nan() || tokens <= 0.0 {
        0
    } else {
        (tokens * (1.0 + 4.0 * f64::EPSILON)).floor() as u64
    }
}

/// Whether a bucket can currently accept a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketState {
    /// At least one token available
    HasTokens,
    /// No tokens until the next refill
    Empty,
}

/// Point-in-time view of a registered rule and its bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSnapshot {
    /// Tokens granted per second
    pub rate: f64,

    /// Burst window
    pub window: Duration,

    /// Maximum tokens held
    pub capacity: u64,

    /// Tokens added per refill tick
    pub tokens_per_tick: u64,

    /// Tokens available right now
    pub available: u64,
}

/// Live token bucket for one rule
#[derive(Debug, Clone)]
pub struct Bucket {
    rule: Rule,
    capacity: u64,
    tokens_per_tick: u64,
    available: u64,
}

impl Bucket {
    /// Build a bucket for `rule`, refilled every `tick_interval`.
    ///
    /// Rules are not validated here. A non-positive rate or window gives a
    /// bucket with zero capacity that rejects every request.
    pub fn new(rule: Rule, tick_interval: Duration, initial_fill: InitialFill) -> Self {
        let capacity = rule.capacity();
        let available = match initial_fill {
            InitialFill::Full => capacity,
            InitialFill::Empty => 0,
        };

        Self {
            rule,
            capacity,
            tokens_per_tick: rule.tokens_per_tick(tick_interval),
            available,
        }
    }

    /// Take one token if any are left.
    ///
    /// Returns false, leaving the bucket untouched, when it is empty.
    pub fn try_consume(&mut self) -> bool {
        if self.available == 0 {
            return false;
        }
        self.available -= 1;
        true
    }

    /// Add one tick's worth of tokens, clamped to capacity
    pub fn refill(&mut self) {
        if self.available == self.capacity {
            return;
        }
        self.available = self
            .available
            .saturating_add(self.tokens_per_tick)
            .min(self.capacity);
    }

    /// The rule this bucket enforces
    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn tokens_per_tick(&self) -> u64 {
        self.tokens_per_tick
    }

    pub fn available(&self) -> u64 {
        self.available
    }

    pub fn is_full(&self) -> bool {
        self.available == self.capacity
    }

    pub fn state(&self) -> BucketState {
        if self.available > 0 {
            BucketState::HasTokens
        } else {
            BucketState::Empty
        }
    }

    /// Copy out the rule parameters and current token count
    pub fn snapshot(&self) -> RuleSnapshot {
        RuleSnapshot {
            rate: self.rule.rate,
            window: self.rule.window,
            capacity: self.capacity,
            tokens_per_tick: self.tokens_per_tick,
            available: self.available,
        }
    }
}
