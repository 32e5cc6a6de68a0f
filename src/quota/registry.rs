//! Quota Registry
//!
//! Thread-safe directory of token buckets keyed by caller-chosen strings, plus
//! the background task that refills every bucket once per tick.
//!
//! One lock guards the whole map. Registration, lookup, consumption and the
//! refill pass all hold it for their full duration, so every operation sees a
//! fully applied predecessor. A refill pass is O(number of rules) under that
//! lock.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::bucket::{Bucket, InitialFill, Rule, RuleSnapshot};
use crate::config::RegistryConfig;
use crate::error::QuotaError;
use crate::metrics;

/// Hashed handle for a caller's string key. The registry never stores the
/// string itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId(u64);

impl KeyId {
    /// Derive the handle for a string key
    pub fn from_key(key: &str) -> Self {
        KeyId(seahash::hash(key.as_bytes()))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

/// Outcome of spending a token against a registered rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// A token was taken
    Accepted,
    /// The bucket was empty; nothing changed
    QuotaExceeded,
}

impl Decision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Decision::Accepted)
    }
}

/// State behind the registry lock
#[derive(Debug, Default)]
struct Rules {
    buckets: HashMap<KeyId, Bucket>,

    /// Time the last refill pass held the lock
    last_refill_duration: Duration,
}

impl Drop for Rules {
    fn drop(&mut self) {
        metrics::RULES_REGISTERED.sub(self.buckets.len() as i64);
    }
}

/// Handle on a running refill task
#[derive(Debug)]
struct RefillTask {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Per-key quota registry
///
/// Cloning is cheap and every clone shares the same rules and refill task.
///
/// # Usage
///
/// ```no_run
/// use quota_tracker::{QuotaRegistry, RegistryConfig, Rule};
/// use std::time::Duration;
///
/// # async fn demo() -> Result<(), quota_tracker::QuotaError> {
/// let registry = QuotaRegistry::new(RegistryConfig::default())?;
/// registry.add_rule("user1", Rule::new(2.0, Duration::from_secs(5)))?;
/// registry.start()?;
///
/// if registry.use_token("user1")?.is_accepted() {
///     // serve the request
/// }
///
/// registry.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QuotaRegistry {
    config: RegistryConfig,
    rules: Arc<Mutex<Rules>>,
    refill_task: Arc<Mutex<Option<RefillTask>>>,
}

impl QuotaRegistry {
    /// Create an empty registry
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::InvalidConfig`] for a zero tick interval.
    pub fn new(config: RegistryConfig) -> Result<Self, QuotaError> {
        config.validate()?;

        Ok(Self {
            config,
            rules: Arc::new(Mutex::new(Rules::default())),
            refill_task: Arc::new(Mutex::new(None)),
        })
    }

    /// Create an empty registry refilling every `tick_interval`
    pub fn with_tick_interval(tick_interval: Duration) -> Result<Self, QuotaError> {
        Self::new(RegistryConfig::with_tick_interval(tick_interval))
    }

    /// Register a rule for `key`, replacing any existing rule and its bucket
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::InvalidRule`] when the rule fails validation or
    /// would gain no tokens per tick at this registry's tick interval. Such a
    /// bucket could never refill once drained, whatever the fill policy.
    pub fn add_rule(&self, key: &str, rule: Rule) -> Result<(), QuotaError> {
        rule.validate()?;

        let tick = self.config.tick_interval();
        let bucket = Bucket::new(rule, tick, self.config.initial_fill);
        if bucket.tokens_per_tick() == 0 {
            return Err(QuotaError::InvalidRule(format!(
                "rate {} gains no tokens per {:?} tick",
                rule.rate, tick
            )));
        }
        debug!(
            key,
            capacity = bucket.capacity(),
            tokens_per_tick = bucket.tokens_per_tick(),
            "Registered quota rule"
        );

        let id = KeyId::from_key(key);
        let mut rules = self.rules.lock();
        if rules.buckets.insert(id, bucket).is_none() {
            metrics::RULES_REGISTERED.inc();
        }
        Ok(())
    }

    /// Look up the rule and current token count for `key`
    pub fn get_rule(&self, key: &str) -> Result<RuleSnapshot, QuotaError> {
        let id = KeyId::from_key(key);
        let rules = self.rules.lock();
        match rules.buckets.get(&id) {
            Some(bucket) => Ok(bucket.snapshot()),
            None => {
                metrics::RULE_NOT_FOUND_TOTAL.inc();
                Err(QuotaError::RuleNotFound(key.to_string()))
            }
        }
    }

    /// Spend one token against `key`.
    ///
    /// Never waits for tokens: an empty bucket yields
    /// [`Decision::QuotaExceeded`] immediately.
    pub fn use_token(&self, key: &str) -> Result<Decision, QuotaError> {
        let id = KeyId::from_key(key);
        let mut rules = self.rules.lock();
        let Some(bucket) = rules.buckets.get_mut(&id) else {
            metrics::RULE_NOT_FOUND_TOTAL.inc();
            return Err(QuotaError::RuleNotFound(key.to_string()));
        };

        if bucket.try_consume() {
            metrics::TOKENS_ACCEPTED_TOTAL.inc();
            Ok(Decision::Accepted)
        } else {
            metrics::TOKENS_REJECTED_TOTAL.inc();
            Ok(Decision::QuotaExceeded)
        }
    }

    /// Refill every bucket by one tick, returning how long the pass took
    pub fn refill_all(&self) -> Duration {
        refill_pass(&self.rules)
    }

    /// Start the background refill task.
    ///
    /// The first refill happens one tick after this call. Calling `start` on a
    /// registry (or any clone of it) that is already running does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`QuotaError::NoRuntime`] when called outside a tokio runtime.
    pub fn start(&self) -> Result<(), QuotaError> {
        let mut task = self.refill_task.lock();
        if let Some(running) = task.as_ref() {
            if !running.handle.is_finished() {
                debug!("Refill task already running");
                return Ok(());
            }
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| QuotaError::NoRuntime)?;
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let tick = self.config.tick_interval();
        let handle = runtime.spawn(run_refill_loop(
            Arc::downgrade(&self.rules),
            tick,
            shutdown_rx,
        ));

        *task = Some(RefillTask {
            shutdown_tx,
            handle,
        });
        info!("Refill task started (tick {:?})", tick);
        Ok(())
    }

    /// Stop the background refill task and wait for it to exit.
    ///
    /// No-op when the task is not running.
    pub async fn stop(&self) {
        let task = self.refill_task.lock().take();
        let Some(task) = task else {
            return;
        };

        // The loop also exits if the sender is gone, so a failed send is fine
        let _ = task.shutdown_tx.send(()).await;
        if let Err(e) = task.handle.await {
            warn!("Refill task ended abnormally: {}", e);
        }
        info!("Refill task stopped");
    }

    /// Whether a refill task is currently running for this registry
    pub fn is_running(&self) -> bool {
        self.refill_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Number of registered rules
    pub fn len(&self) -> usize {
        self.rules.lock().buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration of the most recent refill pass
    pub fn last_refill_duration(&self) -> Duration {
        self.rules.lock().last_refill_duration
    }

    pub fn tick_interval(&self) -> Duration {
        self.config.tick_interval()
    }

    pub fn initial_fill(&self) -> InitialFill {
        self.config.initial_fill
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }
}

impl Default for QuotaRegistry {
    fn default() -> Self {
        Self {
            config: RegistryConfig::default(),
            rules: Arc::new(Mutex::new(Rules::default())),
            refill_task: Arc::new(Mutex::new(None)),
        }
    }
}

fn refill_pass(rules: &Mutex<Rules>) -> Duration {
    let mut rules = rules.lock();
    let start = Instant::now();
    for bucket in rules.buckets.values_mut() {
        bucket.refill();
    }
    let elapsed = start.elapsed();
    rules.last_refill_duration = elapsed;

    metrics::REFILL_PASSES_TOTAL.inc();
    metrics::REFILL_DURATION_SECONDS.observe(elapsed.as_secs_f64());
    debug!(buckets = rules.buckets.len(), ?elapsed, "Refill pass complete");
    elapsed
}

/// Holds only a weak reference so dropping every registry handle ends the loop.
async fn run_refill_loop(
    rules: Weak<Mutex<Rules>>,
    tick: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + tick, tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(rules) = rules.upgrade() else {
                    debug!("Registry dropped, refill task exiting");
                    break;
                };
                refill_pass(&rules);
            }
            _ = shutdown_rx.recv() => {
                break;
            }
        }
    }
}
