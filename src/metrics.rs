// Prometheus metrics for quota tracking
//
// - Token decisions (accepted / rejected / unknown key)
// - Registered rules (gauge)
// - Refill passes (counter + duration histogram)

use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Decision metrics
    pub static ref TOKENS_ACCEPTED_TOTAL: IntCounter = IntCounter::new(
        "quota_tokens_accepted_total",
        "Total number of token requests accepted"
    ).expect("Failed to create tokens accepted metric");

    pub static ref TOKENS_REJECTED_TOTAL: IntCounter = IntCounter::new(
        "quota_tokens_rejected_total",
        "Total number of token requests rejected because the quota was exhausted"
    ).expect("Failed to create tokens rejected metric");

    pub static ref RULE_NOT_FOUND_TOTAL: IntCounter = IntCounter::new(
        "quota_rule_not_found_total",
        "Total number of lookups for keys with no registered rule"
    ).expect("Failed to create rule not found metric");

    // Registry metrics
    pub static ref RULES_REGISTERED: IntGauge = IntGauge::new(
        "quota_rules_registered",
        "Number of rules held across all registries"
    ).expect("Failed to create rules registered metric");

    // Refill metrics
    pub static ref REFILL_PASSES_TOTAL: IntCounter = IntCounter::new(
        "quota_refill_passes_total",
        "Total number of refill passes over all buckets"
    ).expect("Failed to create refill passes metric");

    pub static ref REFILL_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "quota_refill_duration_seconds",
            "Time spent holding the registry lock for one refill pass"
        ).buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
    ).expect("Failed to create refill duration metric");
}

/// Initialize metrics registry - call once at process startup
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(TOKENS_ACCEPTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TOKENS_REJECTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RULE_NOT_FOUND_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RULES_REGISTERED.clone()))?;
    REGISTRY.register(Box::new(REFILL_PASSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REFILL_DURATION_SECONDS.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
