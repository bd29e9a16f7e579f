use once_cell::sync::Lazy;
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, TextEncoder};

pub static RECOMMENDATIONS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    prometheus::register_counter!(
        "planck_recommendations_total",
        "Total number of recommendations served"
    )
    .expect("register planck_recommendations_total")
});

pub static RECOMMENDATION_FALLBACKS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    prometheus::register_counter!(
        "planck_recommendation_fallbacks_total",
        "Recommendations answered from heuristic defaults instead of history"
    )
    .expect("register planck_recommendation_fallbacks_total")
});

pub static HISTORY_QUERY_LATENCY_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new(
        "planck_history_query_latency_seconds",
        "History similarity query latency in seconds",
    )
    .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0]);
    prometheus::register_histogram!(opts).expect("register planck_history_query_latency_seconds")
});

pub static HISTORY_APPEND_FAILURES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    prometheus::register_counter!(
        "planck_history_append_failures_total",
        "Execution records that could not be appended to the history store"
    )
    .expect("register planck_history_append_failures_total")
});

pub static ADMISSIONS_ALLOWED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    prometheus::register_counter!(
        "planck_admissions_allowed_total",
        "Requests admitted by the rate limiter"
    )
    .expect("register planck_admissions_allowed_total")
});

pub static ADMISSIONS_DENIED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    prometheus::register_counter!(
        "planck_admissions_denied_total",
        "Requests denied by the rate limiter"
    )
    .expect("register planck_admissions_denied_total")
});

pub static PAYLOAD_REJECTIONS_TOTAL: Lazy<Counter> = Lazy::new(|| {
    prometheus::register_counter!(
        "planck_payload_rejections_total",
        "Requests rejected for exceeding the payload size limit"
    )
    .expect("register planck_payload_rejections_total")
});

pub static POLICY_SAFETY_UPGRADES_TOTAL: Lazy<Counter> = Lazy::new(|| {
    prometheus::register_counter!(
        "planck_policy_safety_upgrades_total",
        "Backend decisions moved from quantum_qpu to hpc_gpu by the safety rule"
    )
    .expect("register planck_policy_safety_upgrades_total")
});

pub static RATE_LIMIT_BUCKETS_REAPED_TOTAL: Lazy<Counter> = Lazy::new(|| {
    prometheus::register_counter!(
        "planck_rate_limit_buckets_reaped_total",
        "Idle rate-limit buckets removed by the sweeper"
    )
    .expect("register planck_rate_limit_buckets_reaped_total")
});

/// Render all registered metrics in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buf = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buf) {
        tracing::warn!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
