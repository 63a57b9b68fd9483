use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    // Grading metrics
    pub static ref SUBMISSIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submissions_total",
        "Total number of graded submissions",
        &["verdict"]
    )
    .unwrap();

    pub static ref SUBMIT_REJECTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "submit_rejections_total",
        "Submissions rejected before grading",
        &["reason"]
    )
    .unwrap();

    pub static ref JUDGE_FAILURES_TOTAL: IntCounter = register_int_counter!(
        "judge_failures_total",
        "Judge batch calls that failed or timed out at the transport level"
    )
    .unwrap();

    // Hint metrics
    pub static ref HINTS_SERVED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "hints_served_total",
        "Hints delivered to students",
        &["hint_level", "source"]
    )
    .unwrap();

    pub static ref HINT_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "hint_failures_total",
        "Hint generations that failed at the provider",
        &["hint_level"]
    )
    .unwrap();
}

/// Render all registered metrics in the Prometheus text format.
pub fn render() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
