// Prometheus metrics for the Codegrade API

use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder,
};

lazy_static! {
    // Global registry
    pub static ref REGISTRY: Registry = Registry::new();

    // Evaluations finished (counter with result label)
    pub static ref EVALUATIONS: CounterVec = CounterVec::new(
        Opts::new("codegrade_evaluations_total", "Total number of evaluations finished"),
        &["result"]
    )
    .expect("metric can be created");

    // Submissions sent to the execution service
    pub static ref SUBMISSIONS_DISPATCHED: CounterVec = CounterVec::new(
        Opts::new("codegrade_submissions_dispatched_total", "Total submissions dispatched"),
        &["language"]
    )
    .expect("metric can be created");

    // Batches the execution service refused or never received
    pub static ref DISPATCH_FAILURES: IntCounter = IntCounter::new(
        "codegrade_dispatch_failures_total",
        "Total batch dispatch failures"
    )
    .expect("metric can be created");

    // Status queries by outcome (terminal, pending, error)
    pub static ref STATUS_QUERIES: CounterVec = CounterVec::new(
        Opts::new("codegrade_status_queries_total", "Total status queries issued"),
        &["result"]
    )
    .expect("metric can be created");

    // Per-case terminal statuses
    pub static ref CASE_RESULTS: CounterVec = CounterVec::new(
        Opts::new("codegrade_case_results_total", "Total test case results by status"),
        &["status"]
    )
    .expect("metric can be created");

    // End-to-end evaluation time (in seconds, observed by HistogramTimer)
    pub static ref EVALUATION_TIME: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "codegrade_evaluation_duration_seconds",
            "Evaluation time in seconds"
        )
        .buckets(vec![0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["path"]
    )
    .expect("metric can be created");
}

/// Initialize metrics registry
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(EVALUATIONS.clone()))
        .expect("collector can be registered");

    REGISTRY
        .register(Box::new(SUBMISSIONS_DISPATCHED.clone()))
        .expect("collector can be registered");

    REGISTRY
        .register(Box::new(DISPATCH_FAILURES.clone()))
        .expect("collector can be registered");

    REGISTRY
        .register(Box::new(STATUS_QUERIES.clone()))
        .expect("collector can be registered");

    REGISTRY
        .register(Box::new(CASE_RESULTS.clone()))
        .expect("collector can be registered");

    REGISTRY
        .register(Box::new(EVALUATION_TIME.clone()))
        .expect("collector can be registered");
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

pub fn record_evaluation(result: &str) {
    EVALUATIONS.with_label_values(&[result]).inc();
}

pub fn record_submissions_dispatched(language: &str, count: usize) {
    SUBMISSIONS_DISPATCHED
        .with_label_values(&[language])
        .inc_by(count as f64);
}

pub fn record_dispatch_failed() {
    DISPATCH_FAILURES.inc();
}

pub fn record_status_query(result: &str) {
    STATUS_QUERIES.with_label_values(&[result]).inc();
}

pub fn record_case_result(status: &str) {
    CASE_RESULTS.with_label_values(&[status]).inc();
}

/// Start a timer for one evaluation; observed when the guard drops
pub fn evaluation_timer(path: &str) -> prometheus::HistogramTimer {
    EVALUATION_TIME.with_label_values(&[path]).start_timer()
}
