use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix for all gallery metrics
const PREFIX: &str = "gallery";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Request Metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Ingestion Metrics
    pub static ref INGESTION_OUTCOMES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_ingestion_outcomes_total"), "Upload ingestions by outcome"),
        &["outcome"]
    ).expect("Failed to create ingestion_outcomes_total metric");

    pub static ref POLL_ATTEMPTS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_poll_attempts"),
            "Job progress polls needed per upload"
        )
        .buckets(vec![1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 20.0, 30.0])
    ).expect("Failed to create poll_attempts metric");

    pub static ref RECONCILED_JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_reconciled_jobs_total"), "Stale upload jobs settled by reconciliation"),
        &["result"]
    ).expect("Failed to create reconciled_jobs_total metric");

    // Remote Storage Metrics
    pub static ref REMOTE_STORAGE_CALLS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_remote_storage_calls_total"), "Calls to the storage service"),
        &["operation", "result"]
    ).expect("Failed to create remote_storage_calls_total metric");

    // Catalog Metrics
    pub static ref ARTWORKS_TOTAL: Gauge = Gauge::new(
        format!("{PREFIX}_artworks_total"),
        "Live artworks in the catalog"
    ).expect("Failed to create artworks_total metric");
}

/// Initialize all metrics and register them with the Prometheus registry
pub fn init_metrics() {
    // Ignore errors if already registered (for tests)
    let _ = REGISTRY.register(Box::new(HTTP_REQUESTS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(INGESTION_OUTCOMES_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(POLL_ATTEMPTS.clone()));
    let _ = REGISTRY.register(Box::new(RECONCILED_JOBS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(REMOTE_STORAGE_CALLS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(ARTWORKS_TOTAL.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();

    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_ingestion_outcome(outcome: &str) {
    INGESTION_OUTCOMES_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_poll_attempts(attempts: u32) {
    POLL_ATTEMPTS.observe(attempts as f64);
}

pub fn record_reconciled_jobs(resumed: usize, failed: usize) {
    RECONCILED_JOBS_TOTAL
        .with_label_values(&["resumed"])
        .inc_by(resumed as f64);
    RECONCILED_JOBS_TOTAL
        .with_label_values(&["failed"])
        .inc_by(failed as f64);
}

pub fn record_remote_storage_call(operation: &str, ok: bool) {
    let result = if ok { "ok" } else { "error" };
    REMOTE_STORAGE_CALLS_TOTAL
        .with_label_values(&[operation, result])
        .inc();
}

pub fn set_artworks_total(count: usize) {
    ARTWORKS_TOTAL.set(count as f64);
}

pub fn record_artwork_created() {
    ARTWORKS_TOTAL.inc();
}

pub fn record_artwork_deleted() {
    ARTWORKS_TOTAL.dec();
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}
