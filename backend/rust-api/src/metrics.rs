use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

lazy_static! {
    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "http_requests_total",
        "Total number of HTTP requests",
        &["method", "path", "status"]
    )
    .unwrap();

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "http_request_duration_seconds",
        "HTTP request duration in seconds",
        &["method", "path"],
        vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .unwrap();

    // Business Metrics
    pub static ref GAMES_STARTED_TOTAL: IntCounter = register_int_counter!(
        "games_started_total",
        "Total number of game sessions started"
    )
    .unwrap();

    pub static ref GAMES_FINISHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "games_finished_total",
        "Total number of game sessions finished",
        &["reason"]
    )
    .unwrap();

    pub static ref SESSIONS_ACTIVE: IntGauge = register_int_gauge!(
        "sessions_active",
        "Number of currently active game sessions"
    )
    .unwrap();

    pub static ref ANSWERS_SUBMITTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "answers_submitted_total",
        "Total number of answers submitted",
        &["correct"]
    )
    .unwrap();

    pub static ref BONUS_LIVES_AWARDED_TOTAL: IntCounter = register_int_counter!(
        "bonus_lives_awarded_total",
        "Total number of bonus lives awarded"
    )
    .unwrap();
}

/// Renders all metrics in Prometheus text format
pub fn render_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|e| prometheus::Error::Msg(format!("Failed to convert metrics to UTF-8: {}", e)))
}
