//! Prometheus metrics for the exchange simulator.
//!
//! Tracks HTTP dispatch outcomes, WebSocket traffic, sessions and recordings.
use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, CounterVec, Encoder, Gauge,
    Histogram, TextEncoder,
};

lazy_static! {
    /// HTTP requests by dispatch outcome
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "exsim_http_requests_total",
        "Total number of HTTP requests handled by the simulator",
        &["outcome"]  // outcome: matched|no_rule|no_route|error
    )
    .unwrap();

    /// Configured delay applied to matched HTTP responses
    pub static ref HTTP_RESPONSE_DELAY_MS: Histogram = register_histogram!(
        "exsim_http_response_delay_ms",
        "Histogram of configured HTTP response delays in milliseconds",
        vec![0.0, 10.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0]
    )
    .unwrap();

    /// WebSocket messages by direction and outcome
    pub static ref WS_MESSAGES_TOTAL: CounterVec = register_counter_vec!(
        "exsim_ws_messages_total",
        "Total number of WebSocket messages processed",
        &["direction", "outcome"]  // direction: client|upstream, outcome: matched|no_rule|relayed|error
    )
    .unwrap();

    /// Currently open WebSocket sessions
    pub static ref WS_ACTIVE_SESSIONS: Gauge = register_gauge!(
        "exsim_ws_active_sessions",
        "Number of WebSocket sessions currently open"
    )
    .unwrap();

    /// Currently running subscription update tasks
    pub static ref ACTIVE_SUBSCRIPTIONS: Gauge = register_gauge!(
        "exsim_active_subscriptions",
        "Number of subscription update tasks currently running"
    )
    .unwrap();

    /// Files written into record directories
    pub static ref RECORDED_FILES_TOTAL: CounterVec = register_counter_vec!(
        "exsim_recorded_files_total",
        "Total number of recorded response/message files",
        &["kind"]  // kind: http|ws
    )
    .unwrap();
}

/// Collect and return all metrics in Prometheus text format
pub fn collect_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

pub fn record_http_request(outcome: &str) {
    HTTP_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_http_delay(delay_ms: u64) {
    HTTP_RESPONSE_DELAY_MS.observe(delay_ms as f64);
}

pub fn record_ws_message(direction: &str, outcome: &str) {
    WS_MESSAGES_TOTAL
        .with_label_values(&[direction, outcome])
        .inc();
}

pub fn record_file_written(kind: &str) {
    RECORDED_FILES_TOTAL.with_label_values(&[kind]).inc();
}
