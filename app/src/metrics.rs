use crate::streaming::AttemptReport;
use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec_with_registry, register_int_counter_vec_with_registry,
    register_int_gauge_with_registry, Encoder, HistogramVec, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

// Create a new registry named `streamer`
lazy_static! {
    pub static ref STREAMER_REGISTRY: Registry =
        Registry::new_custom(Some("streamer".to_string()), None).unwrap();
}

// Register metrics with the `streamer` registry
lazy_static! {
    pub static ref STREAM_ATTEMPTS: IntCounterVec = register_int_counter_vec_with_registry!(
        "stream_attempts_total",
        "Attempts finished by the supervisor, by mode and outcome",
        &["mode", "outcome"],
        STREAMER_REGISTRY
    )
    .unwrap();
    pub static ref STREAM_MESSAGES_SENT: IntCounterVec = register_int_counter_vec_with_registry!(
        "stream_messages_sent_total",
        "Requests written to streams",
        &["mode"],
        STREAMER_REGISTRY
    )
    .unwrap();
    pub static ref STREAM_MESSAGES_RECEIVED: IntCounterVec =
        register_int_counter_vec_with_registry!(
            "stream_messages_received_total",
            "Responses read from streams",
            &["mode"],
            STREAMER_REGISTRY
        )
        .unwrap();
    pub static ref STREAM_FAILURES: IntCounterVec = register_int_counter_vec_with_registry!(
        "stream_failures_total",
        "Attempt failures by the protocol step that failed",
        &["mode", "step"],
        STREAMER_REGISTRY
    )
    .unwrap();
    pub static ref STREAM_ATTEMPT_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        "stream_attempt_duration_seconds",
        "Wall-clock duration of one attempt from open to close",
        &["mode"],
        STREAMER_REGISTRY
    )
    .unwrap();
    pub static ref PROCESS_START_TIME: IntGauge = register_int_gauge_with_registry!(
        "process_start_time_seconds",
        "Process start time in Unix timestamp",
        STREAMER_REGISTRY
    )
    .unwrap();
}

/// Account one finished attempt
pub fn record_attempt(report: &AttemptReport) {
    let mode = report.mode.as_str();

    STREAM_ATTEMPTS
        .with_label_values(&[mode, report.outcome.kind()])
        .inc();
    STREAM_ATTEMPT_DURATION
        .with_label_values(&[mode])
        .observe(report.elapsed.as_secs_f64());

    let (sent, received) = message_counts(report);
    STREAM_MESSAGES_RECEIVED
        .with_label_values(&[mode])
        .inc_by(received);
    STREAM_MESSAGES_SENT.with_label_values(&[mode]).inc_by(sent);

    for error in report.outcome.error().into_iter().chain(report.close_error.as_ref()) {
        STREAM_FAILURES
            .with_label_values(&[mode, error.step()])
            .inc();
    }
}

/// Requests written and responses read during one attempt
fn message_counts(report: &AttemptReport) -> (u64, u64) {
    (report.requests_sent, report.exchanges.len() as u64)
}

pub fn mark_process_start() {
    PROCESS_START_TIME.set(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64,
    );
}

/// Text exposition of the `streamer` registry and the default registry
pub fn gather_text() -> Result<Vec<u8>, prometheus::Error> {
    let mut metric_families = STREAMER_REGISTRY.gather();
    metric_families.extend(prometheus::gather());

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(buffer)
}
