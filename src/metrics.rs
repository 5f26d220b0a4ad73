use std::time::{Duration, Instant};

use crate::model::{HealthAssessment, IssueType, Severity};

pub fn record_message_processed(status: &'static str) {
    metrics::counter!("plant_processor_messages_processed_total", "status" => status).increment(1);
}

pub fn record_stage_duration(stage: &'static str, seconds: f64) {
    metrics::histogram!("plant_processor_processing_duration_seconds", "stage" => stage)
        .record(seconds);
}

/// Time from capture on the device to the end of processing.
pub fn record_pipeline_latency(seconds: f64) {
    metrics::histogram!("plant_data_pipeline_latency_seconds").record(seconds.max(0.0));
}

pub fn set_health_score(device_id: &str, assessment: &HealthAssessment) {
    metrics::gauge!("plant_health_score", "device" => device_id.to_string())
        .set(assessment.health_score as f64);
}

pub fn increment_alerts_generated(alert_type: IssueType, severity: Severity) {
    metrics::counter!(
        "plant_alerts_generated_total",
        "alert_type" => alert_type.as_str(),
        "severity" => severity.as_str()
    )
    .increment(1);
}

pub fn increment_publish_failed(channel: &'static str) {
    metrics::counter!("plant_processor_publish_failures_total", "channel" => channel).increment(1);
}

pub fn increment_reconnects() {
    metrics::counter!("plant_processor_reconnects_total").increment(1);
}

/// `collaborator` is `redis`, `postgres` or `mqtt`.
pub fn increment_connection_errors(collaborator: &'static str, error_type: &'static str) {
    metrics::counter!(
        "plant_processor_connection_errors_total",
        "collaborator" => collaborator,
        "error_type" => error_type
    )
    .increment(1);
}

/// Reading-store insert rate, published as a gauge once per window.
#[derive(Debug)]
pub struct InsertRate {
    window: Duration,
    count: u64,
    since: Instant,
}

impl InsertRate {
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            count: 0,
            since: now,
        }
    }

    pub fn record(&mut self) {
        self.count += 1;
    }

    /// Returns the rate and starts a new window once the current one has elapsed.
    pub fn flush(&mut self, now: Instant) -> Option<f64> {
        let elapsed = now.saturating_duration_since(self.since);
        if elapsed < self.window || elapsed.is_zero() {
            return None;
        }
        let rate = self.count as f64 / elapsed.as_secs_f64();
        self.count = 0;
        self.since = now;
        metrics::gauge!("plant_store_inserts_per_second").set(rate);
        Some(rate)
    }
}
