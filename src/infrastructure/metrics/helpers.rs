//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use crate::redis::CircuitState;

use super::{
    ATTACHMENTS_DROPPED_TOTAL, ATTACHMENT_FETCH_SECONDS, CACHE_INVALIDATIONS_TOTAL,
    CACHE_REQUESTS_TOTAL, CIRCUIT_BREAKER_STATE, DELIVERIES_TOTAL, DELIVERY_FALLBACKS_TOTAL,
    DELIVERY_JOBS_IN_FLIGHT, NOTIFICATIONS_TOTAL, RESOLUTIONS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

pub struct ResolutionMetrics;

impl ResolutionMetrics {
    pub fn record_found() {
        RESOLUTIONS_TOTAL.with_label_values(&["found"]).inc();
    }

    pub fn record_not_found() {
        RESOLUTIONS_TOTAL.with_label_values(&["not_found"]).inc();
    }

    pub fn record_error() {
        RESOLUTIONS_TOTAL.with_label_values(&["error"]).inc();
    }
}

pub struct CacheMetrics;

impl CacheMetrics {
    pub fn record_hit() {
        CACHE_REQUESTS_TOTAL.with_label_values(&["hit"]).inc();
    }

    pub fn record_miss() {
        CACHE_REQUESTS_TOTAL.with_label_values(&["miss"]).inc();
    }

    /// A cache operation failed and was bypassed
    pub fn record_error() {
        CACHE_REQUESTS_TOTAL.with_label_values(&["error"]).inc();
    }

    pub fn record_invalidated(keys: u64) {
        CACHE_INVALIDATIONS_TOTAL.inc_by(keys);
    }
}

pub struct NotifyMetrics;

impl NotifyMetrics {
    /// `outcome` is one of dispatched, no_mapping, no_recipients, error
    pub fn record(outcome: &str) {
        NOTIFICATIONS_TOTAL.with_label_values(&[outcome]).inc();
    }
}

pub struct DeliveryMetrics;

impl DeliveryMetrics {
    pub fn record_sent(mode: &str) {
        DELIVERIES_TOTAL.with_label_values(&[mode, "sent"]).inc();
    }

    pub fn record_failed(mode: &str) {
        DELIVERIES_TOTAL.with_label_values(&[mode, "failed"]).inc();
    }

    pub fn record_fallback() {
        DELIVERY_FALLBACKS_TOTAL.inc();
    }

    pub fn job_started() {
        DELIVERY_JOBS_IN_FLIGHT.inc();
    }

    pub fn job_finished() {
        DELIVERY_JOBS_IN_FLIGHT.dec();
    }
}

pub struct AttachmentMetrics;

impl AttachmentMetrics {
    /// `stage` is one of normalize, fetch, read
    pub fn record_dropped(stage: &str) {
        ATTACHMENTS_DROPPED_TOTAL.with_label_values(&[stage]).inc();
    }

    pub fn record_fetch_latency(seconds: f64) {
        ATTACHMENT_FETCH_SECONDS.observe(seconds);
    }
}

pub struct BackendMetrics;

impl BackendMetrics {
    pub fn set_circuit_state(backend: &str, state: CircuitState) {
        CIRCUIT_BREAKER_STATE
            .with_label_values(&[backend])
            .set(state as i64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics_includes_recorded_series() {
        CacheMetrics::record_hit();
        DeliveryMetrics::record_sent("primary");
        AttachmentMetrics::record_dropped("fetch");

        let output = encode_metrics().unwrap();
        assert!(output.contains("mail_mapper_cache_requests_total"));
        assert!(output.contains("mail_mapper_deliveries_total"));
        assert!(output.contains("mail_mapper_attachments_dropped_total"));
    }

}
