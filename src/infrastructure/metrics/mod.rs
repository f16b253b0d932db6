//! Prometheus metrics for the mail mapper.
//!
//! - Template resolution (outcome, cache hits and misses, invalidations)
//! - Notification triggers
//! - Delivery jobs (mode, outcome, fallbacks, attachment drops, fetch latency)
//! - Backend health (circuit breaker state)

mod helpers;

pub use helpers::{
    encode_metrics, AttachmentMetrics, BackendMetrics, CacheMetrics, DeliveryMetrics,
    NotifyMetrics, ResolutionMetrics,
};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Histogram, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
};

const METRIC_PREFIX: &str = "mail_mapper";

lazy_static! {
    // ============================================================================
    // Resolution Metrics
    // ============================================================================

    /// Template resolutions by outcome (found, not_found, error)
    pub static ref RESOLUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_resolutions_total", METRIC_PREFIX),
        "Template resolutions by outcome",
        &["outcome"]
    ).unwrap();

    /// Cache lookups by result (hit, miss, error)
    pub static ref CACHE_REQUESTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_cache_requests_total", METRIC_PREFIX),
        "Template cache lookups by result",
        &["result"]
    ).unwrap();

    /// Cache keys evicted by write-side invalidation
    pub static ref CACHE_INVALIDATIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_cache_invalidations_total", METRIC_PREFIX),
        "Cache keys evicted by mapping writes"
    ).unwrap();

    // ============================================================================
    // Notification Metrics
    // ============================================================================

    /// Notification triggers by outcome (dispatched, no_mapping, no_recipients, error)
    pub static ref NOTIFICATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_notifications_total", METRIC_PREFIX),
        "Notification triggers by outcome",
        &["outcome"]
    ).unwrap();

    // ============================================================================
    // Delivery Metrics
    // ============================================================================

    /// Finished delivery jobs by mode (primary, raw) and outcome (sent, failed)
    pub static ref DELIVERIES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_deliveries_total", METRIC_PREFIX),
        "Delivery jobs by mode and outcome",
        &["mode", "outcome"]
    ).unwrap();

    /// Primary sends that were retried as raw messages
    pub static ref DELIVERY_FALLBACKS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_delivery_fallbacks_total", METRIC_PREFIX),
        "Primary sends retried as raw messages"
    ).unwrap();

    /// Jobs waiting on or running in the delivery worker
    pub static ref DELIVERY_JOBS_IN_FLIGHT: IntGauge = register_int_gauge!(
        format!("{}_delivery_jobs_in_flight", METRIC_PREFIX),
        "Delivery jobs currently running"
    ).unwrap();

    /// Attachments dropped by stage (normalize, fetch, read)
    pub static ref ATTACHMENTS_DROPPED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_attachments_dropped_total", METRIC_PREFIX),
        "Attachments dropped by stage",
        &["stage"]
    ).unwrap();

    /// Remote attachment download latency in seconds
    pub static ref ATTACHMENT_FETCH_SECONDS: Histogram = register_histogram!(
        format!("{}_attachment_fetch_seconds", METRIC_PREFIX),
        "Remote attachment download latency",
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ).unwrap();

    // ============================================================================
    // Backend Metrics
    // ============================================================================

    /// Circuit breaker state per backend (0 closed, 1 open, 2 half-open)
    pub static ref CIRCUIT_BREAKER_STATE: IntGaugeVec = register_int_gauge_vec!(
        format!("{}_circuit_breaker_state", METRIC_PREFIX),
        "Circuit breaker state per backend",
        &["backend"]
    ).unwrap();
}
