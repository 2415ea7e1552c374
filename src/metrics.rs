//! Prometheus metrics
//!
//! Collectors are registered once in the default registry and exposed on
//! `/metrics` by every role.

use once_cell::sync::Lazy;
use prometheus::{
    register_int_counter_vec, register_int_gauge, Encoder, IntCounterVec, IntGauge, TextEncoder,
};

use crate::error::{Error, Result};

static CACHE_LOOKUPS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "catalog_tier_cache_lookups_total",
        "Cache lookups by result",
        &["result"]
    )
    .expect("cache lookup counter registers once")
});

static CACHE_INVALIDATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "catalog_tier_cache_invalidations_total",
        "Cache entries removed by change events",
        &["event_type"]
    )
    .expect("cache invalidation counter registers once")
});

static DISPATCH_SELECTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "catalog_tier_dispatch_selections_total",
        "Backend endpoint selections",
        &["class", "endpoint"]
    )
    .expect("dispatch counter registers once")
});

static UPSTREAM_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "catalog_tier_upstream_errors_total",
        "Failed upstream calls",
        &["class", "kind"]
    )
    .expect("upstream error counter registers once")
});

static EVENTS_PUBLISHED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "catalog_tier_events_published_total",
        "Change events published",
        &["event_type"]
    )
    .expect("event counter registers once")
});

static EVENT_DELIVERIES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "catalog_tier_event_deliveries_total",
        "Change event deliveries per subscriber",
        &["subscriber", "outcome"]
    )
    .expect("delivery counter registers once")
});

static ACTIVE_SUBSCRIBERS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "catalog_tier_active_subscribers",
        "Subscribers currently attached to the propagator"
    )
    .expect("subscriber gauge registers once")
});

pub fn record_cache_lookup(hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    CACHE_LOOKUPS.with_label_values(&[result]).inc();
}

pub fn record_cache_invalidations(event_type: &str, removed: usize) {
    CACHE_INVALIDATIONS
        .with_label_values(&[event_type])
        .inc_by(removed as u64);
}

pub fn record_dispatch(class: &str, endpoint: &str) {
    DISPATCH_SELECTIONS
        .with_label_values(&[class, endpoint])
        .inc();
}

pub fn record_upstream_error(class: &str, error: &Error) {
    UPSTREAM_ERRORS
        .with_label_values(&[class, error.kind()])
        .inc();
}

pub fn record_event_published(event_type: &str) {
    EVENTS_PUBLISHED.with_label_values(&[event_type]).inc();
}

/// `outcome` is one of `ok`, `error`, `panic`, `lagged`.
pub fn record_event_delivery(subscriber: &str, outcome: &str) {
    EVENT_DELIVERIES
        .with_label_values(&[subscriber, outcome])
        .inc();
}

pub fn subscriber_attached() {
    ACTIVE_SUBSCRIBERS.inc();
}

pub fn subscriber_detached() {
    ACTIVE_SUBSCRIBERS.dec();
}

/// Encode every registered metric in the Prometheus text format.
///
/// Returns the content type alongside the body.
pub fn render() -> Result<(String, Vec<u8>)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| Error::Internal(format!("Failed to encode metrics: {}", e)))?;
    Ok((encoder.format_type().to_string(), buffer))
}
