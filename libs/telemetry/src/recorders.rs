//! Metric names and recorders for the bridge pipeline.
//!
//! Recorders go through the `metrics` facade and are no-ops until the host
//! installs an exporter.

use metrics::{counter, gauge, histogram};
use tracing::Span;

pub const EVENTS_NORMALIZED: &str = "bridge_events_normalized_total";
pub const MESSAGES_DROPPED: &str = "bridge_messages_dropped_total";
pub const EVENTS_ENQUEUED: &str = "bridge_events_enqueued_total";
pub const EVENTS_EVICTED: &str = "bridge_events_evicted_total";
pub const BATCHES_DELIVERED: &str = "bridge_batches_delivered_total";
pub const EVENTS_DELIVERED: &str = "bridge_events_delivered_total";
pub const DELIVERY_FAILURES: &str = "bridge_delivery_failures_total";
pub const DELIVERY_LATENCY: &str = "bridge_delivery_seconds";
pub const BUFFER_DEPTH: &str = "bridge_buffer_depth";
pub const ROSTER_UPDATES: &str = "bridge_roster_updates_total";

const FLUSH_SPAN_NAME: &str = "dispatch.flush";

pub fn record_normalized(count: usize) {
    counter!(EVENTS_NORMALIZED).increment(count as u64);
}

/// `reason` is e.g. `empty` for messages with neither text nor media.
pub fn record_dropped(reason: &'static str, count: usize) {
    counter!(MESSAGES_DROPPED, "reason" => reason).increment(count as u64);
}

pub fn record_enqueued(count: usize) {
    counter!(EVENTS_ENQUEUED).increment(count as u64);
}

/// Events discarded by the buffer itself (`overflow` or `retry_exhausted`).
pub fn record_evicted(reason: &'static str, count: usize) {
    counter!(EVENTS_EVICTED, "reason" => reason).increment(count as u64);
}

pub fn record_delivery_success(events: usize, latency_secs: f64) {
    counter!(BATCHES_DELIVERED).increment(1);
    counter!(EVENTS_DELIVERED).increment(events as u64);
    histogram!(DELIVERY_LATENCY, "outcome" => "ok").record(latency_secs);
}

pub fn record_delivery_failure(kind: &'static str, latency_secs: f64) {
    counter!(DELIVERY_FAILURES, "kind" => kind).increment(1);
    histogram!(DELIVERY_LATENCY, "outcome" => "error").record(latency_secs);
}

pub fn record_buffer_depth(depth: usize) {
    gauge!(BUFFER_DEPTH).set(depth as f64);
}

pub fn record_roster_update(kind: &'static str, recorded: usize) {
    counter!(ROSTER_UPDATES, "kind" => kind).increment(recorded as u64);
}

pub fn start_flush_span(bridge_id: &str, trigger: &str, events: usize) -> Span {
    tracing::info_span!(
        FLUSH_SPAN_NAME,
        bridge_id = %bridge_id,
        trigger = %trigger,
        events = events
    )
}
