//! Prometheus metrics for the room service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `room_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded by code, never by client input:
//! - `operation`: the nine inbound operations
//! - `outcome`: `success` or an error label from `RoomError::metric_label`
//! - `event`: the seven outbound event names
//! - `actor_type`: registry, room

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus recorder and return the handle that renders `/metrics`.
///
/// Must be called before any metric is recorded.
///
/// # Errors
///
/// Returns error if the recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Requests are in-memory actor round trips
        .set_buckets_for_metric(
            Matcher::Prefix("room_request_duration".to_string()),
            &[
                0.0001, 0.0005, 0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set request duration buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Gauges
// ============================================================================

/// Metric: `room_rooms_active`
pub fn set_rooms_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("room_rooms_active").set(count as f64);
}

/// Metric: `room_members_active`
///
/// Members across all rooms.
pub fn set_members_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("room_members_active").set(count as f64);
}

/// Metric: `room_connections_active`
///
/// Open WebSocket connections, bound to a room or not.
pub fn set_connections_active(count: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("room_connections_active").set(count as f64);
}

// ============================================================================
// Requests
// ============================================================================

/// Record one handled client request.
///
/// Metrics: `room_requests_total{operation, outcome}`,
/// `room_request_duration_seconds{operation}`
pub fn record_request(operation: &'static str, outcome: &'static str, duration: Duration) {
    counter!("room_requests_total",
        "operation" => operation,
        "outcome" => outcome
    )
    .increment(1);

    histogram!("room_request_duration_seconds", "operation" => operation)
        .record(duration.as_secs_f64());
}

// ============================================================================
// Rooms
// ============================================================================

/// Record a broadcast skipped because a member's outbound buffer was full.
///
/// Metric: `room_broadcasts_dropped_total{event}`
pub fn record_broadcast_dropped(event: &'static str) {
    counter!("room_broadcasts_dropped_total", "event" => event).increment(1);
}

/// Metric: `room_host_migrations_total`
pub fn record_host_migration() {
    counter!("room_host_migrations_total").increment(1);
}

/// Record an actor panic.
///
/// Metric: `room_actor_panics_total{actor_type}`
///
/// ALERT: Any non-zero value indicates a bug.
pub fn record_actor_panic(actor_type: &'static str) {
    counter!("room_actor_panics_total", "actor_type" => actor_type).increment(1);
}
