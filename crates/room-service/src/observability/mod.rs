//! Observability for the room service.
//!
//! Instrumentation never records chat content or usernames; metric labels
//! are bounded by code.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `room_rooms_active` | Gauge | none |
//! | `room_members_active` | Gauge | none |
//! | `room_connections_active` | Gauge | none |
//! | `room_requests_total` | Counter | `operation`, `outcome` |
//! | `room_request_duration_seconds` | Histogram | `operation` |
//! | `room_broadcasts_dropped_total` | Counter | `event` |
//! | `room_host_migrations_total` | Counter | none |
//! | `room_actor_panics_total` | Counter | `actor_type` |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
