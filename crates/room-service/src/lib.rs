//! Watch Room Service Library
//!
//! Keeps a group of clients watching one video in lockstep. One member of
//! each room (the host) drives playback; everyone else mirrors it, and all
//! members share a chat.
//!
//! # Architecture
//!
//! ```text
//! WebSocket connection ──> Dispatcher ──> RoomRegistryActor (singleton)
//!        ^                    │                  └── RoomActor (one per room)
//!        │                    └── SessionTable         └── RoomState
//!        └──────── outbound frames (MemberSink) ──────────┘
//! ```
//!
//! - Every mutation of a room is applied by that room's actor, one at a time
//! - Room logic is a pure transition (`RoomState` -> value + outbound events),
//!   so it is tested without any channel
//! - Host authority is checked once, in `RoomState::apply`
//! - Broadcasts are fire-and-forget; a member with a full outbound queue
//!   misses the event and re-fetches the room
//!
//! # Modules
//!
//! - [`room`] - room aggregate, membership, playback and message relay
//! - [`actors`] - registry and per-room actors
//! - [`session`] - connection to `(room, user)` bindings
//! - [`dispatch`] - request boundary: binding checks and routing
//! - [`protocol`] - JSON wire frames
//! - [`transport`] - axum WebSocket and HTTP endpoints
//! - [`observability`] - Prometheus metrics and health probes
//! - [`config`] - service configuration from environment
//! - [`errors`] - error types with wire error codes

pub mod actors;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod observability;
pub mod protocol;
pub mod room;
pub mod session;
pub mod transport;
