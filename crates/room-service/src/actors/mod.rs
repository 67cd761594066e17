//! Actor hierarchy for the room service.
//!
//! ```text
//! RoomRegistryActor (singleton per process)
//! └── supervises N RoomActors
//!     └── RoomActor (one per open room)
//!         ├── owns the RoomState
//!         └── holds one MemberSink per member
//! ```
//!
//! - **Per-room serialization**: every mutation of a room goes through its
//!   actor's mailbox, so concurrent joins and leaves are applied one at a time
//! - **CancellationToken propagation**: rooms run on child tokens of the registry
//! - **Mailbox monitoring**: depth thresholds per actor type (Registry: 200/1000, Room: 100/500)
//!
//! # Modules
//!
//! - [`registry`] - `RoomRegistryActor`, creates and looks up rooms
//! - [`room`] - `RoomActor`, applies commands and fans out events
//! - [`member`] - non-blocking outbound handle to a member's connection
//! - [`messages`] - message types for actor communication
//! - [`metrics`] - mailbox monitoring and actor metrics

pub mod member;
pub mod messages;
pub mod metrics;
pub mod registry;
pub mod room;

pub use member::{Delivery, MemberSink};
pub use messages::*;
pub use metrics::{ActorMetrics, ActorType, MailboxLevel, MailboxMonitor};
pub use registry::{RegistryConfig, RoomRegistryActor, RoomRegistryHandle};
pub use room::{RoomActor, RoomActorHandle};
