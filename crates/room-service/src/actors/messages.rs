//! Actor message types.
//!
//! Each actor owns a mailbox of one of these enums. Requests carry a
//! `oneshot` sender for the reply.

use super::member::MemberSink;
use super::room::RoomActorHandle;
use crate::errors::RoomError;
use crate::room::{Command, Joined, Outcome, Room};
use common::types::RoomId;
use std::time::Duration;
use tokio::sync::oneshot;

/// Messages handled by the `RoomRegistryActor`.
#[derive(Debug)]
pub enum RegistryMessage {
    /// Open a room with `username` as host; `host` receives its broadcasts.
    CreateRoom {
        username: String,
        host: MemberSink,
        respond_to: oneshot::Sender<Result<Joined, RoomError>>,
    },

    /// Look up the actor for a room.
    GetRoom {
        room_id: RoomId,
        respond_to: oneshot::Sender<Result<RoomActorHandle, RoomError>>,
    },

    /// Report registry status.
    GetStatus {
        respond_to: oneshot::Sender<RegistryStatus>,
    },

    /// Stop accepting rooms and close the open ones within `deadline`.
    Shutdown {
        deadline: Duration,
        respond_to: oneshot::Sender<Result<(), RoomError>>,
    },
}

/// Messages handled by a `RoomActor`.
#[derive(Debug)]
pub enum RoomMessage {
    /// Add a member whose broadcasts go to `sink`.
    Join {
        username: String,
        sink: MemberSink,
        respond_to: oneshot::Sender<Result<Joined, RoomError>>,
    },

    /// Apply a mutation to the room.
    Apply {
        command: Command,
        respond_to: oneshot::Sender<Result<Outcome, RoomError>>,
    },

    /// Read the current room snapshot.
    GetRoom { respond_to: oneshot::Sender<Room> },
}

/// Registry status snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryStatus {
    pub room_count: usize,
    pub member_count: usize,
    pub connection_count: usize,
    pub is_draining: bool,
    /// Requests queued when this one was taken, itself included.
    pub mailbox_depth: usize,
}
