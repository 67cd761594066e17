//! Room aggregate and its state transitions.
//!
//! Everything in this module is synchronous and free of I/O. A command is
//! applied to a [`RoomState`] and produces a [`Transition`]: the value for
//! the caller plus the outbound events the mutation caused, in order.
//! Delivering those events is the room actor's job.
//!
//! - [`membership`] - create, join, leave, kick and host migration
//! - [`playback`] - authoritative video state and drift tolerance
//! - [`relay`] - message stamping and system narration

pub mod events;
pub mod membership;
pub mod model;
pub mod playback;
pub mod relay;

pub use events::{Audience, Outbound, ServerEvent};
pub use membership::{Joined, LeaveOutcome};
pub use model::{Message, MessageType, Room, User, UserTimeUpdate, VideoState};
pub use playback::{needs_correction, DRIFT_TOLERANCE_SECONDS};
pub use relay::Relay;

use crate::errors::RoomError;
use common::types::{RoomId, UserId};

/// Per-room limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomLimits {
    pub max_members: usize,
    pub max_username_chars: usize,
    pub max_message_chars: usize,
    pub max_url_chars: usize,
}

impl Default for RoomLimits {
    fn default() -> Self {
        Self {
            max_members: crate::config::DEFAULT_MAX_MEMBERS,
            max_username_chars: crate::config::DEFAULT_MAX_USERNAME_CHARS,
            max_message_chars: crate::config::DEFAULT_MAX_MESSAGE_CHARS,
            max_url_chars: crate::config::DEFAULT_MAX_URL_CHARS,
        }
    }
}

/// Authority an operation requires of its requester.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    /// Any current member.
    Member,
    /// The current host only.
    Host,
}

/// Result of applying a command: a value for the caller and the events to send.
#[derive(Debug)]
pub struct Transition<T> {
    pub value: T,
    pub outbound: Vec<Outbound>,
    /// Member removed by this transition, whose outbound sink should be dropped.
    pub departed: Option<UserId>,
}

impl<T> Transition<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            outbound: Vec::new(),
            departed: None,
        }
    }

    fn emit(mut self, outbound: Outbound) -> Self {
        self.outbound.push(outbound);
        self
    }

    fn map_value<U>(self, f: impl FnOnce(T) -> U) -> Transition<U> {
        Transition {
            value: f(self.value),
            outbound: self.outbound,
            departed: self.departed,
        }
    }
}

/// A mutation of an existing room.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Leave {
        user_id: UserId,
    },
    Kick {
        requester: UserId,
        target: UserId,
    },
    SetVideoState {
        requester: UserId,
        state: VideoState,
    },
    SetVideoUrl {
        requester: UserId,
        url: String,
    },
    PostMessage {
        sender: UserId,
        content: String,
    },
    UpdateUserTime {
        user_id: UserId,
        current_time: f64,
    },
}

impl Command {
    /// The requester and the authority they must hold, if any.
    ///
    /// Leaving needs none so that a repeated leave stays a no-op.
    #[must_use]
    pub fn required_authority(&self) -> Option<(UserId, Authority)> {
        match self {
            Command::Leave { .. } => None,
            Command::Kick { requester, .. }
            | Command::SetVideoState { requester, .. }
            | Command::SetVideoUrl { requester, .. } => Some((*requester, Authority::Host)),
            Command::PostMessage { sender, .. } => Some((*sender, Authority::Member)),
            Command::UpdateUserTime { user_id, .. } => Some((*user_id, Authority::Member)),
        }
    }

    /// Operation name for logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Command::Leave { .. } => "leave_room",
            Command::Kick { .. } => "kick_user",
            Command::SetVideoState { .. } => "video_state_change",
            Command::SetVideoUrl { .. } => "video_url_change",
            Command::PostMessage { .. } => "send_message",
            Command::UpdateUserTime { .. } => "update_user_time",
        }
    }
}

/// What a successfully applied command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Left(LeaveOutcome),
    Posted(Message),
    Applied,
}

/// A room together with its relay clock and limits.
///
/// Only ever touched by the room's own actor, one command at a time.
#[derive(Debug)]
pub struct RoomState {
    room: Room,
    relay: Relay,
    limits: RoomLimits,
}

impl RoomState {
    /// Current snapshot.
    #[must_use]
    pub fn room(&self) -> &Room {
        &self.room
    }

    #[must_use]
    pub fn id(&self) -> RoomId {
        self.room.id
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.room.users.is_empty()
    }

    #[must_use]
    pub fn member_ids(&self) -> Vec<UserId> {
        self.room.users.iter().map(|user| user.id).collect()
    }

    /// Check that `requester` holds `authority` in this room.
    pub fn authorize(&self, requester: &UserId, authority: Authority) -> Result<(), RoomError> {
        if !self.room.is_member(requester) {
            return Err(RoomError::Unauthorized(
                "not a member of this room".to_string(),
            ));
        }
        match authority {
            Authority::Member => Ok(()),
            Authority::Host if self.room.host_id == *requester => Ok(()),
            Authority::Host => Err(RoomError::Unauthorized(
                "only the host can do that".to_string(),
            )),
        }
    }

    /// Apply a command after checking the requester's authority once.
    pub fn apply(&mut self, command: Command) -> Result<Transition<Outcome>, RoomError> {
        if let Some((requester, authority)) = command.required_authority() {
            self.authorize(&requester, authority)?;
        }

        match command {
            Command::Leave { user_id } => Ok(self.leave(&user_id).map_value(Outcome::Left)),
            Command::Kick { requester, target } => {
                Ok(self.kick(&requester, &target)?.map_value(Outcome::Left))
            }
            Command::SetVideoState { requester, state } => Ok(self
                .set_video_state(&requester, state)?
                .map_value(|()| Outcome::Applied)),
            Command::SetVideoUrl { requester, url } => Ok(self
                .set_video_url(&requester, url)?
                .map_value(|()| Outcome::Applied)),
            Command::PostMessage { sender, content } => {
                Ok(self.post_message(&sender, &content)?.map_value(Outcome::Posted))
            }
            Command::UpdateUserTime {
                user_id,
                current_time,
            } => Ok(self
                .update_user_time(&user_id, current_time)?
                .map_value(|()| Outcome::Applied)),
        }
    }
}

/// Trim a client-supplied text field and check it against a length limit.
fn validated_text(raw: &str, field: &str, max_chars: usize) -> Result<String, RoomError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RoomError::InvalidRequest(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max_chars {
        return Err(RoomError::InvalidRequest(format!(
            "{field} must be at most {max_chars} characters"
        )));
    }
    Ok(trimmed.to_string())
}
