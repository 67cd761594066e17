//! Outbound room events and who receives them.

use super::model::{Message, Room, UserTimeUpdate, VideoState};
use common::types::UserId;
use serde::Serialize;

/// Room-scoped broadcast, serialized as `{"event": "<name>", "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    UserJoined(Room),
    UserLeft(Room),
    /// Sent only to the removed member's connection.
    Kicked,
    VideoStateUpdated(VideoState),
    VideoUrlUpdated(String),
    MessageReceived(Message),
    UserTimeUpdate(UserTimeUpdate),
}

impl ServerEvent {
    /// Event name as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UserJoined(_) => "user_joined",
            ServerEvent::UserLeft(_) => "user_left",
            ServerEvent::Kicked => "kicked",
            ServerEvent::VideoStateUpdated(_) => "video_state_updated",
            ServerEvent::VideoUrlUpdated(_) => "video_url_updated",
            ServerEvent::MessageReceived(_) => "message_received",
            ServerEvent::UserTimeUpdate(_) => "user_time_update",
        }
    }
}

/// Recipients of an outbound event.
///
/// Resolved against the room's membership after the mutation that produced
/// the event, so a member who just left is not part of `Everyone`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    EveryoneExcept(UserId),
    Only(UserId),
}

/// An event paired with its audience.
#[derive(Debug, Clone, PartialEq)]
pub struct Outbound {
    pub audience: Audience,
    pub event: ServerEvent,
}

impl Outbound {
    #[must_use]
    pub fn everyone(event: ServerEvent) -> Self {
        Self {
            audience: Audience::Everyone,
            event,
        }
    }

    #[must_use]
    pub fn everyone_except(user_id: UserId, event: ServerEvent) -> Self {
        Self {
            audience: Audience::EveryoneExcept(user_id),
            event,
        }
    }

    #[must_use]
    pub fn only(user_id: UserId, event: ServerEvent) -> Self {
        Self {
            audience: Audience::Only(user_id),
            event,
        }
    }

    /// Ids of the users this event goes to, given the current members.
    pub fn recipients<'a>(&'a self, members: &'a [UserId]) -> impl Iterator<Item = UserId> + 'a {
        let only = match self.audience {
            Audience::Only(target) => Some(target),
            Audience::Everyone | Audience::EveryoneExcept(_) => None,
        };
        let broadcast = members
            .iter()
            .copied()
            .filter(move |user_id| match self.audience {
                Audience::Everyone => true,
                Audience::EveryoneExcept(excluded) => *user_id != excluded,
                Audience::Only(_) => false,
            });
        only.into_iter().chain(broadcast)
    }
}
