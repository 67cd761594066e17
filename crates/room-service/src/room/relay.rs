//! Message relay: stamps chat and system messages for one room.
//!
//! Ids and timestamps are assigned here, never taken from clients. The
//! timestamp is a local wall-clock reading in milliseconds, clamped so that
//! it never goes backwards within the room even if the system clock steps.

use super::events::{Outbound, ServerEvent};
use super::model::{Message, MessageType};
use super::{validated_text, RoomState, Transition};
use crate::errors::RoomError;
use common::types::{MessageId, UserId};

/// Username shown on relay-generated messages.
pub const SYSTEM_USERNAME: &str = "System";

type Clock = fn() -> i64;

fn wall_clock_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Per-room message stamper.
#[derive(Debug)]
pub struct Relay {
    last_timestamp: i64,
    clock: Clock,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new()
    }
}

impl Relay {
    /// Relay reading the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(wall_clock_millis)
    }

    pub(crate) fn with_clock(clock: Clock) -> Self {
        Self {
            last_timestamp: i64::MIN,
            clock,
        }
    }

    fn next_timestamp(&mut self) -> i64 {
        self.last_timestamp = self.last_timestamp.max((self.clock)());
        self.last_timestamp
    }

    /// Stamp a message posted by a member.
    pub fn stamp(&mut self, sender: UserId, username: &str, content: String) -> Message {
        Message {
            id: MessageId::new(),
            user_id: Some(sender),
            username: username.to_string(),
            content,
            timestamp: self.next_timestamp(),
            kind: MessageType::User,
        }
    }

    /// Synthesize a system narration message.
    pub fn system(&mut self, content: String) -> Message {
        Message {
            id: MessageId::new(),
            user_id: None,
            username: SYSTEM_USERNAME.to_string(),
            content,
            timestamp: self.next_timestamp(),
            kind: MessageType::System,
        }
    }

    pub fn joined(&mut self, username: &str) -> Message {
        self.system(format!("{username} joined the room"))
    }

    pub fn left(&mut self, username: &str) -> Message {
        self.system(format!("{username} left the room"))
    }

    pub fn kicked(&mut self, username: &str) -> Message {
        self.system(format!("{username} was kicked from the room"))
    }

    pub fn video_changed(&mut self, username: &str) -> Message {
        self.system(format!("{username} changed the video"))
    }
}

impl RoomState {
    /// Relay a member's chat line to the whole room, sender included.
    ///
    /// The sender's registered username is used, not a client-supplied one.
    pub fn post_message(
        &mut self,
        sender: &UserId,
        content: &str,
    ) -> Result<Transition<Message>, RoomError> {
        let content = validated_text(content, "message", self.limits.max_message_chars)?;
        let username = self
            .room
            .user(sender)
            .map(|user| user.username.clone())
            .ok_or(RoomError::UserNotFound)?;

        let message = self.relay.stamp(*sender, &username, content);

        Ok(Transition::new(message.clone())
            .emit(Outbound::everyone(ServerEvent::MessageReceived(message))))
    }
}
