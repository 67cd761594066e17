//! Request fixtures.
//!
//! One constructor per client operation, so tests read as the request they
//! send rather than as enum literals.

use common::types::{RoomId, UserId};
use room_service::actors::RegistryConfig;
use room_service::protocol::{ChatPayload, ClientRequest};
use room_service::room::{MessageType, RoomLimits, VideoState};

#[must_use]
pub fn create_room(username: &str) -> ClientRequest {
    ClientRequest::CreateRoom {
        username: username.to_string(),
    }
}

#[must_use]
pub fn join_room(room_id: RoomId, username: &str) -> ClientRequest {
    ClientRequest::JoinRoom {
        room_id,
        username: username.to_string(),
    }
}

#[must_use]
pub fn leave_room(room_id: RoomId, user_id: UserId) -> ClientRequest {
    ClientRequest::LeaveRoom { room_id, user_id }
}

#[must_use]
pub fn kick_user(room_id: RoomId, user_id: UserId) -> ClientRequest {
    ClientRequest::KickUser { room_id, user_id }
}

#[must_use]
pub fn video_state_change(room_id: RoomId, video_state: VideoState) -> ClientRequest {
    ClientRequest::VideoStateChange {
        room_id,
        video_state,
    }
}

#[must_use]
pub fn video_url_change(room_id: RoomId, url: &str) -> ClientRequest {
    ClientRequest::VideoUrlChange {
        room_id,
        url: url.to_string(),
    }
}

/// A plain chat line with no claimed identity.
#[must_use]
pub fn send_message(room_id: RoomId, content: &str) -> ClientRequest {
    ClientRequest::SendMessage {
        room_id,
        message: chat(content),
    }
}

#[must_use]
pub fn update_user_time(room_id: RoomId, user_id: UserId, current_time: f64) -> ClientRequest {
    ClientRequest::UpdateUserTime {
        room_id,
        user_id,
        current_time,
    }
}

#[must_use]
pub fn get_room_info(room_id: RoomId) -> ClientRequest {
    ClientRequest::GetRoomInfo { room_id }
}

/// Chat payload as a browser client sends it.
#[must_use]
pub fn chat(content: &str) -> ChatPayload {
    ChatPayload {
        user_id: None,
        username: None,
        content: content.to_string(),
        kind: MessageType::User,
    }
}

/// Playing at `current_time`, normal speed.
#[must_use]
pub fn playing_at(current_time: f64) -> VideoState {
    VideoState::new(true, current_time)
}

/// Paused at `current_time`.
#[must_use]
pub fn paused_at(current_time: f64) -> VideoState {
    VideoState::new(false, current_time)
}

/// Registry settings for a test service.
///
/// ```rust,ignore
/// let config = TestRegistry::new().with_max_members(2).with_max_rooms(1).build();
/// ```
#[derive(Debug, Clone, Default)]
pub struct TestRegistry {
    max_rooms: Option<usize>,
    limits: RoomLimits,
}

impl TestRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_max_rooms(mut self, max_rooms: usize) -> Self {
        self.max_rooms = Some(max_rooms);
        self
    }

    #[must_use]
    pub fn with_max_members(mut self, max_members: usize) -> Self {
        self.limits.max_members = max_members;
        self
    }

    #[must_use]
    pub fn with_max_message_chars(mut self, max_message_chars: usize) -> Self {
        self.limits.max_message_chars = max_message_chars;
        self
    }

    #[must_use]
    pub fn build(self) -> RegistryConfig {
        let mut config = RegistryConfig {
            instance_id: "room-test".to_string(),
            room_limits: self.limits,
            ..RegistryConfig::default()
        };
        if let Some(max_rooms) = self.max_rooms {
            config.max_rooms = max_rooms;
        }
        config
    }
}
