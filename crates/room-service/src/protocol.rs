//! Client wire protocol.
//!
//! Clients send JSON text frames:
//!
//! ```text
//! {"id": 7, "request": {"event": "join_room", "roomId": "...", "username": "Bob"}}
//! ```
//!
//! and receive two kinds of frames, distinguished by `type`:
//!
//! ```text
//! {"type": "reply", "id": 7, "room": {...}, "userId": "..."}
//! {"type": "reply", "id": 8, "room": null, "error": {"code": "UNAUTHORIZED", "message": "..."}}
//! {"type": "event", "event": "user_joined", "data": {...}}
//! ```
//!
//! Every request gets exactly one reply carrying the request's `id`.

use crate::errors::RoomError;
use crate::room::{MessageType, Room, ServerEvent, VideoState};
use common::types::{RoomId, UserId};
use serde::{Deserialize, Serialize};

/// An inbound frame: a request plus an optional correlation id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ClientFrame {
    #[serde(default)]
    pub id: Option<u64>,
    pub request: ClientRequest,
}

/// Inbound operations.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(
    tag = "event",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientRequest {
    CreateRoom {
        username: String,
    },
    JoinRoom {
        room_id: RoomId,
        username: String,
    },
    LeaveRoom {
        room_id: RoomId,
        user_id: UserId,
    },
    KickUser {
        room_id: RoomId,
        user_id: UserId,
    },
    VideoStateChange {
        room_id: RoomId,
        video_state: VideoState,
    },
    VideoUrlChange {
        room_id: RoomId,
        url: String,
    },
    SendMessage {
        room_id: RoomId,
        message: ChatPayload,
    },
    UpdateUserTime {
        room_id: RoomId,
        user_id: UserId,
        current_time: f64,
    },
    GetRoomInfo {
        room_id: RoomId,
    },
}

impl ClientRequest {
    /// Operation name, as sent in the `event` field.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientRequest::CreateRoom { .. } => "create_room",
            ClientRequest::JoinRoom { .. } => "join_room",
            ClientRequest::LeaveRoom { .. } => "leave_room",
            ClientRequest::KickUser { .. } => "kick_user",
            ClientRequest::VideoStateChange { .. } => "video_state_change",
            ClientRequest::VideoUrlChange { .. } => "video_url_change",
            ClientRequest::SendMessage { .. } => "send_message",
            ClientRequest::UpdateUserTime { .. } => "update_user_time",
            ClientRequest::GetRoomInfo { .. } => "get_room_info",
        }
    }
}

fn default_message_type() -> MessageType {
    MessageType::User
}

/// Chat message as submitted by a client.
///
/// Identity fields are optional; the server uses the connection's binding.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    pub content: String,
    #[serde(rename = "type", default = "default_message_type")]
    pub kind: MessageType,
}

/// An outbound frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Reply(Reply),
    Event(ServerEvent),
}

/// Answer to one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: Option<u64>,
    pub room: Option<Room>,
    /// The caller's own user id after create/join.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl Reply {
    #[must_use]
    pub fn success(id: Option<u64>, room: Option<Room>, user_id: Option<UserId>) -> Self {
        Self {
            id,
            room,
            user_id,
            error: None,
        }
    }

    #[must_use]
    pub fn failure(id: Option<u64>, error: &RoomError) -> Self {
        Self {
            id,
            room: None,
            user_id: None,
            error: Some(ErrorBody::from(error)),
        }
    }
}

/// Client-safe error description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&RoomError> for ErrorBody {
    fn from(error: &RoomError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.client_message(),
        }
    }
}

/// Best-effort extraction of a request id from a frame that failed to parse.
#[must_use]
pub fn peek_request_id(text: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(text)
        .ok()?
        .get("id")?
        .as_u64()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join_room() {
        let room_id = RoomId::new();
        let text = json!({
            "id": 3,
            "request": {"event": "join_room", "roomId": room_id.to_string(), "username": "Bob"}
        })
        .to_string();

        let frame: ClientFrame = serde_json::from_str(&text).unwrap();

        assert_eq!(frame.id, Some(3));
        assert_eq!(
            frame.request,
            ClientRequest::JoinRoom {
                room_id,
                username: "Bob".to_string()
            }
        );
        assert_eq!(frame.request.name(), "join_room");
    }

    #[test]
    fn test_parse_video_state_change() {
        let room_id = RoomId::new();
        let text = json!({
            "request": {
                "event": "video_state_change",
                "roomId": room_id.to_string(),
                "videoState": {"isPlaying": true, "currentTime": 42.0, "duration": 600.0, "buffered": 50.0, "playbackSpeed": 1.5}
            }
        })
        .to_string();

        let frame: ClientFrame = serde_json::from_str(&text).unwrap();

        assert_eq!(frame.id, None);
        let ClientRequest::VideoStateChange { video_state, .. } = frame.request else {
            panic!("wrong request variant");
        };
        assert!(video_state.is_playing);
        assert!((video_state.playback_speed - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_send_message_with_minimal_payload() {
        let room_id = RoomId::new();
        let text = json!({
            "request": {"event": "send_message", "roomId": room_id.to_string(), "message": {"content": "hi"}}
        })
        .to_string();

        let frame: ClientFrame = serde_json::from_str(&text).unwrap();
        let ClientRequest::SendMessage { message, .. } = frame.request else {
            panic!("wrong request variant");
        };
        assert_eq!(message.content, "hi");
        assert_eq!(message.kind, MessageType::User);
        assert_eq!(message.user_id, None);
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let text = json!({"request": {"event": "self_destruct"}}).to_string();
        assert!(serde_json::from_str::<ClientFrame>(&text).is_err());
        assert_eq!(peek_request_id(&json!({"id": 9, "request": {}}).to_string()), Some(9));
        assert_eq!(peek_request_id("not json"), None);
    }

    #[test]
    fn test_reply_wire_shape() {
        let reply = ServerFrame::Reply(Reply::failure(Some(4), &RoomError::RoomNotFound));
        let value = serde_json::to_value(&reply).unwrap();

        assert_eq!(
            value,
            json!({
                "type": "reply",
                "id": 4,
                "room": null,
                "error": {"code": "ROOM_NOT_FOUND", "message": "Room not found"}
            })
        );
    }

    #[test]
    fn test_event_wire_shape() {
        let frame = ServerFrame::Event(ServerEvent::VideoUrlUpdated("http://x/a.mp4".to_string()));
        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(
            value,
            json!({"type": "event", "event": "video_url_updated", "data": "http://x/a.mp4"})
        );
    }
}
