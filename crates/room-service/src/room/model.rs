//! Room data model.
//!
//! These are the shapes clients see: every struct serializes to camelCase
//! JSON, and `Room` is the snapshot broadcast after each membership change.

use common::types::{MessageId, RoomId, UserId};
use serde::{Deserialize, Serialize, Serializer};

/// Shared watch session: one video, its members, and who drives playback.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    /// Current playback authority. Always the id of the one user with `is_host`.
    pub host_id: UserId,
    /// Members in join order.
    pub users: Vec<User>,
    /// Empty when no video is loaded.
    pub video_url: String,
    pub is_playing: bool,
    /// Authoritative position in seconds.
    pub current_time: f64,
    /// Length of the loaded video in seconds, once the host has reported it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Room {
    /// Look up a member by id.
    #[must_use]
    pub fn user(&self, user_id: &UserId) -> Option<&User> {
        self.users.iter().find(|user| user.id == *user_id)
    }

    /// Whether `user_id` is currently a member.
    #[must_use]
    pub fn is_member(&self, user_id: &UserId) -> bool {
        self.user(user_id).is_some()
    }

    /// The current host, if the room has any members.
    #[must_use]
    pub fn host(&self) -> Option<&User> {
        self.user(&self.host_id)
    }
}

/// A room member.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub is_host: bool,
    /// Last position this user reported. Informational only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_known_time: Option<f64>,
}

impl User {
    pub(crate) fn new(username: String, is_host: bool) -> Self {
        Self {
            id: UserId::new(),
            username,
            is_host,
            last_known_time: None,
        }
    }
}

/// Origin of a relayed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    User,
    System,
}

/// A chat line or relay-generated narration, stamped by the relay.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    /// `None` for system messages, sent as an empty string.
    #[serde(serialize_with = "user_id_or_empty")]
    pub user_id: Option<UserId>,
    pub username: String,
    pub content: String,
    /// Milliseconds since the Unix epoch, non-decreasing within a room.
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub kind: MessageType,
}

fn user_id_or_empty<S: Serializer>(user_id: &Option<UserId>, s: S) -> Result<S::Ok, S::Error> {
    match user_id {
        Some(id) => id.serialize(s),
        None => s.serialize_str(""),
    }
}

fn default_playback_speed() -> f64 {
    1.0
}

/// Playback state sent by the host and relayed to the other members.
///
/// Only `is_playing` and `current_time` are kept on the room; the rest is
/// passed through as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoState {
    pub is_playing: bool,
    pub current_time: f64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub buffered: f64,
    #[serde(default = "default_playback_speed")]
    pub playback_speed: f64,
}

impl VideoState {
    /// State with the given authoritative fields and neutral extras.
    #[must_use]
    pub fn new(is_playing: bool, current_time: f64) -> Self {
        Self {
            is_playing,
            current_time,
            duration: 0.0,
            buffered: 0.0,
            playback_speed: default_playback_speed(),
        }
    }
}

/// A member's self-reported position, rebroadcast for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserTimeUpdate {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub current_time: f64,
}
