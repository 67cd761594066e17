//! Room service error types.
//!
//! Every error is a local, recoverable condition reported back to the
//! originating caller through the request's reply. Error types map to stable
//! wire codes; internal details are logged server-side but not exposed to
//! clients.

use thiserror::Error;

/// Room service error type.
///
/// Maps to wire error codes:
/// - `RoomNotFound`: `ROOM_NOT_FOUND`
/// - `DuplicateUsername`: `DUPLICATE_USERNAME`
/// - `Unauthorized`: `UNAUTHORIZED`
/// - `UnboundConnection`: `UNBOUND_CONNECTION`
/// - `UserNotFound`: `USER_NOT_FOUND`
/// - `InvalidRequest`: `INVALID_REQUEST`
/// - `CapacityExceeded`, `Draining`: `CAPACITY_EXCEEDED`
/// - `Internal`: `INTERNAL_ERROR`
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// Operation referenced a room that does not exist (or no longer exists).
    #[error("Room not found")]
    RoomNotFound,

    /// Join rejected, a member already uses this name (case-insensitive).
    #[error("Username already taken in this room")]
    DuplicateUsername,

    /// Requester lacks the authority the operation needs.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// In-room operation from a connection with no session binding.
    #[error("Connection is not bound to a room")]
    UnboundConnection,

    /// Target user is not a member of the room.
    #[error("User not found")]
    UserNotFound,

    /// Malformed or out-of-range request.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Room or service limit reached.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Service is shutting down and refuses new rooms.
    #[error("Service is draining")]
    Draining,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RoomError {
    /// Returns the wire error code for this error.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            RoomError::RoomNotFound => "ROOM_NOT_FOUND",
            RoomError::DuplicateUsername => "DUPLICATE_USERNAME",
            RoomError::Unauthorized(_) => "UNAUTHORIZED",
            RoomError::UnboundConnection => "UNBOUND_CONNECTION",
            RoomError::UserNotFound => "USER_NOT_FOUND",
            RoomError::InvalidRequest(_) => "INVALID_REQUEST",
            RoomError::CapacityExceeded(_) | RoomError::Draining => "CAPACITY_EXCEEDED",
            RoomError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns a client-safe error message (no internal details).
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            RoomError::Internal(_) => "An internal error occurred".to_string(),
            RoomError::Draining => "Server is shutting down, please reconnect".to_string(),
            RoomError::Unauthorized(msg)
            | RoomError::InvalidRequest(msg)
            | RoomError::CapacityExceeded(msg) => msg.clone(),
            RoomError::RoomNotFound
            | RoomError::DuplicateUsername
            | RoomError::UnboundConnection
            | RoomError::UserNotFound => self.to_string(),
        }
    }

    /// Outcome label for request metrics.
    #[must_use]
    pub fn metric_label(&self) -> &'static str {
        match self {
            RoomError::RoomNotFound => "room_not_found",
            RoomError::DuplicateUsername => "duplicate_username",
            RoomError::Unauthorized(_) => "unauthorized",
            RoomError::UnboundConnection => "unbound_connection",
            RoomError::UserNotFound => "user_not_found",
            RoomError::InvalidRequest(_) => "invalid_request",
            RoomError::CapacityExceeded(_) | RoomError::Draining => "capacity_exceeded",
            RoomError::Internal(_) => "internal",
        }
    }
}
