//! Request boundary between connections and room actors.
//!
//! The [`Dispatcher`] is the only component that sees both a connection's
//! identity and the rooms. For every inbound request it:
//!
//! 1. Resolves the connection's [`SessionBinding`] (in-room requests from an
//!    unbound connection fail with `UnboundConnection`)
//! 2. Checks that ids in the payload agree with the binding
//! 3. Forwards the request to the room's actor, which applies the
//!    authorization guard and broadcasts the result
//! 4. Keeps the binding in step: bind after create/join, unbind on leave,
//!    kick and disconnect
//!
//! Disconnect handling is idempotent: a connection that already left
//! explicitly has no binding, so its disconnect does nothing.

use crate::actors::{MemberSink, RoomActorHandle, RoomRegistryHandle};
use crate::errors::RoomError;
use crate::observability::metrics as prom;
use crate::protocol::{ChatPayload, ClientRequest};
use crate::room::{Joined, LeaveOutcome, MessageType, Room};
use crate::session::{SessionBinding, SessionTable};

use common::types::{ConnectionId, RoomId, UserId};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, instrument};

/// Successful result of a request, carried back in the reply frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Response {
    pub room: Option<Room>,
    /// The caller's own user id after create/join.
    pub user_id: Option<UserId>,
}

impl Response {
    fn joined(joined: Joined) -> Self {
        Self {
            room: Some(joined.room),
            user_id: Some(joined.user.id),
        }
    }
}

/// Routes client requests to room actors.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: RoomRegistryHandle,
    sessions: Arc<SessionTable>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(registry: RoomRegistryHandle, sessions: Arc<SessionTable>) -> Self {
        Self { registry, sessions }
    }

    #[must_use]
    pub fn registry(&self) -> &RoomRegistryHandle {
        &self.registry
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    /// Handle one request from `connection`.
    #[instrument(
        skip_all,
        name = "room.dispatch",
        fields(operation = request.name(), connection_id = %connection.connection_id())
    )]
    pub async fn handle(
        &self,
        connection: &MemberSink,
        request: ClientRequest,
    ) -> Result<Response, RoomError> {
        let operation = request.name();
        let start = Instant::now();

        let result = self.route(connection, request).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => {
                debug!(
                    target: "room.dispatch",
                    operation,
                    connection_id = %connection.connection_id(),
                    error_code = e.error_code(),
                    error = %e,
                    "Request rejected"
                );
                e.metric_label()
            }
        };
        prom::record_request(operation, outcome, start.elapsed());

        result
    }

    async fn route(
        &self,
        connection: &MemberSink,
        request: ClientRequest,
    ) -> Result<Response, RoomError> {
        let connection_id = connection.connection_id();

        match request {
            ClientRequest::CreateRoom { username } => {
                let joined = self
                    .registry
                    .create_room(username, connection.clone())
                    .await?;
                self.bind(connection_id, &joined).await;
                Ok(Response::joined(joined))
            }

            ClientRequest::JoinRoom { room_id, username } => {
                let room = self.registry.get_room(room_id).await?;
                let joined = room.join(username, connection.clone()).await?;
                self.bind(connection_id, &joined).await;
                self.drop_binding_if_removed(&room, &joined).await;
                Ok(Response::joined(joined))
            }

            ClientRequest::LeaveRoom { room_id, user_id } => {
                let binding = self.bound_to(connection_id, room_id).await?;
                if binding.user_id != user_id {
                    return Err(RoomError::Unauthorized(
                        "cannot leave on behalf of another user".to_string(),
                    ));
                }

                self.sessions.unbind(connection_id).await;
                let room = self.registry.get_room(room_id).await?;
                room.leave(user_id).await?;
                Ok(Response::default())
            }

            ClientRequest::KickUser { room_id, user_id } => {
                let (binding, room) = self.bound_room(connection_id, room_id).await?;
                let outcome = room.kick(binding.user_id, user_id).await?;

                // The kicked connection stays open but no longer speaks for the room
                self.sessions.unbind_member(room_id, user_id).await;
                debug!(
                    target: "room.dispatch",
                    room_id = %room_id,
                    user_id = %user_id,
                    room_deleted = outcome == LeaveOutcome::RoomDeleted,
                    "Member kicked"
                );
                Ok(Response::default())
            }

            ClientRequest::VideoStateChange {
                room_id,
                video_state,
            } => {
                let (binding, room) = self.bound_room(connection_id, room_id).await?;
                room.set_video_state(binding.user_id, video_state).await?;
                Ok(Response::default())
            }

            ClientRequest::VideoUrlChange { room_id, url } => {
                let (binding, room) = self.bound_room(connection_id, room_id).await?;
                room.set_video_url(binding.user_id, url).await?;
                Ok(Response::default())
            }

            ClientRequest::SendMessage { room_id, message } => {
                let (binding, room) = self.bound_room(connection_id, room_id).await?;
                let content = chat_content(&binding, message)?;
                let posted = room.post_message(binding.user_id, content).await?;
                debug!(
                    target: "room.dispatch",
                    room_id = %room_id,
                    message_id = %posted.id,
                    content_chars = posted.content.chars().count(),
                    "Message relayed"
                );
                Ok(Response::default())
            }

            ClientRequest::UpdateUserTime {
                room_id,
                user_id,
                current_time,
            } => {
                let (binding, room) = self.bound_room(connection_id, room_id).await?;
                if binding.user_id != user_id {
                    return Err(RoomError::Unauthorized(
                        "cannot report time for another user".to_string(),
                    ));
                }
                room.update_user_time(user_id, current_time).await?;
                Ok(Response::default())
            }

            ClientRequest::GetRoomInfo { room_id } => Ok(Response {
                room: self.room_info(room_id).await,
                user_id: None,
            }),
        }
    }

    /// Current snapshot of a room, or `None` if it does not exist.
    pub async fn room_info(&self, room_id: RoomId) -> Option<Room> {
        let room = self.registry.get_room(room_id).await.ok()?;
        room.snapshot().await.ok()
    }

    /// Transport reported that `connection_id` is gone.
    ///
    /// Leaves the bound room, if any. Safe to call more than once.
    pub async fn disconnected(&self, connection_id: ConnectionId) {
        if let Some(binding) = self.sessions.unbind(connection_id).await {
            debug!(
                target: "room.dispatch",
                connection_id = %connection_id,
                room_id = %binding.room_id,
                user_id = %binding.user_id,
                "Connection lost, leaving room"
            );
            self.leave_quietly(binding).await;
        }
    }

    /// Record the new membership and leave whichever room the connection
    /// spoke for before.
    async fn bind(&self, connection_id: ConnectionId, joined: &Joined) {
        let binding = SessionBinding {
            room_id: joined.room.id,
            user_id: joined.user.id,
        };

        if let Some(previous) = self.sessions.bind(connection_id, binding).await {
            if previous != binding {
                self.leave_quietly(previous).await;
            }
        }
    }

    /// A kick that lands between the join and the bind finds no binding to
    /// clear, so membership is checked again once the binding exists.
    async fn drop_binding_if_removed(&self, room: &RoomActorHandle, joined: &Joined) {
        let still_member = room
            .snapshot()
            .await
            .is_ok_and(|snapshot| snapshot.is_member(&joined.user.id));
        if still_member {
            return;
        }

        if let Some(connection_id) = self
            .sessions
            .unbind_member(joined.room.id, joined.user.id)
            .await
        {
            debug!(
                target: "room.dispatch",
                connection_id = %connection_id,
                room_id = %joined.room.id,
                user_id = %joined.user.id,
                "Member removed before its binding was recorded"
            );
        }
    }

    async fn leave_quietly(&self, binding: SessionBinding) {
        let result = match self.registry.get_room(binding.room_id).await {
            Ok(room) => room.leave(binding.user_id).await,
            Err(e) => Err(e),
        };

        if let Err(e) = result {
            debug!(
                target: "room.dispatch",
                room_id = %binding.room_id,
                user_id = %binding.user_id,
                error = %e,
                "Implicit leave skipped"
            );
        }
    }

    async fn bound_to(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<SessionBinding, RoomError> {
        let binding = self
            .sessions
            .resolve(connection_id)
            .await
            .ok_or(RoomError::UnboundConnection)?;

        if binding.room_id != room_id {
            return Err(RoomError::Unauthorized(
                "connection is not a member of this room".to_string(),
            ));
        }

        Ok(binding)
    }

    async fn bound_room(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(SessionBinding, RoomActorHandle), RoomError> {
        let binding = self.bound_to(connection_id, room_id).await?;
        let room = self.registry.get_room(room_id).await?;
        Ok((binding, room))
    }
}

/// Check a submitted chat payload against the sender's binding.
fn chat_content(binding: &SessionBinding, message: ChatPayload) -> Result<String, RoomError> {
    if message.kind == MessageType::System {
        return Err(RoomError::InvalidRequest(
            "clients may only post user messages".to_string(),
        ));
    }

    match message.user_id.as_deref() {
        None | Some("") => {}
        Some(claimed) if claimed == binding.user_id.to_string() => {}
        Some(_) => {
            return Err(RoomError::Unauthorized(
                "message sender does not match connection".to_string(),
            ));
        }
    }

    Ok(message.content)
}
