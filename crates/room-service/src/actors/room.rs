//! `RoomActor` - per-room actor that owns one room's state.
//!
//! Each `RoomActor`:
//! - Owns the [`RoomState`] for one room and applies commands one at a time,
//!   in arrival order
//! - Holds a [`MemberSink`] per member and delivers the events each
//!   transition produces, in order, before replying
//! - Stops as soon as its last member leaves; later requests see
//!   `RoomNotFound`
//!
//! Broadcasts are fire-and-forget. A member whose outbound buffer is full
//! misses that event and has to re-fetch the room.

use crate::errors::RoomError;
use crate::observability::metrics as prom;
use crate::room::{
    Command, Joined, LeaveOutcome, Message, Outbound, Outcome, Room, RoomState, Transition,
    VideoState,
};

use super::member::{Delivery, MemberSink};
use super::messages::RoomMessage;
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};

use common::types::{RoomId, UserId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Default channel buffer size for the room mailbox.
const ROOM_CHANNEL_BUFFER: usize = 500;

/// Handle to a `RoomActor`.
///
/// A closed room answers every request with `RoomNotFound`.
#[derive(Debug, Clone)]
pub struct RoomActorHandle {
    sender: mpsc::Sender<RoomMessage>,
    cancel_token: CancellationToken,
    room_id: RoomId,
}

impl RoomActorHandle {
    #[must_use]
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Join the room; `sink` starts receiving broadcasts immediately.
    pub async fn join(&self, username: String, sink: MemberSink) -> Result<Joined, RoomError> {
        self.request(|respond_to| RoomMessage::Join {
            username,
            sink,
            respond_to,
        })
        .await?
    }

    /// Remove a member. Removing an absent member is a no-op.
    pub async fn leave(&self, user_id: UserId) -> Result<LeaveOutcome, RoomError> {
        match self.apply(Command::Leave { user_id }).await? {
            Outcome::Left(outcome) => Ok(outcome),
            other => Err(unexpected(&other)),
        }
    }

    /// Host-only: remove `target` and notify its connection.
    pub async fn kick(&self, requester: UserId, target: UserId) -> Result<LeaveOutcome, RoomError> {
        match self.apply(Command::Kick { requester, target }).await? {
            Outcome::Left(outcome) => Ok(outcome),
            other => Err(unexpected(&other)),
        }
    }

    /// Host-only: set playback state.
    pub async fn set_video_state(
        &self,
        requester: UserId,
        state: VideoState,
    ) -> Result<(), RoomError> {
        self.apply(Command::SetVideoState { requester, state })
            .await
            .map(drop)
    }

    /// Host-only: load a new video.
    pub async fn set_video_url(&self, requester: UserId, url: String) -> Result<(), RoomError> {
        self.apply(Command::SetVideoUrl { requester, url })
            .await
            .map(drop)
    }

    /// Relay a chat message from `sender`.
    pub async fn post_message(&self, sender: UserId, content: String) -> Result<Message, RoomError> {
        match self.apply(Command::PostMessage { sender, content }).await? {
            Outcome::Posted(message) => Ok(message),
            other => Err(unexpected(&other)),
        }
    }

    /// Record a member's own playback position.
    pub async fn update_user_time(
        &self,
        user_id: UserId,
        current_time: f64,
    ) -> Result<(), RoomError> {
        self.apply(Command::UpdateUserTime {
            user_id,
            current_time,
        })
        .await
        .map(drop)
    }

    /// Current room snapshot.
    pub async fn snapshot(&self) -> Result<Room, RoomError> {
        self.request(|respond_to| RoomMessage::GetRoom { respond_to })
            .await
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Whether the actor has stopped taking requests.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn apply(&self, command: Command) -> Result<Outcome, RoomError> {
        self.request(|respond_to| RoomMessage::Apply {
            command,
            respond_to,
        })
        .await?
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> RoomMessage,
    ) -> Result<T, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(message(tx))
            .await
            .map_err(|_| RoomError::RoomNotFound)?;

        // The actor drops queued requests when the room closes
        rx.await.map_err(|_| RoomError::RoomNotFound)
    }
}

fn unexpected(outcome: &Outcome) -> RoomError {
    RoomError::Internal(format!("unexpected room outcome: {outcome:?}"))
}

/// The `RoomActor` implementation.
pub struct RoomActor {
    room_id: RoomId,
    receiver: mpsc::Receiver<RoomMessage>,
    cancel_token: CancellationToken,
    state: RoomState,
    /// Outbound sinks by member.
    members: HashMap<UserId, MemberSink>,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
    /// Tells the registry this room is gone.
    closed_tx: mpsc::UnboundedSender<RoomId>,
    closed: bool,
}

impl RoomActor {
    /// Spawn a room actor for a freshly created room.
    ///
    /// `host` is the sink of the room's only member.
    ///
    /// Returns a handle and the task join handle.
    pub fn spawn(
        state: RoomState,
        host: MemberSink,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
        closed_tx: mpsc::UnboundedSender<RoomId>,
    ) -> (RoomActorHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(ROOM_CHANNEL_BUFFER);
        let room_id = state.id();

        let mut members = HashMap::new();
        members.insert(state.room().host_id, host);
        metrics.member_joined();

        let actor = Self {
            room_id,
            receiver,
            cancel_token: cancel_token.clone(),
            state,
            members,
            metrics,
            mailbox: MailboxMonitor::new(ActorType::Room, room_id.to_string()),
            closed_tx,
            closed: false,
        };

        let task_handle = tokio::spawn(actor.run());

        let handle = RoomActorHandle {
            sender,
            cancel_token,
            room_id,
        };

        (handle, task_handle)
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "room.actor.room", fields(room_id = %self.room_id))]
    async fn run(mut self) {
        info!(
            target: "room.actor.room",
            room_id = %self.room_id,
            "RoomActor started"
        );

        loop {
            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "room.actor.room",
                        room_id = %self.room_id,
                        members = self.members.len(),
                        "RoomActor received cancellation signal"
                    );
                    break;
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            // The message just taken plus whatever is still queued
                            self.mailbox.record_depth(self.receiver.len() + 1);
                            self.handle_message(message);
                            self.mailbox.record_processed();
                            self.metrics.record_message_processed();

                            if self.state.is_empty() {
                                info!(
                                    target: "room.actor.room",
                                    room_id = %self.room_id,
                                    "Last member left, closing room"
                                );
                                break;
                            }
                        }
                        None => {
                            info!(
                                target: "room.actor.room",
                                room_id = %self.room_id,
                                "RoomActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        self.close();
        self.metrics.members_left(self.members.len());
        prom::set_members_active(self.metrics.member_count());

        info!(
            target: "room.actor.room",
            room_id = %self.room_id,
            messages_processed = self.mailbox.messages_processed(),
            peak_mailbox_depth = self.mailbox.peak_depth(),
            "RoomActor stopped"
        );
    }

    fn handle_message(&mut self, message: RoomMessage) {
        match message {
            RoomMessage::Join {
                username,
                sink,
                respond_to,
            } => {
                let result = self.state.join(&username).map(|transition| {
                    self.members.insert(transition.value.user.id, sink);
                    self.metrics.member_joined();
                    prom::set_members_active(self.metrics.member_count());
                    self.finish(transition)
                });

                match &result {
                    Ok(joined) => debug!(
                        target: "room.actor.room",
                        room_id = %self.room_id,
                        user_id = %joined.user.id,
                        members = joined.room.users.len(),
                        "Member joined"
                    ),
                    Err(e) => debug!(
                        target: "room.actor.room",
                        room_id = %self.room_id,
                        error = %e,
                        "Join rejected"
                    ),
                }

                let _ = respond_to.send(result);
            }

            RoomMessage::Apply {
                command,
                respond_to,
            } => {
                let operation = command.name();
                let host_before = self.state.room().host_id;

                let result = self
                    .state
                    .apply(command)
                    .map(|transition| self.finish(transition));

                if let Err(e) = &result {
                    debug!(
                        target: "room.actor.room",
                        room_id = %self.room_id,
                        operation,
                        error = %e,
                        "Command rejected"
                    );
                }

                // The registry must hear about a deleted room before the
                // caller does, so the room never outlives its last reply
                if self.state.is_empty() {
                    self.close();
                }

                let host_after = self.state.room().host_id;
                if host_after != host_before && !self.state.is_empty() {
                    info!(
                        target: "room.actor.room",
                        room_id = %self.room_id,
                        previous_host = %host_before,
                        new_host = %host_after,
                        "Host authority migrated"
                    );
                    prom::record_host_migration();
                }

                let _ = respond_to.send(result);
            }

            RoomMessage::GetRoom { respond_to } => {
                let _ = respond_to.send(self.state.room().clone());
            }
        }
    }

    /// Stop taking requests and notify the registry. Idempotent.
    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.receiver.close();
        let _ = self.closed_tx.send(self.room_id);
    }

    /// Deliver a transition's events, then release the departed member's sink.
    fn finish<T>(&mut self, transition: Transition<T>) -> T {
        self.dispatch(&transition.outbound);

        if let Some(departed) = transition.departed {
            if self.members.remove(&departed).is_some() {
                self.metrics.members_left(1);
                prom::set_members_active(self.metrics.member_count());
            }
        }

        transition.value
    }

    fn dispatch(&self, outbound: &[Outbound]) {
        let members = self.state.member_ids();

        for out in outbound {
            for user_id in out.recipients(&members) {
                let Some(sink) = self.members.get(&user_id) else {
                    continue;
                };

                match sink.deliver(out.event.clone()) {
                    Delivery::Queued => {}
                    Delivery::Dropped => {
                        self.metrics.record_broadcast_dropped();
                        prom::record_broadcast_dropped(out.event.name());
                        warn!(
                            target: "room.actor.room",
                            room_id = %self.room_id,
                            user_id = %user_id,
                            connection_id = %sink.connection_id(),
                            event = out.event.name(),
                            "Outbound buffer full, broadcast dropped"
                        );
                    }
                    Delivery::Closed => {
                        debug!(
                            target: "room.actor.room",
                            room_id = %self.room_id,
                            user_id = %user_id,
                            event = out.event.name(),
                            "Member connection closed, skipping broadcast"
                        );
                    }
                }
            }
        }
    }
}
