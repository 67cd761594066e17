//! `RoomRegistryActor` - singleton supervisor for room actors.
//!
//! The registry is the only place rooms are created or looked up:
//!
//! - One per process, constructed at startup and passed to the dispatcher
//! - Supervises N `RoomActor` instances, each on a child cancellation token
//! - Forgets a room as soon as its actor reports it closed
//! - Detects room actor panics via `JoinHandle`
//!
//! # Graceful Shutdown
//!
//! On SIGTERM the registry:
//! 1. Sets `accepting_new = false`, so new rooms get `Draining`
//! 2. Cancels the root `CancellationToken` (propagates to all rooms)
//! 3. Waits for room tasks to finish, up to one overall deadline

use crate::config::Config;
use crate::errors::RoomError;
use crate::observability::metrics as prom;
use crate::room::{Joined, RoomLimits, RoomState};

use super::member::MemberSink;
use super::messages::{RegistryMessage, RegistryStatus};
use super::metrics::{ActorMetrics, ActorType, MailboxMonitor};
use super::room::{RoomActor, RoomActorHandle};

use common::types::RoomId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Default channel buffer size for the registry mailbox.
const REGISTRY_CHANNEL_BUFFER: usize = 1000;

/// Registry settings taken from the service configuration.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub instance_id: String,
    pub max_rooms: usize,
    pub room_limits: RoomLimits,
    /// Deadline used when the registry is cancelled rather than asked to shut down.
    pub shutdown_deadline: Duration,
}

impl From<&Config> for RegistryConfig {
    fn from(config: &Config) -> Self {
        Self {
            instance_id: config.instance_id.clone(),
            max_rooms: config.max_rooms,
            room_limits: config.room_limits,
            shutdown_deadline: config.shutdown_deadline,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            instance_id: "room-local".to_string(),
            max_rooms: crate::config::DEFAULT_MAX_ROOMS,
            room_limits: RoomLimits::default(),
            shutdown_deadline: Duration::from_secs(crate::config::DEFAULT_SHUTDOWN_DEADLINE_SECONDS),
        }
    }
}

/// Handle to the `RoomRegistryActor`.
///
/// This is the public interface for interacting with the registry.
/// All methods are async and return results via oneshot channels.
#[derive(Debug, Clone)]
pub struct RoomRegistryHandle {
    sender: mpsc::Sender<RegistryMessage>,
    cancel_token: CancellationToken,
}

impl RoomRegistryHandle {
    /// Create a new `RoomRegistryActor` and return a handle to it.
    ///
    /// This spawns the actor task and returns immediately.
    #[must_use]
    pub fn new(config: RegistryConfig, metrics: Arc<ActorMetrics>) -> Self {
        let (sender, receiver) = mpsc::channel(REGISTRY_CHANNEL_BUFFER);
        let cancel_token = CancellationToken::new();

        let actor = RoomRegistryActor::new(config, receiver, cancel_token.clone(), metrics);

        tokio::spawn(actor.run());

        Self {
            sender,
            cancel_token,
        }
    }

    /// Open a room with `username` as host.
    ///
    /// `host` receives the room's broadcasts from the first event on.
    pub async fn create_room(&self, username: String, host: MemberSink) -> Result<Joined, RoomError> {
        self.request(|respond_to| RegistryMessage::CreateRoom {
            username,
            host,
            respond_to,
        })
        .await?
    }

    /// Look up a live room.
    pub async fn get_room(&self, room_id: RoomId) -> Result<RoomActorHandle, RoomError> {
        self.request(|respond_to| RegistryMessage::GetRoom {
            room_id,
            respond_to,
        })
        .await?
    }

    /// Get the current registry status.
    pub async fn get_status(&self) -> Result<RegistryStatus, RoomError> {
        self.request(|respond_to| RegistryMessage::GetStatus { respond_to })
            .await
    }

    /// Stop accepting rooms and wait up to `deadline` for open rooms to close.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), RoomError> {
        self.request(|respond_to| RegistryMessage::Shutdown {
            deadline,
            respond_to,
        })
        .await?
    }

    /// Cancel the actor (for immediate shutdown).
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Check if the actor is cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a child token for tasks that should stop with the registry.
    #[must_use]
    pub fn child_token(&self) -> CancellationToken {
        self.cancel_token.child_token()
    }

    async fn request<T>(
        &self,
        message: impl FnOnce(oneshot::Sender<T>) -> RegistryMessage,
    ) -> Result<T, RoomError> {
        let (tx, rx) = oneshot::channel();
        self.sender.send(message(tx)).await.map_err(|_| {
            if self.cancel_token.is_cancelled() {
                RoomError::Draining
            } else {
                RoomError::Internal("registry channel closed".to_string())
            }
        })?;

        rx.await.map_err(|_| {
            if self.cancel_token.is_cancelled() {
                RoomError::Draining
            } else {
                RoomError::Internal("registry response dropped".to_string())
            }
        })
    }
}

/// Internal state for a managed room.
struct ManagedRoom {
    handle: RoomActorHandle,
    task_handle: JoinHandle<()>,
    /// Unix seconds.
    created_at: i64,
}

/// The `RoomRegistryActor` implementation.
pub struct RoomRegistryActor {
    config: RegistryConfig,
    receiver: mpsc::Receiver<RegistryMessage>,
    /// Cancellation token (root).
    cancel_token: CancellationToken,
    rooms: HashMap<RoomId, ManagedRoom>,
    accepting_new: bool,
    /// Close notices from room actors.
    closed_rx: mpsc::UnboundedReceiver<RoomId>,
    closed_tx: mpsc::UnboundedSender<RoomId>,
    metrics: Arc<ActorMetrics>,
    mailbox: MailboxMonitor,
}

impl RoomRegistryActor {
    fn new(
        config: RegistryConfig,
        receiver: mpsc::Receiver<RegistryMessage>,
        cancel_token: CancellationToken,
        metrics: Arc<ActorMetrics>,
    ) -> Self {
        let mailbox = MailboxMonitor::new(ActorType::Registry, &config.instance_id);
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();

        Self {
            config,
            receiver,
            cancel_token,
            rooms: HashMap::new(),
            accepting_new: true,
            closed_rx,
            closed_tx,
            metrics,
            mailbox,
        }
    }

    /// Run the actor message loop.
    #[instrument(skip_all, name = "room.actor.registry", fields(instance_id = %self.config.instance_id))]
    async fn run(mut self) {
        info!(
            target: "room.actor.registry",
            instance_id = %self.config.instance_id,
            max_rooms = self.config.max_rooms,
            "RoomRegistryActor started"
        );

        loop {
            // Check for terminated room actors
            self.check_room_health().await;

            tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!(
                        target: "room.actor.registry",
                        instance_id = %self.config.instance_id,
                        "RoomRegistryActor received cancellation signal"
                    );
                    let deadline = Instant::now() + self.config.shutdown_deadline;
                    self.graceful_shutdown(deadline).await;
                    break;
                }

                Some(room_id) = self.closed_rx.recv() => {
                    self.room_closed(room_id);
                }

                msg = self.receiver.recv() => {
                    match msg {
                        Some(message) => {
                            // The message just taken plus whatever is still queued
                            self.mailbox.record_depth(self.receiver.len() + 1);
                            self.handle_message(message).await;
                            self.mailbox.record_processed();
                            self.metrics.record_message_processed();
                        }
                        None => {
                            info!(
                                target: "room.actor.registry",
                                instance_id = %self.config.instance_id,
                                "RoomRegistryActor channel closed, exiting"
                            );
                            break;
                        }
                    }
                }
            }
        }

        info!(
            target: "room.actor.registry",
            instance_id = %self.config.instance_id,
            rooms_remaining = self.rooms.len(),
            messages_processed = self.mailbox.messages_processed(),
            "RoomRegistryActor stopped"
        );
    }

    async fn handle_message(&mut self, message: RegistryMessage) {
        // A room closes before it answers its last caller, so any notice
        // already queued must be applied before this request is answered
        self.reap_closed();

        match message {
            RegistryMessage::CreateRoom {
                username,
                host,
                respond_to,
            } => {
                let result = self.create_room(&username, host);
                let _ = respond_to.send(result);
            }

            RegistryMessage::GetRoom {
                room_id,
                respond_to,
            } => {
                let _ = respond_to.send(self.get_room(room_id));
            }

            RegistryMessage::GetStatus { respond_to } => {
                let _ = respond_to.send(self.get_status());
            }

            RegistryMessage::Shutdown {
                deadline,
                respond_to,
            } => {
                info!(
                    target: "room.actor.registry",
                    instance_id = %self.config.instance_id,
                    room_count = self.rooms.len(),
                    deadline_secs = deadline.as_secs(),
                    "Initiating graceful shutdown"
                );

                // Cancel the root token (propagates to all rooms); the run
                // loop exits on its next iteration
                self.cancel_token.cancel();
                self.graceful_shutdown(Instant::now() + deadline).await;
                let _ = respond_to.send(Ok(()));
            }
        }
    }

    fn reap_closed(&mut self) {
        while let Ok(room_id) = self.closed_rx.try_recv() {
            self.room_closed(room_id);
        }
    }

    fn create_room(&mut self, username: &str, host: MemberSink) -> Result<Joined, RoomError> {
        if !self.accepting_new {
            return Err(RoomError::Draining);
        }

        if self.rooms.len() >= self.config.max_rooms {
            warn!(
                target: "room.actor.registry",
                instance_id = %self.config.instance_id,
                max_rooms = self.config.max_rooms,
                "Room limit reached, refusing new room"
            );
            return Err(RoomError::CapacityExceeded(
                "server room limit reached".to_string(),
            ));
        }

        let mut room_id = RoomId::new();
        while self.rooms.contains_key(&room_id) {
            room_id = RoomId::new();
        }

        let state = RoomState::create(room_id, username, self.config.room_limits)?;
        let host_user = state.room().users.first().cloned().ok_or_else(|| {
            RoomError::Internal("new room has no host".to_string())
        })?;
        let room = state.room().clone();

        let (handle, task_handle) = RoomActor::spawn(
            state,
            host,
            self.cancel_token.child_token(),
            Arc::clone(&self.metrics),
            self.closed_tx.clone(),
        );

        self.rooms.insert(
            room_id,
            ManagedRoom {
                handle,
                task_handle,
                created_at: chrono::Utc::now().timestamp(),
            },
        );

        self.metrics.room_created();
        prom::set_rooms_active(self.rooms.len());

        info!(
            target: "room.actor.registry",
            instance_id = %self.config.instance_id,
            room_id = %room_id,
            host_id = %host_user.id,
            total_rooms = self.rooms.len(),
            "Room created"
        );

        Ok(Joined {
            user: host_user,
            room,
        })
    }

    fn get_room(&self, room_id: RoomId) -> Result<RoomActorHandle, RoomError> {
        match self.rooms.get(&room_id) {
            Some(managed) if !managed.task_handle.is_finished() && !managed.handle.is_closed() => {
                Ok(managed.handle.clone())
            }
            _ => Err(RoomError::RoomNotFound),
        }
    }

    fn get_status(&self) -> RegistryStatus {
        RegistryStatus {
            room_count: self.rooms.len(),
            member_count: self.metrics.member_count(),
            connection_count: self.metrics.connection_count(),
            is_draining: !self.accepting_new,
            mailbox_depth: self.mailbox.current_depth(),
        }
    }

    /// Forget a room whose actor stopped because its last member left.
    fn room_closed(&mut self, room_id: RoomId) {
        let Some(managed) = self.rooms.remove(&room_id) else {
            return;
        };

        self.metrics.room_closed();
        prom::set_rooms_active(self.rooms.len());

        info!(
            target: "room.actor.registry",
            instance_id = %self.config.instance_id,
            room_id = %room_id,
            lifetime_secs = chrono::Utc::now().timestamp() - managed.created_at,
            total_rooms = self.rooms.len(),
            "Room closed"
        );
    }

    /// Wait for every room task to finish, up to `deadline`.
    async fn graceful_shutdown(&mut self, deadline: Instant) {
        self.accepting_new = false;

        if self.rooms.is_empty() {
            return;
        }

        info!(
            target: "room.actor.registry",
            instance_id = %self.config.instance_id,
            room_count = self.rooms.len(),
            "Performing graceful shutdown"
        );

        for managed in self.rooms.values() {
            managed.handle.cancel();
        }

        let mut timed_out = 0usize;
        for (room_id, managed) in self.rooms.drain() {
            match tokio::time::timeout_at(deadline, managed.task_handle).await {
                Ok(Ok(())) => {
                    debug!(
                        target: "room.actor.registry",
                        room_id = %room_id,
                        "Room actor completed cleanly"
                    );
                }
                Ok(Err(e)) => {
                    warn!(
                        target: "room.actor.registry",
                        room_id = %room_id,
                        error = ?e,
                        "Room actor task panicked during shutdown"
                    );
                }
                Err(_) => {
                    timed_out += 1;
                }
            }
            self.metrics.room_closed();
        }
        prom::set_rooms_active(0);

        if timed_out > 0 {
            warn!(
                target: "room.actor.registry",
                instance_id = %self.config.instance_id,
                timed_out,
                "Room actors did not stop before the shutdown deadline"
            );
        }

        info!(
            target: "room.actor.registry",
            instance_id = %self.config.instance_id,
            "Graceful shutdown complete"
        );
    }

    /// Prune room actors whose tasks have ended, recording panics.
    async fn check_room_health(&mut self) {
        let finished: Vec<RoomId> = self
            .rooms
            .iter()
            .filter(|(_, managed)| managed.task_handle.is_finished())
            .map(|(room_id, _)| *room_id)
            .collect();

        for room_id in finished {
            let Some(managed) = self.rooms.remove(&room_id) else {
                continue;
            };

            match managed.task_handle.await {
                Ok(()) => {
                    debug!(
                        target: "room.actor.registry",
                        room_id = %room_id,
                        "Room actor exited cleanly"
                    );
                }
                Err(join_error) => {
                    if join_error.is_panic() {
                        error!(
                            target: "room.actor.registry",
                            instance_id = %self.config.instance_id,
                            room_id = %room_id,
                            error = ?join_error,
                            "Room actor panicked - room state lost"
                        );
                        self.metrics.record_panic(ActorType::Room);
                        prom::record_actor_panic(ActorType::Room.as_str());
                    }
                }
            }

            self.metrics.room_closed();
            prom::set_rooms_active(self.rooms.len());
        }
    }
}
