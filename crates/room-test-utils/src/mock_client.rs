//! In-process service harness and client connections.
//!
//! `TestService` runs the real registry and dispatcher without a socket.
//! Each `MockConnection` owns the receiving end of an outbound queue, the
//! same queue a WebSocket writer would drain.

use common::types::{ConnectionId, RoomId, UserId};
use room_service::actors::{ActorMetrics, MemberSink, RegistryConfig, RoomRegistryHandle};
use room_service::dispatch::{Dispatcher, Response};
use room_service::errors::RoomError;
use room_service::protocol::{ClientRequest, ServerFrame};
use room_service::room::ServerEvent;
use room_service::session::SessionTable;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Outbound queue capacity for mock connections.
pub const MOCK_OUTBOUND_BUFFER: usize = 64;

/// How long `next_event` waits before failing the test.
const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// A running registry plus dispatcher.
///
/// The registry is cancelled when the harness is dropped.
#[derive(Debug)]
pub struct TestService {
    dispatcher: Dispatcher,
    metrics: Arc<ActorMetrics>,
}

impl Default for TestService {
    fn default() -> Self {
        Self::new()
    }
}

impl TestService {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    #[must_use]
    pub fn with_config(config: RegistryConfig) -> Self {
        let metrics = ActorMetrics::new();
        let registry = RoomRegistryHandle::new(config, Arc::clone(&metrics));
        let dispatcher = Dispatcher::new(registry, Arc::new(SessionTable::new()));
        Self {
            dispatcher,
            metrics,
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    #[must_use]
    pub fn registry(&self) -> &RoomRegistryHandle {
        self.dispatcher.registry()
    }

    #[must_use]
    pub fn metrics(&self) -> &Arc<ActorMetrics> {
        &self.metrics
    }

    /// Open a connection with the default queue size.
    #[must_use]
    pub fn connect(&self) -> MockConnection {
        self.connect_with_buffer(MOCK_OUTBOUND_BUFFER)
    }

    /// Open a connection whose outbound queue holds `buffer` frames.
    #[must_use]
    pub fn connect_with_buffer(&self, buffer: usize) -> MockConnection {
        let (tx, rx) = mpsc::channel(buffer);
        MockConnection {
            sink: MemberSink::new(ConnectionId::new(), tx),
            rx,
            dispatcher: self.dispatcher.clone(),
        }
    }
}

impl Drop for TestService {
    fn drop(&mut self) {
        self.dispatcher.registry().cancel();
    }
}

/// A client connection driven directly through the dispatcher.
#[derive(Debug)]
pub struct MockConnection {
    sink: MemberSink,
    rx: mpsc::Receiver<ServerFrame>,
    dispatcher: Dispatcher,
}

impl MockConnection {
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.sink.connection_id()
    }

    /// Send one request and return the dispatcher's result.
    pub async fn request(&self, request: ClientRequest) -> Result<Response, RoomError> {
        self.dispatcher.handle(&self.sink, request).await
    }

    /// Create a room, panicking on failure.
    pub async fn create_room(&self, username: &str) -> (RoomId, UserId) {
        let response = self
            .request(crate::fixtures::create_room(username))
            .await
            .expect("create_room failed");
        let room = response.room.expect("create_room returned no room");
        let user_id = response.user_id.expect("create_room returned no user id");
        (room.id, user_id)
    }

    /// Join a room, panicking on failure.
    pub async fn join_room(&self, room_id: RoomId, username: &str) -> UserId {
        self.request(crate::fixtures::join_room(room_id, username))
            .await
            .expect("join_room failed")
            .user_id
            .expect("join_room returned no user id")
    }

    /// Everything queued so far, events only.
    pub fn drain_events(&mut self) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let ServerFrame::Event(event) = frame {
                events.push(event);
            }
        }
        events
    }

    /// Names of everything queued so far, in order.
    pub fn drain_event_names(&mut self) -> Vec<&'static str> {
        self.drain_events().iter().map(ServerEvent::name).collect()
    }

    /// Wait for the next event, panicking after a short timeout.
    pub async fn next_event(&mut self) -> ServerEvent {
        self.next_event_within(EVENT_TIMEOUT)
            .await
            .expect("timed out waiting for an event")
    }

    /// Next event if one arrives within `window`, skipping replies.
    ///
    /// Under a paused clock the window elapses as soon as the runtime is
    /// otherwise idle, so asserting `None` is cheap.
    pub async fn next_event_within(&mut self, window: Duration) -> Option<ServerEvent> {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.rx.recv())
                .await
                .ok()?
                .expect("outbound queue closed");
            if let ServerFrame::Event(event) = frame {
                return Some(event);
            }
        }
    }

    /// Report the transport as gone, as the WebSocket layer does on close.
    pub async fn disconnect(&self) {
        self.dispatcher.disconnected(self.connection_id()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connections_are_distinct() {
        let service = TestService::new();
        let a = service.connect();
        let b = service.connect();

        assert_ne!(a.connection_id(), b.connection_id());
    }

    #[tokio::test]
    async fn test_create_room_queues_nothing_for_creator() {
        let service = TestService::new();
        let mut alice = service.connect();

        let (room_id, _) = alice.create_room("Alice").await;

        assert!(alice.drain_events().is_empty());
        assert!(service.dispatcher().room_info(room_id).await.is_some());
    }
}
