//! Outbound handle to one member's connection.

use crate::protocol::{Reply, ServerFrame};
use crate::room::ServerEvent;
use common::types::ConnectionId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// What happened to a broadcast handed to a [`MemberSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the connection's writer.
    Queued,
    /// The connection's buffer was full; this broadcast is lost for it.
    Dropped,
    /// The connection is gone.
    Closed,
}

/// Sending half of a connection's outbound frame queue.
///
/// Room actors never wait on a member: delivery is a `try_send`, and a full
/// queue means the member misses that broadcast.
#[derive(Debug, Clone)]
pub struct MemberSink {
    connection_id: ConnectionId,
    sender: mpsc::Sender<ServerFrame>,
}

impl MemberSink {
    #[must_use]
    pub fn new(connection_id: ConnectionId, sender: mpsc::Sender<ServerFrame>) -> Self {
        Self {
            connection_id,
            sender,
        }
    }

    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Queue an event without waiting.
    pub fn deliver(&self, event: ServerEvent) -> Delivery {
        match self.sender.try_send(ServerFrame::Event(event)) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Dropped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Queue the reply to one of this connection's own requests.
    ///
    /// Unlike broadcasts, replies wait for buffer space. Returns `false` if
    /// the connection is gone.
    pub async fn reply(&self, reply: Reply) -> bool {
        self.sender.send(ServerFrame::Reply(reply)).await.is_ok()
    }
}
