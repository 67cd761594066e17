//! Connection-to-membership bindings.
//!
//! A connection is bound to at most one `(room, user)` pair at a time. The
//! binding is the server's record of who a connection speaks for; in-room
//! requests from a connection are checked against it rather than trusting
//! identifiers in the payload.

use common::types::{ConnectionId, RoomId, UserId};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// The room membership a connection speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionBinding {
    pub room_id: RoomId,
    pub user_id: UserId,
}

/// Both directions of the binding map, kept in step under one lock.
#[derive(Debug, Default)]
struct Bindings {
    by_connection: HashMap<ConnectionId, SessionBinding>,
    /// Reverse index for kicks. A user id belongs to one membership, so at
    /// most one connection speaks for it.
    by_member: HashMap<SessionBinding, ConnectionId>,
}

impl Bindings {
    fn insert(&mut self, connection: ConnectionId, binding: SessionBinding) -> Option<SessionBinding> {
        let previous = self.by_connection.insert(connection, binding);
        if let Some(previous) = previous {
            self.by_member.remove(&previous);
        }

        if let Some(stale) = self.by_member.insert(binding, connection) {
            if stale != connection {
                self.by_connection.remove(&stale);
            }
        }

        previous
    }

    fn remove(&mut self, connection: ConnectionId) -> Option<SessionBinding> {
        let binding = self.by_connection.remove(&connection)?;
        self.by_member.remove(&binding);
        Some(binding)
    }
}

/// Table of live bindings, shared by every connection task.
#[derive(Debug, Default)]
pub struct SessionTable {
    bindings: RwLock<Bindings>,
}

impl SessionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `connection`, returning the binding it replaced.
    pub async fn bind(
        &self,
        connection: ConnectionId,
        binding: SessionBinding,
    ) -> Option<SessionBinding> {
        let previous = self.bindings.write().await.insert(connection, binding);

        debug!(
            target: "room.session",
            connection_id = %connection,
            room_id = %binding.room_id,
            user_id = %binding.user_id,
            rebound = previous.is_some(),
            "Connection bound"
        );

        previous
    }

    /// Remove and return the binding for `connection`.
    pub async fn unbind(&self, connection: ConnectionId) -> Option<SessionBinding> {
        let removed = self.bindings.write().await.remove(connection);

        if let Some(binding) = &removed {
            debug!(
                target: "room.session",
                connection_id = %connection,
                room_id = %binding.room_id,
                user_id = %binding.user_id,
                "Connection unbound"
            );
        }

        removed
    }

    pub async fn resolve(&self, connection: ConnectionId) -> Option<SessionBinding> {
        self.bindings.read().await.by_connection.get(&connection).copied()
    }

    /// Unbind whichever connection speaks for `user_id` in `room_id`.
    ///
    /// Used when a member is removed by someone else.
    pub async fn unbind_member(&self, room_id: RoomId, user_id: UserId) -> Option<ConnectionId> {
        let target = SessionBinding { room_id, user_id };
        let mut bindings = self.bindings.write().await;

        let connection = bindings.by_member.get(&target).copied()?;
        bindings.remove(connection);

        debug!(
            target: "room.session",
            connection_id = %connection,
            room_id = %room_id,
            user_id = %user_id,
            "Member connection unbound"
        );

        Some(connection)
    }

    /// Number of bound connections.
    pub async fn len(&self) -> usize {
        self.bindings.read().await.by_connection.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bindings.read().await.by_connection.is_empty()
    }
}
