//! Membership: create, join, leave, kick and host migration.
//!
//! Host authority always sits with exactly one member. When the host is
//! removed it passes to the earliest-joined remaining member, i.e. the
//! first entry of the user list after removal.

use super::events::{Outbound, ServerEvent};
use super::model::{Message, Room, User};
use super::relay::Relay;
use super::{validated_text, RoomLimits, RoomState, Transition};
use crate::errors::RoomError;
use common::types::{RoomId, UserId};

/// A successful join.
#[derive(Debug, Clone, PartialEq)]
pub struct Joined {
    /// The newly created member.
    pub user: User,
    /// Room after the join.
    pub room: Room,
}

/// Result of removing a member.
#[derive(Debug, Clone, PartialEq)]
pub enum LeaveOutcome {
    /// Member removed; room continues with the remaining members.
    Left(Room),
    /// Member was not in the room; nothing changed.
    AlreadyAbsent(Room),
    /// Last member removed; the room no longer exists.
    RoomDeleted,
}

impl RoomState {
    /// Open a new room with `username` as its host.
    pub fn create(room_id: RoomId, username: &str, limits: RoomLimits) -> Result<Self, RoomError> {
        let username = validated_text(username, "username", limits.max_username_chars)?;
        let host = User::new(username, true);

        Ok(Self {
            room: Room {
                id: room_id,
                host_id: host.id,
                users: vec![host],
                video_url: String::new(),
                is_playing: false,
                current_time: 0.0,
                duration: None,
            },
            relay: Relay::new(),
            limits,
        })
    }

    /// Add a non-host member.
    pub fn join(&mut self, username: &str) -> Result<Transition<Joined>, RoomError> {
        let username = validated_text(username, "username", self.limits.max_username_chars)?;

        let folded = username.to_lowercase();
        if self
            .room
            .users
            .iter()
            .any(|user| user.username.to_lowercase() == folded)
        {
            return Err(RoomError::DuplicateUsername);
        }

        if self.room.users.len() >= self.limits.max_members {
            return Err(RoomError::CapacityExceeded("room is full".to_string()));
        }

        let user = User::new(username, false);
        self.room.users.push(user.clone());

        let notice = self.relay.joined(&user.username);
        let room = self.room.clone();

        Ok(Transition::new(Joined {
            user,
            room: room.clone(),
        })
        .emit(Outbound::everyone(ServerEvent::UserJoined(room)))
        .emit(Outbound::everyone(ServerEvent::MessageReceived(notice))))
    }

    /// Remove a member. Leaving twice is a no-op.
    pub fn leave(&mut self, user_id: &UserId) -> Transition<LeaveOutcome> {
        let Some(removed) = self.remove_member(user_id) else {
            return Transition::new(LeaveOutcome::AlreadyAbsent(self.room.clone()));
        };

        let notice = self.relay.left(&removed.username);
        self.after_removal(removed, notice, Vec::new())
    }

    /// Remove `target` on the host's behalf and tell their connection.
    ///
    /// The requester's authority is checked by [`RoomState::apply`].
    pub fn kick(
        &mut self,
        requester: &UserId,
        target: &UserId,
    ) -> Result<Transition<LeaveOutcome>, RoomError> {
        if requester == target {
            return Err(RoomError::InvalidRequest(
                "use leave_room to leave the room".to_string(),
            ));
        }

        let removed = self.remove_member(target).ok_or(RoomError::UserNotFound)?;
        let notice = self.relay.kicked(&removed.username);

        Ok(self.after_removal(
            removed,
            notice,
            vec![Outbound::only(*target, ServerEvent::Kicked)],
        ))
    }

    /// Drop a member from the user list, migrating host authority if needed.
    fn remove_member(&mut self, user_id: &UserId) -> Option<User> {
        let index = self.room.users.iter().position(|user| user.id == *user_id)?;
        let removed = self.room.users.remove(index);

        if removed.is_host {
            if let Some(successor) = self.room.users.first_mut() {
                successor.is_host = true;
                self.room.host_id = successor.id;
            }
        }

        Some(removed)
    }

    fn after_removal(
        &self,
        removed: User,
        notice: Message,
        leading: Vec<Outbound>,
    ) -> Transition<LeaveOutcome> {
        let mut transition = if self.room.users.is_empty() {
            Transition::new(LeaveOutcome::RoomDeleted)
        } else {
            let room = self.room.clone();
            Transition::new(LeaveOutcome::Left(room.clone()))
                .emit(Outbound::everyone(ServerEvent::UserLeft(room)))
                .emit(Outbound::everyone(ServerEvent::MessageReceived(notice)))
        };

        transition.outbound.splice(0..0, leading);
        transition.departed = Some(removed.id);
        transition
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::room::{Audience, Command, Outcome};

    fn room_with(names: &[&str]) -> (RoomState, Vec<UserId>) {
        let (first, rest) = names.split_first().unwrap();
        let mut state = RoomState::create(RoomId::new(), first, RoomLimits::default()).unwrap();
        let mut ids = vec![state.room().host_id];
        for name in rest {
            ids.push(state.join(name).unwrap().value.user.id);
        }
        (state, ids)
    }

    fn assert_single_host(room: &Room) {
        let hosts: Vec<_> = room.users.iter().filter(|user| user.is_host).collect();
        assert_eq!(hosts.len(), 1, "exactly one host expected");
        assert_eq!(hosts.first().unwrap().id, room.host_id);
    }

    #[test]
    fn test_create_room_defaults() {
        let state = RoomState::create(RoomId::new(), "  Alice ", RoomLimits::default()).unwrap();
        let room = state.room();

        assert_eq!(room.users.len(), 1);
        assert_eq!(room.users.first().unwrap().username, "Alice");
        assert_eq!(room.video_url, "");
        assert!(!room.is_playing);
        assert!(room.current_time.abs() < f64::EPSILON);
        assert_single_host(room);
    }

    #[test]
    fn test_create_rejects_blank_username() {
        let result = RoomState::create(RoomId::new(), "   ", RoomLimits::default());
        assert!(matches!(result, Err(RoomError::InvalidRequest(_))));
    }

    #[test]
    fn test_join_appends_non_host_and_narrates() {
        let (mut state, ids) = room_with(&["Alice"]);

        let transition = state.join("Bob").unwrap();
        let room = &transition.value.room;

        assert_eq!(room.users.len(), 2);
        assert_eq!(room.users.get(1).unwrap().username, "Bob");
        assert!(!transition.value.user.is_host);
        assert_eq!(room.host_id, *ids.first().unwrap());
        assert_single_host(room);

        assert_eq!(transition.outbound.len(), 2);
        let first = transition.outbound.first().unwrap();
        assert_eq!(first.audience, Audience::Everyone);
        assert!(matches!(first.event, ServerEvent::UserJoined(_)));
        match &transition.outbound.get(1).unwrap().event {
            ServerEvent::MessageReceived(message) => {
                assert_eq!(message.content, "Bob joined the room");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_join_rejects_duplicate_case_insensitive() {
        let (mut state, _) = room_with(&["Alice"]);
        let before = state.room().clone();

        let result = state.join("alice");

        assert!(matches!(result, Err(RoomError::DuplicateUsername)));
        assert_eq!(state.room(), &before);
    }

    #[test]
    fn test_join_rejects_when_full() {
        let limits = RoomLimits {
            max_members: 2,
            ..RoomLimits::default()
        };
        let mut state = RoomState::create(RoomId::new(), "Alice", limits).unwrap();
        state.join("Bob").unwrap();

        assert!(matches!(
            state.join("Carol"),
            Err(RoomError::CapacityExceeded(_))
        ));
    }

    #[test]
    fn test_host_leaving_migrates_to_earliest_member() {
        let (mut state, ids) = room_with(&["Alice", "Bob", "Carol"]);
        let (alice, bob) = (ids[0], ids[1]);

        let transition = state.leave(&alice);

        let LeaveOutcome::Left(room) = &transition.value else {
            panic!("room should survive");
        };
        assert_eq!(room.host_id, bob);
        assert!(room.user(&bob).unwrap().is_host);
        assert_single_host(room);
        assert_eq!(transition.departed, Some(alice));
    }

    #[test]
    fn test_member_leaving_keeps_host() {
        let (mut state, ids) = room_with(&["Alice", "Bob", "Carol"]);

        state.leave(&ids[1]);

        assert_eq!(state.room().host_id, ids[0]);
        assert_eq!(state.room().users.len(), 2);
        assert_single_host(state.room());
    }

    #[test]
    fn test_leave_twice_is_noop() {
        let (mut state, ids) = room_with(&["Alice", "Bob"]);
        let bob = ids[1];

        state.leave(&bob);
        let after_first = state.room().clone();
        let second = state.leave(&bob);

        assert!(matches!(second.value, LeaveOutcome::AlreadyAbsent(_)));
        assert!(second.outbound.is_empty());
        assert_eq!(second.departed, None);
        assert_eq!(state.room(), &after_first);
    }

    #[test]
    fn test_last_member_leaving_deletes_room() {
        let (mut state, ids) = room_with(&["Alice"]);

        let transition = state.leave(&ids[0]);

        assert_eq!(transition.value, LeaveOutcome::RoomDeleted);
        assert!(transition.outbound.is_empty());
        assert!(state.is_empty());
    }

    #[test]
    fn test_kick_notifies_target_first() {
        let (mut state, ids) = room_with(&["Alice", "Bob"]);
        let (alice, bob) = (ids[0], ids[1]);

        let transition = state
            .apply(Command::Kick {
                requester: alice,
                target: bob,
            })
            .unwrap();

        assert!(matches!(transition.value, Outcome::Left(LeaveOutcome::Left(_))));
        let first = transition.outbound.first().unwrap();
        assert_eq!(first.audience, Audience::Only(bob));
        assert_eq!(first.event, ServerEvent::Kicked);
        match &transition.outbound.last().unwrap().event {
            ServerEvent::MessageReceived(message) => {
                assert_eq!(message.content, "Bob was kicked from the room");
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(!state.room().is_member(&bob));
    }

    #[test]
    fn test_kick_by_non_host_is_unauthorized() {
        let (mut state, ids) = room_with(&["Alice", "Bob"]);
        let (alice, bob) = (ids[0], ids[1]);
        let before = state.room().clone();

        let result = state.apply(Command::Kick {
            requester: bob,
            target: alice,
        });

        assert!(matches!(result, Err(RoomError::Unauthorized(_))));
        assert_eq!(state.room(), &before);
    }

    #[test]
    fn test_kick_unknown_or_self() {
        let (mut state, ids) = room_with(&["Alice", "Bob"]);
        let alice = ids[0];

        assert!(matches!(
            state.kick(&alice, &UserId::new()),
            Err(RoomError::UserNotFound)
        ));
        assert!(matches!(
            state.kick(&alice, &alice),
            Err(RoomError::InvalidRequest(_))
        ));
    }
}
