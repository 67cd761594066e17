//! End-to-end room flows through the dispatcher.
//!
//! Each test runs the real registry and room actors; connections are
//! in-process queues from `room-test-utils`.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use room_service::errors::RoomError;
use room_service::room::{MessageType, ServerEvent};
use room_test_utils::*;
use std::time::Duration;
use tokio::task::JoinSet;

// ============================================================================
// Membership
// ============================================================================

#[tokio::test]
async fn test_create_then_join_broadcasts_to_everyone() {
    let service = TestService::new();
    let mut alice = service.connect();
    let mut bob = service.connect();

    let (room_id, alice_id) = alice.create_room("Alice").await;
    let response = bob
        .request(join_room(room_id, "Bob"))
        .await
        .expect("join failed");

    let room = response.room.expect("join returned no room");
    let names: Vec<&str> = room.users.iter().map(|u| u.username.as_str()).collect();
    assert_eq!(names, ["Alice", "Bob"]);
    assert_eq!(room.host_id, alice_id);
    assert!(room.users[0].is_host);
    assert!(!room.users[1].is_host);

    for conn in [&mut alice, &mut bob] {
        let events = conn.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ServerEvent::UserJoined(r) if r.users.len() == 2));
        let ServerEvent::MessageReceived(notice) = &events[1] else {
            panic!("expected a join notice, got {:?}", events[1]);
        };
        assert_eq!(notice.kind, MessageType::System);
        assert_eq!(notice.content, "Bob joined the room");
    }
}

#[tokio::test]
async fn test_host_leaving_hands_authority_to_next_member() {
    let service = TestService::new();
    let alice = service.connect();
    let mut bob = service.connect();

    let (room_id, alice_id) = alice.create_room("Alice").await;
    let bob_id = bob.join_room(room_id, "Bob").await;
    bob.drain_events();

    let response = alice
        .request(leave_room(room_id, alice_id))
        .await
        .expect("leave failed");
    assert_eq!(response.room, None);

    let events = bob.drain_events();
    let ServerEvent::UserLeft(room) = &events[0] else {
        panic!("expected user_left, got {:?}", events[0]);
    };
    assert_eq!(room.host_id, bob_id);
    assert_eq!(room.users.len(), 1);
    assert!(room.users[0].is_host);
    assert!(
        matches!(&events[1], ServerEvent::MessageReceived(m) if m.content == "Alice left the room")
    );

    // Bob now drives playback
    bob.request(video_url_change(room_id, "http://x/next.mp4"))
        .await
        .expect("new host should control playback");
}

#[tokio::test]
async fn test_last_member_leaving_deletes_room() {
    let service = TestService::new();
    let alice = service.connect();

    let (room_id, alice_id) = alice.create_room("Alice").await;
    alice.request(leave_room(room_id, alice_id)).await.unwrap();

    let bob = service.connect();
    assert_eq!(
        bob.request(join_room(room_id, "Bob")).await,
        Err(RoomError::RoomNotFound)
    );
    assert_eq!(service.dispatcher().room_info(room_id).await, None);
}

#[tokio::test]
async fn test_duplicate_username_is_case_insensitive() {
    let service = TestService::new();
    let alice = service.connect();
    let impostor = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;

    assert_eq!(
        impostor.request(join_room(room_id, "aLiCe")).await,
        Err(RoomError::DuplicateUsername)
    );
}

#[tokio::test]
async fn test_full_room_rejects_join() {
    let service = TestService::with_config(TestRegistry::new().with_max_members(2).build());
    let alice = service.connect();
    let bob = service.connect();
    let carol = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    bob.join_room(room_id, "Bob").await;

    let result = carol.request(join_room(room_id, "Carol")).await;
    assert!(matches!(result, Err(RoomError::CapacityExceeded(_))));
}

#[tokio::test]
async fn test_concurrent_joins_are_all_retained() {
    let service = TestService::new();
    let alice = service.connect();
    let (room_id, _) = alice.create_room("Alice").await;

    let mut joins = JoinSet::new();
    for i in 0..20 {
        let conn = service.connect();
        joins.spawn(async move {
            let user_id = conn.join_room(room_id, &format!("viewer-{i}")).await;
            (conn, user_id)
        });
    }

    let mut joined = Vec::new();
    while let Some(result) = joins.join_next().await {
        joined.push(result.unwrap());
    }

    let room = service.dispatcher().room_info(room_id).await.unwrap();
    assert_eq!(room.users.len(), 21);
    for (_, user_id) in &joined {
        assert!(room.is_member(user_id));
    }
    assert_eq!(room.users.iter().filter(|u| u.is_host).count(), 1);
}

// ============================================================================
// Playback
// ============================================================================

#[tokio::test]
async fn test_url_then_state_reaches_members_without_self_echo() {
    let service = TestService::new();
    let mut alice = service.connect();
    let mut bob = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    bob.join_room(room_id, "Bob").await;
    alice.drain_events();
    bob.drain_events();

    alice
        .request(video_url_change(room_id, "http://x/movie.mp4"))
        .await
        .unwrap();
    alice
        .request(video_state_change(room_id, playing_at(42.0)))
        .await
        .unwrap();

    assert_eq!(
        bob.drain_event_names(),
        ["video_url_updated", "message_received", "video_state_updated"]
    );
    // The host sees the URL change and its narration, never its own state
    assert_eq!(
        alice.drain_event_names(),
        ["video_url_updated", "message_received"]
    );

    let room = service.dispatcher().room_info(room_id).await.unwrap();
    assert_eq!(room.video_url, "http://x/movie.mp4");
    assert!(room.is_playing);
    assert!((room.current_time - 42.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_url_change_resets_playback() {
    let service = TestService::new();
    let alice = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    alice
        .request(video_state_change(room_id, playing_at(120.0)))
        .await
        .unwrap();
    alice
        .request(video_url_change(room_id, "http://x/other.mp4"))
        .await
        .unwrap();

    let room = service.dispatcher().room_info(room_id).await.unwrap();
    assert!(!room.is_playing);
    assert!(room.current_time.abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_non_host_cannot_drive_playback() {
    let service = TestService::new();
    let alice = service.connect();
    let mut bob = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    bob.join_room(room_id, "Bob").await;
    bob.drain_events();

    let state = bob
        .request(video_state_change(room_id, paused_at(5.0)))
        .await;
    let url = bob.request(video_url_change(room_id, "http://x/b.mp4")).await;

    assert!(matches!(state, Err(RoomError::Unauthorized(_))));
    assert!(matches!(url, Err(RoomError::Unauthorized(_))));
    assert!(bob.drain_events().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_playback_change_reaches_nobody() {
    let service = TestService::new();
    let mut alice = service.connect();
    let bob = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    bob.join_room(room_id, "Bob").await;
    alice.drain_events();

    let result = bob.request(video_state_change(room_id, playing_at(42.0))).await;
    assert!(matches!(result, Err(RoomError::Unauthorized(_))));

    assert_eq!(alice.next_event_within(Duration::from_secs(30)).await, None);
    let snapshot = service.dispatcher().room_info(room_id).await.unwrap();
    assert!(!snapshot.is_playing);
}

#[tokio::test]
async fn test_user_time_is_rebroadcast_to_everyone() {
    let service = TestService::new();
    let mut alice = service.connect();
    let mut bob = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    let bob_id = bob.join_room(room_id, "Bob").await;
    alice.drain_events();
    bob.drain_events();

    bob.request(update_user_time(room_id, bob_id, 17.5))
        .await
        .unwrap();

    for conn in [&mut alice, &mut bob] {
        let events = conn.drain_events();
        let [ServerEvent::UserTimeUpdate(update)] = events.as_slice() else {
            panic!("expected one user_time_update, got {events:?}");
        };
        assert_eq!(update.user_id, bob_id);
        assert!((update.current_time - 17.5).abs() < f64::EPSILON);
    }
}

// ============================================================================
// Chat
// ============================================================================

#[tokio::test]
async fn test_chat_echoes_to_sender_with_registered_name() {
    let service = TestService::new();
    let mut alice = service.connect();
    let mut bob = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    let bob_id = bob.join_room(room_id, "Bob").await;
    alice.drain_events();
    bob.drain_events();

    bob.request(send_message(room_id, "hello")).await.unwrap();

    for conn in [&mut alice, &mut bob] {
        let events = conn.drain_events();
        let [ServerEvent::MessageReceived(message)] = events.as_slice() else {
            panic!("expected one message_received, got {events:?}");
        };
        assert_eq!(message.user_id, Some(bob_id));
        assert_eq!(message.username, "Bob");
        assert_eq!(message.content, "hello");
        assert_eq!(message.kind, MessageType::User);
    }
}

#[tokio::test]
async fn test_chat_timestamps_never_go_backwards() {
    let service = TestService::new();
    let mut alice = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    for i in 0..10 {
        alice
            .request(send_message(room_id, &format!("line {i}")))
            .await
            .unwrap();
    }

    let timestamps: Vec<i64> = alice
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            ServerEvent::MessageReceived(message) => Some(message.timestamp),
            _ => None,
        })
        .collect();
    assert_eq!(timestamps.len(), 10);
    assert!(timestamps.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_oversized_chat_is_rejected() {
    let service =
        TestService::with_config(TestRegistry::new().with_max_message_chars(5).build());
    let mut alice = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    let result = alice.request(send_message(room_id, "far too long")).await;

    assert!(matches!(result, Err(RoomError::InvalidRequest(_))));
    assert!(alice.drain_events().is_empty());
}

// ============================================================================
// Kick
// ============================================================================

#[tokio::test]
async fn test_host_kick_notifies_target_and_unbinds_it() {
    let service = TestService::new();
    let mut alice = service.connect();
    let mut bob = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    let bob_id = bob.join_room(room_id, "Bob").await;
    alice.drain_events();
    bob.drain_events();

    alice.request(kick_user(room_id, bob_id)).await.unwrap();

    assert_eq!(bob.drain_event_names(), ["kicked"]);
    let events = alice.drain_events();
    assert!(matches!(&events[0], ServerEvent::UserLeft(r) if !r.is_member(&bob_id)));
    assert!(matches!(
        &events[1],
        ServerEvent::MessageReceived(m) if m.content == "Bob was kicked from the room"
    ));

    // The kicked connection no longer speaks for the room
    assert_eq!(
        bob.request(send_message(room_id, "still here?")).await,
        Err(RoomError::UnboundConnection)
    );
}

#[tokio::test]
async fn test_kick_by_member_is_unauthorized() {
    let service = TestService::new();
    let alice = service.connect();
    let bob = service.connect();

    let (room_id, alice_id) = alice.create_room("Alice").await;
    bob.join_room(room_id, "Bob").await;

    let result = bob.request(kick_user(room_id, alice_id)).await;

    assert!(matches!(result, Err(RoomError::Unauthorized(_))));
    let room = service.dispatcher().room_info(room_id).await.unwrap();
    assert_eq!(room.users.len(), 2);
}

#[tokio::test]
async fn test_kick_unknown_user() {
    let service = TestService::new();
    let alice = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;

    assert_eq!(
        alice
            .request(kick_user(room_id, common::types::UserId::new()))
            .await,
        Err(RoomError::UserNotFound)
    );
}

// ============================================================================
// Session binding
// ============================================================================

#[tokio::test]
async fn test_unbound_connection_cannot_act_in_room() {
    let service = TestService::new();
    let alice = service.connect();
    let stranger = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;

    assert_eq!(
        stranger.request(send_message(room_id, "hi")).await,
        Err(RoomError::UnboundConnection)
    );
    assert_eq!(
        stranger
            .request(video_state_change(room_id, playing_at(1.0)))
            .await,
        Err(RoomError::UnboundConnection)
    );
}

#[tokio::test]
async fn test_member_cannot_leave_for_someone_else() {
    let service = TestService::new();
    let alice = service.connect();
    let bob = service.connect();

    let (room_id, alice_id) = alice.create_room("Alice").await;
    bob.join_room(room_id, "Bob").await;

    let result = bob.request(leave_room(room_id, alice_id)).await;

    assert!(matches!(result, Err(RoomError::Unauthorized(_))));
    let room = service.dispatcher().room_info(room_id).await.unwrap();
    assert!(room.is_member(&alice_id));
}

#[tokio::test]
async fn test_disconnect_leaves_room_once() {
    let service = TestService::new();
    let mut alice = service.connect();
    let bob = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    let bob_id = bob.join_room(room_id, "Bob").await;
    alice.drain_events();

    bob.request(leave_room(room_id, bob_id)).await.unwrap();
    bob.disconnect().await;
    bob.disconnect().await;

    assert_eq!(alice.drain_event_names(), ["user_left", "message_received"]);
}

#[tokio::test]
async fn test_disconnect_of_last_member_deletes_room() {
    let service = TestService::new();
    let alice = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    alice.disconnect().await;

    assert_eq!(service.dispatcher().room_info(room_id).await, None);
    let status = service.registry().get_status().await.unwrap();
    assert_eq!(status.room_count, 0);
}

#[tokio::test]
async fn test_host_disconnect_hands_authority_to_next_member() {
    let service = TestService::new();
    let alice = service.connect();
    let mut bob = service.connect();

    let (room_id, _) = alice.create_room("Alice").await;
    let bob_id = bob.join_room(room_id, "Bob").await;
    bob.drain_events();

    alice.disconnect().await;

    let events = bob.drain_events();
    let names: Vec<&str> = events.iter().map(ServerEvent::name).collect();
    assert_eq!(names, ["user_left", "message_received"]);
    let ServerEvent::UserLeft(room) = &events[0] else {
        panic!("expected user_left, got {:?}", events[0]);
    };
    assert_eq!(room.host_id, bob_id);
    assert_eq!(room.users.len(), 1);
    assert!(room.users[0].is_host);
    assert!(
        matches!(&events[1], ServerEvent::MessageReceived(m) if m.content == "Alice left the room")
    );

    let snapshot = service.dispatcher().room_info(room_id).await.unwrap();
    assert_eq!(snapshot.host_id, bob_id);
}

#[tokio::test]
async fn test_get_room_info_needs_no_binding() {
    let service = TestService::new();
    let alice = service.connect();
    let observer = service.connect();

    let (room_id, alice_id) = alice.create_room("Alice").await;

    let response = observer.request(get_room_info(room_id)).await.unwrap();
    let room = response.room.expect("room should exist");
    assert_eq!(room.host_id, alice_id);
    assert_eq!(response.user_id, None);

    let missing = observer
        .request(get_room_info(common::types::RoomId::new()))
        .await
        .unwrap();
    assert_eq!(missing.room, None);
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_refuses_new_rooms() {
    let service = TestService::new();
    let alice = service.connect();
    alice.create_room("Alice").await;

    service
        .registry()
        .shutdown(std::time::Duration::from_secs(1))
        .await
        .unwrap();

    let late = service.connect();
    let result = late.request(create_room("Late")).await;
    assert_eq!(result, Err(RoomError::Draining));
}
