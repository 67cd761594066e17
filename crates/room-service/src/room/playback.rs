//! Playback synchronization.
//!
//! The room keeps `is_playing`, `current_time` and the reported duration;
//! the host's full [`VideoState`] is relayed to the other members untouched. Clients
//! reconcile against it with [`needs_correction`].

use super::events::{Outbound, ServerEvent};
use super::model::{UserTimeUpdate, VideoState};
use super::{RoomState, Transition};
use crate::errors::RoomError;
use common::types::UserId;

/// Local position may differ from the authoritative one by this many
/// seconds before a receiver seeks.
pub const DRIFT_TOLERANCE_SECONDS: f64 = 1.0;

/// Whether a receiver at `local` should jump to `authoritative`.
#[must_use]
pub fn needs_correction(local: f64, authoritative: f64) -> bool {
    (local - authoritative).abs() > DRIFT_TOLERANCE_SECONDS
}

fn validated_position(seconds: f64) -> Result<f64, RoomError> {
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err(RoomError::InvalidRequest(
            "currentTime must be a non-negative number of seconds".to_string(),
        ))
    }
}

impl RoomState {
    /// Record the host's playback state and relay it to everyone else.
    pub fn set_video_state(
        &mut self,
        requester: &UserId,
        state: VideoState,
    ) -> Result<Transition<()>, RoomError> {
        let current_time = validated_position(state.current_time)?;
        if !(state.playback_speed.is_finite() && state.playback_speed > 0.0) {
            return Err(RoomError::InvalidRequest(
                "playbackSpeed must be a positive number".to_string(),
            ));
        }

        self.room.is_playing = state.is_playing;
        self.room.current_time = current_time;
        // Players report zero until metadata has loaded
        if state.duration.is_finite() && state.duration > 0.0 {
            self.room.duration = Some(state.duration);
        }

        Ok(Transition::new(()).emit(Outbound::everyone_except(
            *requester,
            ServerEvent::VideoStateUpdated(state),
        )))
    }

    /// Load a new video. Playback always restarts paused at zero.
    pub fn set_video_url(
        &mut self,
        requester: &UserId,
        url: String,
    ) -> Result<Transition<()>, RoomError> {
        let url = url.trim().to_string();
        if url.chars().count() > self.limits.max_url_chars {
            return Err(RoomError::InvalidRequest(format!(
                "url must be at most {} characters",
                self.limits.max_url_chars
            )));
        }

        self.room.video_url.clone_from(&url);
        self.room.current_time = 0.0;
        self.room.is_playing = false;
        self.room.duration = None;

        let changed_by = self
            .room
            .user(requester)
            .map(|user| user.username.clone())
            .unwrap_or_default();
        let notice = self.relay.video_changed(&changed_by);

        Ok(Transition::new(())
            .emit(Outbound::everyone(ServerEvent::VideoUrlUpdated(url)))
            .emit(Outbound::everyone(ServerEvent::MessageReceived(notice))))
    }

    /// Store a member's reported position and rebroadcast it for display.
    ///
    /// Never touches the room's authoritative playback fields.
    pub fn update_user_time(
        &mut self,
        user_id: &UserId,
        current_time: f64,
    ) -> Result<Transition<()>, RoomError> {
        let current_time = validated_position(current_time)?;

        let user = self
            .room
            .users
            .iter_mut()
            .find(|user| user.id == *user_id)
            .ok_or(RoomError::UserNotFound)?;
        user.last_known_time = Some(current_time);

        let update = UserTimeUpdate {
            room_id: self.room.id,
            user_id: *user_id,
            current_time,
        };

        Ok(Transition::new(()).emit(Outbound::everyone(ServerEvent::UserTimeUpdate(update))))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::room::{Audience, Command, RoomLimits};
    use common::types::RoomId;

    fn room_with_member() -> (RoomState, UserId, UserId) {
        let mut state = RoomState::create(RoomId::new(), "Alice", RoomLimits::default()).unwrap();
        let host = state.room().host_id;
        let bob = state.join("Bob").unwrap().value.user.id;
        (state, host, bob)
    }

    #[test]
    fn test_drift_tolerance() {
        assert!(!needs_correction(10.0, 10.5));
        assert!(!needs_correction(10.0, 11.0));
        assert!(needs_correction(10.0, 11.5));
        assert!(needs_correction(42.0, 0.0));
    }

    #[test]
    fn test_set_state_updates_room_and_skips_sender() {
        let (mut state, host, _) = room_with_member();

        let transition = state
            .set_video_state(&host, VideoState::new(true, 42.0))
            .unwrap();

        assert!(state.room().is_playing);
        assert!((state.room().current_time - 42.0).abs() < f64::EPSILON);
        assert_eq!(transition.outbound.len(), 1);
        assert_eq!(
            transition.outbound.first().unwrap().audience,
            Audience::EveryoneExcept(host)
        );
    }

    #[test]
    fn test_set_state_rejects_bad_numbers() {
        let (mut state, host, _) = room_with_member();

        assert!(state
            .set_video_state(&host, VideoState::new(true, -1.0))
            .is_err());
        assert!(state
            .set_video_state(&host, VideoState::new(true, f64::NAN))
            .is_err());

        let mut zero_speed = VideoState::new(true, 1.0);
        zero_speed.playback_speed = 0.0;
        assert!(state.set_video_state(&host, zero_speed).is_err());

        assert!(!state.room().is_playing);
    }

    #[test]
    fn test_url_change_resets_playback() {
        let (mut state, host, _) = room_with_member();
        state
            .set_video_state(&host, VideoState::new(true, 300.0))
            .unwrap();

        let transition = state
            .set_video_url(&host, "http://example/video".to_string())
            .unwrap();

        let room = state.room();
        assert_eq!(room.video_url, "http://example/video");
        assert!(!room.is_playing);
        assert!(room.current_time.abs() < f64::EPSILON);

        let first = transition.outbound.first().unwrap();
        assert_eq!(first.audience, Audience::Everyone);
        assert_eq!(
            first.event,
            ServerEvent::VideoUrlUpdated("http://example/video".to_string())
        );
    }

    #[test]
    fn test_duration_tracks_the_loaded_video() {
        let (mut state, host, _) = room_with_member();

        let mut reported = VideoState::new(true, 10.0);
        reported.duration = 596.5;
        state.set_video_state(&host, reported).unwrap();
        assert_eq!(state.room().duration, Some(596.5));

        // A later update without metadata keeps the known length
        state
            .set_video_state(&host, VideoState::new(false, 12.0))
            .unwrap();
        assert_eq!(state.room().duration, Some(596.5));

        state
            .set_video_url(&host, "http://example/next".to_string())
            .unwrap();
        assert_eq!(state.room().duration, None);
    }

    #[test]
    fn test_url_too_long_is_rejected() {
        let (mut state, host, _) = room_with_member();
        let url = format!("http://example/{}", "a".repeat(RoomLimits::default().max_url_chars));

        assert!(matches!(
            state.set_video_url(&host, url),
            Err(RoomError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_non_host_playback_changes_are_rejected() {
        let (mut state, _, bob) = room_with_member();

        let result = state.apply(Command::SetVideoState {
            requester: bob,
            state: VideoState::new(true, 10.0),
        });
        assert!(matches!(result, Err(RoomError::Unauthorized(_))));
        assert!(!state.room().is_playing);
    }

    #[test]
    fn test_user_time_is_informational() {
        let (mut state, _, bob) = room_with_member();

        let transition = state.update_user_time(&bob, 12.5).unwrap();

        assert!(!state.room().is_playing);
        assert!(state.room().current_time.abs() < f64::EPSILON);
        assert_eq!(state.room().user(&bob).unwrap().last_known_time, Some(12.5));

        match &transition.outbound.first().unwrap().event {
            ServerEvent::UserTimeUpdate(update) => {
                assert_eq!(update.user_id, bob);
                assert!((update.current_time - 12.5).abs() < f64::EPSILON);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
