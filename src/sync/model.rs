use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RoomCode;

/// Who is acting, as handed back by the sign-in provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub display_name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub uid: String,
    pub display_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Room {
    pub code: RoomCode,
    pub created_at: i64,
    pub created_by: String,
    pub participants: Vec<Participant>,
    pub playback: PlaybackState,
}

/// Copy of the message being answered, frozen when the reply is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySnapshot {
    pub id: Uuid,
    pub sender: String,
    pub text: String,
}

impl ReplySnapshot {
    pub fn of(message: &Message) -> ReplySnapshot {
        ReplySnapshot {
            id: message.id,
            sender: message.sender.clone(),
            text: message.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: String,
    pub sender: String,
    pub avatar: Option<String>,
    pub text: String,
    pub reply_to: Option<ReplySnapshot>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRef {
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueEntry {
    pub id: Uuid,
    #[serde(flatten)]
    pub video: VideoRef,
    pub added_by_id: String,
    pub added_by: String,
    pub added_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub current_video_id: Option<String>,
    pub playing: bool,
    /// Bumped every time a video is (re)started. Players echo it back when
    /// they report the end, so a report only counts for the play it saw.
    pub seq: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackPhase {
    Idle,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn phase(&self) -> PlaybackPhase {
        match (&self.current_video_id, self.playing) {
            (None, _) => PlaybackPhase::Idle,
            (Some(_), true) => PlaybackPhase::Playing,
            (Some(_), false) => PlaybackPhase::Paused,
        }
    }
}

/// Merge-write onto a room's playback state. `None` leaves the field alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackPatch {
    pub current_video_id: Option<String>,
    pub playing: Option<bool>,
}

impl PlaybackPatch {
    pub fn play(video_id: impl Into<String>) -> PlaybackPatch {
        PlaybackPatch {
            current_video_id: Some(video_id.into()),
            playing: Some(true),
        }
    }

    pub fn playing(playing: bool) -> PlaybackPatch {
        PlaybackPatch {
            current_video_id: None,
            playing: Some(playing),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_follows_pointer_and_flag() {
        let mut state = PlaybackState { current_video_id: None, playing: true, seq: 0 };
        assert_eq!(state.phase(), PlaybackPhase::Idle);

        state.current_video_id = Some("Klv9ZSpjWPI".to_owned());
        assert_eq!(state.phase(), PlaybackPhase::Playing);

        state.playing = false;
        assert_eq!(state.phase(), PlaybackPhase::Paused);
    }

    #[test]
    fn queue_entry_serializes_flat() {
        let entry = QueueEntry {
            id: Uuid::nil(),
            video: VideoRef {
                video_id: "xyz123".to_owned(),
                title: "lofi".to_owned(),
                thumbnail: "https://i.ytimg.com/vi/xyz123/mqdefault.jpg".to_owned(),
            },
            added_by_id: "google.com:1".to_owned(),
            added_by: "Ada".to_owned(),
            added_at: 1,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["video_id"], "xyz123");
        assert_eq!(json["added_by"], "Ada");
    }
}
