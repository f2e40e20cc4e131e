use serde::{Deserialize, Serialize};

use super::PlaybackState;

/// What an embedded player reports about itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerEvent {
    Ended,
    Playing,
    Paused,
}

/// A local video player the room can drive.
pub trait Player {
    fn load(&mut self, video_id: &str);
    fn play(&mut self);
    fn pause(&mut self);
}

/// Nudges a local player towards the room's shared playback state.
///
/// Best effort: it follows the pointer and the play flag, not the position.
pub struct Follower<P> {
    player: P,
    loaded: Option<(String, i64)>,
}

impl<P: Player> Follower<P> {
    pub fn new(player: P) -> Follower<P> {
        Follower { player, loaded: None }
    }

    pub fn apply(&mut self, state: &PlaybackState) {
        let Some(video_id) = &state.current_video_id else {
            return;
        };
        let fresh = match &self.loaded {
            Some((loaded, seq)) => loaded != video_id || *seq != state.seq,
            None => true,
        };
        if fresh {
            self.player.load(video_id);
            self.loaded = Some((video_id.clone(), state.seq));
        }
        if state.playing {
            self.player.play();
        } else {
            self.player.pause();
        }
    }

    pub fn loaded(&self) -> Option<&str> {
        self.loaded.as_ref().map(|(video_id, _)| video_id.as_str())
    }

    pub fn player(&self) -> &P {
        &self.player
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(Vec<String>);

    impl Player for Recorder {
        fn load(&mut self, video_id: &str) {
            self.0.push(format!("load {video_id}"));
        }
        fn play(&mut self) {
            self.0.push("play".to_owned());
        }
        fn pause(&mut self) {
            self.0.push("pause".to_owned());
        }
    }

    fn state(video: Option<&str>, playing: bool, seq: i64) -> PlaybackState {
        PlaybackState {
            current_video_id: video.map(str::to_owned),
            playing,
            seq,
        }
    }

    #[test]
    fn loads_only_when_the_video_changes() {
        let mut follower = Follower::new(Recorder::default());
        follower.apply(&state(Some("Klv9ZSpjWPI"), true, 0));
        follower.apply(&state(Some("Klv9ZSpjWPI"), false, 0));
        follower.apply(&state(Some("xyz123"), true, 1));

        assert_eq!(
            follower.player().0,
            ["load Klv9ZSpjWPI", "play", "pause", "load xyz123", "play"]
        );
        assert_eq!(follower.loaded(), Some("xyz123"));
    }

    #[test]
    fn same_video_played_again_reloads() {
        let mut follower = Follower::new(Recorder::default());
        follower.apply(&state(Some("a"), true, 1));
        follower.apply(&state(Some("a"), true, 2));

        assert_eq!(follower.player().0, ["load a", "play", "load a", "play"]);
    }

    #[test]
    fn idle_state_leaves_player_alone() {
        let mut follower = Follower::new(Recorder::default());
        follower.apply(&state(None, true, 0));
        assert!(follower.player().0.is_empty());
    }

    #[test]
    fn events_use_lowercase_names() {
        assert_eq!(serde_json::to_string(&PlayerEvent::Ended).unwrap(), "\"ended\"");
        assert_eq!(
            serde_json::from_str::<PlayerEvent>("\"paused\"").unwrap(),
            PlayerEvent::Paused
        );
    }
}
