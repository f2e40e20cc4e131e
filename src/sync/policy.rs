use crate::error::SyncError;

use super::{Identity, PlaybackPatch, PlayerEvent, QueueEntry, RoomCode, RoomStore};

/// The rules tying the queue to playback. Any participant may trigger any of
/// them; there is no leader and no lock.
#[derive(Clone)]
pub struct SyncPolicy {
    store: RoomStore,
}

impl SyncPolicy {
    pub fn new(store: RoomStore) -> SyncPolicy {
        SyncPolicy { store }
    }

    pub fn store(&self) -> &RoomStore {
        &self.store
    }

    /// Someone picked a video from search or from the queue.
    pub async fn select_video(&self, code: &RoomCode, who: &Identity, video_id: &str) -> Result<(), SyncError> {
        tracing::info!(%code, user = %who.uid, video_id, "video selected");
        self.store.write_playback(code, who, PlaybackPatch::play(video_id)).await
    }

    /// Advances to the front of the queue, if there is one.
    ///
    /// With `ended_seq` set, nothing happens unless that play is still the
    /// current one, so every participant reporting the same end only advances
    /// once. That holds when the next entry is the same video again. The
    /// playback write and the queue delete are separate writes.
    pub async fn playback_ended(
        &self,
        code: &RoomCode,
        who: &Identity,
        ended_seq: Option<i64>,
    ) -> Result<Option<QueueEntry>, SyncError> {
        let Some(next) = self.store.front(code).await? else {
            tracing::debug!(%code, "playback ended with empty queue");
            return Ok(None);
        };

        let patch = PlaybackPatch::play(next.video.video_id.as_str());
        match ended_seq {
            Some(seq) => {
                if !self.store.write_playback_if(code, who, seq, patch).await? {
                    tracing::debug!(%code, seq, "already advanced by another participant");
                    return Ok(None);
                }
            }
            None => self.store.write_playback(code, who, patch).await?,
        }

        self.store.remove_entry(code, next.id).await?;
        tracing::info!(%code, video = %next.video.video_id, "advanced to next queued video");
        Ok(Some(next))
    }

    pub async fn player_reported(
        &self,
        code: &RoomCode,
        who: &Identity,
        event: PlayerEvent,
        seq: Option<i64>,
    ) -> Result<(), SyncError> {
        match event {
            PlayerEvent::Ended => self.playback_ended(code, who, seq).await.map(|_| ()),
            PlayerEvent::Playing => self.store.write_playback(code, who, PlaybackPatch::playing(true)).await,
            PlayerEvent::Paused => self.store.write_playback(code, who, PlaybackPatch::playing(false)).await,
        }
    }
}
