use std::sync::Arc;

use futures_util::FutureExt;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::{db::now_ms, error::SyncError};

use super::{
    Hub, Identity, Message, Participant, PlaybackPatch, PlaybackState, QueueEntry, ReplySnapshot,
    Room, RoomCode, Subscription, Topic, VideoRef,
};

const CODE_ATTEMPTS: usize = 4;

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    sender_id: String,
    sender: String,
    avatar: Option<String>,
    text: String,
    reply_to_id: Option<String>,
    reply_sender: Option<String>,
    reply_text: Option<String>,
    created_at: i64,
}

impl TryFrom<MessageRow> for Message {
    type Error = SyncError;

    fn try_from(row: MessageRow) -> Result<Message, SyncError> {
        let reply_to = match (row.reply_to_id, row.reply_sender, row.reply_text) {
            (Some(id), Some(sender), Some(text)) => Some(ReplySnapshot {
                id: parse_uuid(&id)?,
                sender,
                text,
            }),
            _ => None,
        };
        Ok(Message {
            id: parse_uuid(&row.id)?,
            sender_id: row.sender_id,
            sender: row.sender,
            avatar: row.avatar,
            text: row.text,
            reply_to,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct QueueRow {
    id: String,
    video_id: String,
    title: String,
    thumbnail: String,
    added_by_id: String,
    added_by: String,
    added_at: i64,
}

impl TryFrom<QueueRow> for QueueEntry {
    type Error = SyncError;

    fn try_from(row: QueueRow) -> Result<QueueEntry, SyncError> {
        Ok(QueueEntry {
            id: parse_uuid(&row.id)?,
            video: VideoRef {
                video_id: row.video_id,
                title: row.title,
                thumbnail: row.thumbnail,
            },
            added_by_id: row.added_by_id,
            added_by: row.added_by,
            added_at: row.added_at,
        })
    }
}

fn parse_uuid(s: &str) -> Result<Uuid, SyncError> {
    Uuid::parse_str(s).map_err(|e| SyncError::Store(sqlx::Error::Decode(Box::new(e))))
}

/// Rooms, their chat, queue and playback, backed by SQLite.
///
/// Every write pokes the room's [`Hub`] channel so live subscriptions refresh.
#[derive(Clone)]
pub struct RoomStore {
    db_pool: SqlitePool,
    hub: Arc<Hub>,
    default_video_id: String,
}

impl RoomStore {
    pub fn new(db_pool: SqlitePool, hub: Arc<Hub>, default_video_id: impl Into<String>) -> RoomStore {
        RoomStore {
            db_pool,
            hub,
            default_video_id: default_video_id.into(),
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub async fn create_room(&self, creator: &Identity) -> Result<RoomCode, SyncError> {
        let mut attempt = 1;
        loop {
            let code = RoomCode::generate(&mut rand::rng());
            match self.create_room_with_code(&code, creator).await {
                Err(SyncError::Store(sqlx::Error::Database(e))) if e.is_unique_violation() && attempt < CODE_ATTEMPTS => {
                    tracing::warn!(%code, attempt, "room code collision");
                    attempt += 1;
                }
                result => return result.map(|()| code),
            }
        }
    }

    /// Creates the room under a code chosen by the caller. Fails if it is taken.
    pub async fn create_room_with_code(&self, code: &RoomCode, creator: &Identity) -> Result<(), SyncError> {
        let now = now_ms();

        let mut tx = self.db_pool.begin().await?;
        sqlx::query("INSERT INTO rooms (code,created_at,created_by,current_video_id,playing) VALUES (?,?,?,?,1)")
            .bind(code.as_str())
            .bind(now)
            .bind(&creator.uid)
            .bind(&self.default_video_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("INSERT INTO room_members (room_code,user_id,display_name,joined_at) VALUES (?,?,?,?)")
            .bind(code.as_str())
            .bind(&creator.uid)
            .bind(&creator.display_name)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(%code, creator = %creator.uid, "room created");
        Ok(())
    }

    /// Looks the room up and records the caller as a participant.
    pub async fn join_room(&self, code: &RoomCode, who: &Identity) -> Result<Room, SyncError> {
        self.ensure_room(code).await?;

        sqlx::query(
            "INSERT INTO room_members (room_code,user_id,display_name,joined_at) VALUES (?,?,?,?) \
             ON CONFLICT (room_code,user_id) DO UPDATE SET display_name=excluded.display_name",
        )
        .bind(code.as_str())
        .bind(&who.uid)
        .bind(&who.display_name)
        .bind(now_ms())
        .execute(&self.db_pool)
        .await?;

        tracing::debug!(%code, user = %who.uid, "joined room");
        self.room(code).await
    }

    pub async fn room(&self, code: &RoomCode) -> Result<Room, SyncError> {
        let Some((created_at, created_by, current_video_id, playing, seq)): Option<(i64, String, Option<String>, bool, i64)> =
            sqlx::query_as("SELECT created_at,created_by,current_video_id,playing,playback_seq FROM rooms WHERE code=?")
                .bind(code.as_str())
                .fetch_optional(&self.db_pool)
                .await?
        else {
            return Err(SyncError::RoomNotFound(code.clone()));
        };

        let participants = sqlx::query_as::<_, (String, String)>(
            "SELECT user_id,display_name FROM room_members WHERE room_code=? ORDER BY joined_at, rowid",
        )
        .bind(code.as_str())
        .fetch_all(&self.db_pool)
        .await?
        .into_iter()
        .map(|(uid, display_name)| Participant { uid, display_name })
        .collect();

        Ok(Room {
            code: code.clone(),
            created_at,
            created_by,
            participants,
            playback: PlaybackState { current_video_id, playing, seq },
        })
    }

    pub async fn ensure_room(&self, code: &RoomCode) -> Result<(), SyncError> {
        sqlx::query("SELECT 1 FROM rooms WHERE code=?")
            .bind(code.as_str())
            .fetch_optional(&self.db_pool)
            .await?
            .map(|_| ())
            .ok_or_else(|| SyncError::RoomNotFound(code.clone()))
    }

    /// `RoomNotFound` for a missing room, `WriteDenied` for a non-participant.
    pub async fn ensure_member(&self, code: &RoomCode, uid: &str) -> Result<(), SyncError> {
        self.ensure_room(code).await?;
        sqlx::query("SELECT 1 FROM room_members WHERE room_code=? AND user_id=?")
            .bind(code.as_str())
            .bind(uid)
            .fetch_optional(&self.db_pool)
            .await?
            .map(|_| ())
            .ok_or(SyncError::WriteDenied)
    }

    /// Appends to the chat. Blank text is ignored and yields `None`.
    pub async fn post_message(
        &self,
        code: &RoomCode,
        sender: &Identity,
        text: &str,
        reply_to: Option<ReplySnapshot>,
    ) -> Result<Option<Uuid>, SyncError> {
        if text.trim().is_empty() {
            return Ok(None);
        }
        self.ensure_member(code, &sender.uid).await?;

        let id = Uuid::now_v7();
        let (reply_to_id, reply_sender, reply_text) = match reply_to {
            Some(ReplySnapshot { id, sender, text }) => (Some(id.to_string()), Some(sender), Some(text)),
            None => (None, None, None),
        };
        sqlx::query(
            "INSERT INTO messages (id,room_code,sender_id,sender,avatar,text,reply_to_id,reply_sender,reply_text,created_at) \
             SELECT ?,?,?,?,?,?,?,?,?,MAX(?, COALESCE(MAX(created_at), 0)) FROM messages WHERE room_code=?",
        )
        .bind(id.to_string())
        .bind(code.as_str())
        .bind(&sender.uid)
        .bind(&sender.display_name)
        .bind(&sender.avatar)
        .bind(text)
        .bind(reply_to_id)
        .bind(reply_sender)
        .bind(reply_text)
        .bind(now_ms())
        .bind(code.as_str())
        .execute(&self.db_pool)
        .await?;

        self.hub.notify(code, Topic::Messages);
        Ok(Some(id))
    }

    pub async fn message(&self, code: &RoomCode, id: Uuid) -> Result<Option<Message>, SyncError> {
        sqlx::query_as::<_, MessageRow>(
            "SELECT id,sender_id,sender,avatar,text,reply_to_id,reply_sender,reply_text,created_at \
             FROM messages WHERE room_code=? AND id=?",
        )
        .bind(code.as_str())
        .bind(id.to_string())
        .fetch_optional(&self.db_pool)
        .await?
        .map(Message::try_from)
        .transpose()
    }

    pub async fn messages(&self, code: &RoomCode) -> Result<Vec<Message>, SyncError> {
        sqlx::query_as::<_, MessageRow>(
            "SELECT id,sender_id,sender,avatar,text,reply_to_id,reply_sender,reply_text,created_at \
             FROM messages WHERE room_code=? ORDER BY created_at, seq",
        )
        .bind(code.as_str())
        .fetch_all(&self.db_pool)
        .await?
        .into_iter()
        .map(Message::try_from)
        .collect()
    }

    pub async fn enqueue(&self, code: &RoomCode, adder: &Identity, video: &VideoRef) -> Result<Uuid, SyncError> {
        self.ensure_member(code, &adder.uid).await?;

        let id = Uuid::now_v7();
        sqlx::query(
            "INSERT INTO queue (id,room_code,video_id,title,thumbnail,added_by_id,added_by,added_at) \
             SELECT ?,?,?,?,?,?,?,MAX(?, COALESCE(MAX(added_at), 0)) FROM queue WHERE room_code=?",
        )
        .bind(id.to_string())
        .bind(code.as_str())
        .bind(&video.video_id)
        .bind(&video.title)
        .bind(&video.thumbnail)
        .bind(&adder.uid)
        .bind(&adder.display_name)
        .bind(now_ms())
        .bind(code.as_str())
        .execute(&self.db_pool)
        .await?;

        tracing::debug!(%code, video = %video.video_id, "queued");
        self.hub.notify(code, Topic::Queue);
        Ok(id)
    }

    pub async fn queue(&self, code: &RoomCode) -> Result<Vec<QueueEntry>, SyncError> {
        sqlx::query_as::<_, QueueRow>(
            "SELECT id,video_id,title,thumbnail,added_by_id,added_by,added_at \
             FROM queue WHERE room_code=? ORDER BY added_at, seq",
        )
        .bind(code.as_str())
        .fetch_all(&self.db_pool)
        .await?
        .into_iter()
        .map(QueueEntry::try_from)
        .collect()
    }

    pub async fn front(&self, code: &RoomCode) -> Result<Option<QueueEntry>, SyncError> {
        sqlx::query_as::<_, QueueRow>(
            "SELECT id,video_id,title,thumbnail,added_by_id,added_by,added_at \
             FROM queue WHERE room_code=? ORDER BY added_at, seq LIMIT 1",
        )
        .bind(code.as_str())
        .fetch_optional(&self.db_pool)
        .await?
        .map(QueueEntry::try_from)
        .transpose()
    }

    /// Removes the earliest entry. Only the call that actually deleted it
    /// gets it back; a racing call sees `None`.
    pub async fn dequeue_front(&self, code: &RoomCode) -> Result<Option<QueueEntry>, SyncError> {
        let Some(front) = self.front(code).await? else {
            return Ok(None);
        };
        Ok(self.remove_entry(code, front.id).await?.then_some(front))
    }

    /// Deletes by id. Deleting an entry that is already gone is not an error.
    pub async fn remove_entry(&self, code: &RoomCode, id: Uuid) -> Result<bool, SyncError> {
        let removed = sqlx::query("DELETE FROM queue WHERE room_code=? AND id=?")
            .bind(code.as_str())
            .bind(id.to_string())
            .execute(&self.db_pool)
            .await?
            .rows_affected()
            > 0;

        if removed {
            self.hub.notify(code, Topic::Queue);
        } else {
            tracing::debug!(%code, %id, "queue entry already consumed");
        }
        Ok(removed)
    }

    pub async fn playback(&self, code: &RoomCode) -> Result<PlaybackState, SyncError> {
        let Some((current_video_id, playing, seq)): Option<(Option<String>, bool, i64)> =
            sqlx::query_as("SELECT current_video_id,playing,playback_seq FROM rooms WHERE code=?")
                .bind(code.as_str())
                .fetch_optional(&self.db_pool)
                .await?
        else {
            return Err(SyncError::RoomNotFound(code.clone()));
        };
        Ok(PlaybackState { current_video_id, playing, seq })
    }

    /// Merge-write. Concurrent writers race; the last one wins.
    ///
    /// A patch that sets the video bumps [`PlaybackState::seq`], even when it
    /// is the same video again.
    pub async fn write_playback(&self, code: &RoomCode, who: &Identity, patch: PlaybackPatch) -> Result<(), SyncError> {
        self.ensure_member(code, &who.uid).await?;

        let bump = i64::from(patch.current_video_id.is_some());
        sqlx::query(
            "UPDATE rooms SET current_video_id=COALESCE(?, current_video_id), playing=COALESCE(?, playing), \
             playback_seq=playback_seq+? WHERE code=?",
        )
        .bind(patch.current_video_id)
        .bind(patch.playing)
        .bind(bump)
        .bind(code.as_str())
        .execute(&self.db_pool)
        .await?;

        self.hub.notify(code, Topic::Playback);
        Ok(())
    }

    /// Like [`write_playback`](Self::write_playback) but only while the
    /// playback generation is still `expected_seq`. Returns whether it wrote.
    pub async fn write_playback_if(
        &self,
        code: &RoomCode,
        who: &Identity,
        expected_seq: i64,
        patch: PlaybackPatch,
    ) -> Result<bool, SyncError> {
        self.ensure_member(code, &who.uid).await?;

        let bump = i64::from(patch.current_video_id.is_some());
        let written = sqlx::query(
            "UPDATE rooms SET current_video_id=COALESCE(?, current_video_id), playing=COALESCE(?, playing), \
             playback_seq=playback_seq+? WHERE code=? AND playback_seq=?",
        )
        .bind(patch.current_video_id)
        .bind(patch.playing)
        .bind(bump)
        .bind(code.as_str())
        .bind(expected_seq)
        .execute(&self.db_pool)
        .await?
        .rows_affected()
            > 0;

        if written {
            self.hub.notify(code, Topic::Playback);
        }
        Ok(written)
    }

    pub fn subscribe_messages(&self, code: &RoomCode) -> Subscription<Vec<Message>> {
        let (store, code) = (self.clone(), code.clone());
        Subscription::new(Topic::Messages, self.hub.clone(), code.clone(), move || {
            let (store, code) = (store.clone(), code.clone());
            async move { store.messages(&code).await }.boxed()
        })
    }

    pub fn subscribe_queue(&self, code: &RoomCode) -> Subscription<Vec<QueueEntry>> {
        let (store, code) = (self.clone(), code.clone());
        Subscription::new(Topic::Queue, self.hub.clone(), code.clone(), move || {
            let (store, code) = (store.clone(), code.clone());
            async move { store.queue(&code).await }.boxed()
        })
    }

    pub fn subscribe_playback(&self, code: &RoomCode) -> Subscription<PlaybackState> {
        let (store, code) = (self.clone(), code.clone());
        Subscription::new(Topic::Playback, self.hub.clone(), code.clone(), move || {
            let (store, code) = (store.clone(), code.clone());
            async move { store.playback(&code).await }.boxed()
        })
    }
}
