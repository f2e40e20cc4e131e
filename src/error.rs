use thiserror::Error;

use crate::sync::RoomCode;

/// Failures of room operations. Each one is local to the action that caused it.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Room {0} not found.")]
    RoomNotFound(RoomCode),
    #[error("You are not allowed to write to this room.")]
    WriteDenied,
    #[error("Video search failed: {0}")]
    SearchFailed(String),
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl SyncError {
    pub(crate) fn search(err: impl std::fmt::Display) -> Self {
        SyncError::SearchFailed(err.to_string())
    }
}
