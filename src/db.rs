use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS rooms (
        code TEXT PRIMARY KEY NOT NULL,
        created_at INTEGER NOT NULL,
        created_by TEXT NOT NULL,
        current_video_id TEXT,
        playing INTEGER NOT NULL DEFAULT 1,
        playback_seq INTEGER NOT NULL DEFAULT 0
    )"#,
    r#"CREATE TABLE IF NOT EXISTS room_members (
        room_code TEXT NOT NULL REFERENCES rooms(code),
        user_id TEXT NOT NULL,
        display_name TEXT NOT NULL,
        joined_at INTEGER NOT NULL,
        PRIMARY KEY (room_code, user_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        room_code TEXT NOT NULL REFERENCES rooms(code),
        sender_id TEXT NOT NULL,
        sender TEXT NOT NULL,
        avatar TEXT,
        text TEXT NOT NULL,
        reply_to_id TEXT,
        reply_sender TEXT,
        reply_text TEXT,
        created_at INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS messages_by_room ON messages (room_code, created_at, seq)",
    r#"CREATE TABLE IF NOT EXISTS queue (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        room_code TEXT NOT NULL REFERENCES rooms(code),
        video_id TEXT NOT NULL,
        title TEXT NOT NULL,
        thumbnail TEXT NOT NULL,
        added_by_id TEXT NOT NULL,
        added_by TEXT NOT NULL,
        added_at INTEGER NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS queue_by_room ON queue (room_code, added_at, seq)",
];

pub async fn connect(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(16)
        .connect_with(options)
        .await
}

pub async fn migrate(db_pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(db_pool).await?;
    }
    tracing::debug!("schema ready");
    Ok(())
}

/// Unix time in milliseconds, as assigned by the server.
pub(crate) fn now_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
