use std::{sync::Arc, time::Duration};

use jo::{db, sync::{Hub, Identity, RoomStore, SyncPolicy}};
use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};

pub const DEFAULT_VIDEO: &str = "Klv9ZSpjWPI";

/// One in-memory database per test; a single connection keeps it alive.
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None::<Duration>)
        .max_lifetime(None::<Duration>)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    db::migrate(&pool).await.unwrap();
    pool
}

pub async fn policy() -> (SyncPolicy, SqlitePool) {
    let pool = memory_pool().await;
    let store = RoomStore::new(pool.clone(), Arc::new(Hub::new()), DEFAULT_VIDEO);
    (SyncPolicy::new(store), pool)
}

pub fn user(name: &str) -> Identity {
    Identity {
        uid: format!("google.com:{}", name.to_lowercase()),
        display_name: name.to_owned(),
        avatar: Some(format!("https://example.com/{name}.png")),
    }
}

/// A canned YouTube search response with `n` videos.
pub fn search_body(query: &str, n: usize) -> String {
    let items: Vec<_> = (0..n)
        .map(|i| {
            let id = if i == 0 { "xyz123".to_owned() } else { format!("vid{i:03}") };
            serde_json::json!({
                "kind": "youtube#searchResult",
                "id": {"kind": "youtube#video", "videoId": id},
                "snippet": {
                    "title": format!("{query} mix #{i}"),
                    "thumbnails": {
                        "default": {"url": format!("https://i.ytimg.com/vi/{id}/default.jpg")},
                        "medium": {"url": format!("https://i.ytimg.com/vi/{id}/mqdefault.jpg")}
                    }
                }
            })
        })
        .collect();
    serde_json::json!({"kind": "youtube#searchListResponse", "items": items}).to_string()
}
