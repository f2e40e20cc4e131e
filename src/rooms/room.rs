use axum::{debug_handler, extract::{Path, Query, State}, http::StatusCode, response::{Html, IntoResponse, Redirect, Response}, Json};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{error::SyncError, include_res, res, search::YouTubeSearch, session, sync::{Identity, RoomCode, RoomStore, VideoRef}, AppResult, AppState};

#[derive(Deserialize)]
pub(crate) struct SearchQuery {
    #[serde(default)]
    q: String,
}

#[debug_handler(state = AppState)]
pub(crate) async fn room(
    State(store): State<RoomStore>,
    session: Session,
    Path(code): Path<String>,
) -> AppResult<Response> {
    let Some(code) = RoomCode::parse(&code) else {
        return res::sorry("Room not found.");
    };
    let Some(identity) = session::identity(&session).await? else {
        return Ok(Redirect::to(&session::login_redirect(&format!("/chat/{code}"))).into_response());
    };

    let room = match store.join_room(&code, &identity).await {
        Ok(room) => room,
        Err(SyncError::RoomNotFound(_)) => return res::sorry("Room not found."),
        Err(e) => return Err(e.into()),
    };

    let body = include_res!(str, "/pages/rooms/room.html")
        .replace("{room_code}", code.as_str())
        .replace("{participants}", &room.participants.len().to_string())
        .replace("{user_name}", &res::escape(&identity.display_name));

    Ok(Html(body).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn search(
    State(store): State<RoomStore>,
    State(search): State<YouTubeSearch>,
    session: Session,
    Path(code): Path<String>,
    Query(SearchQuery { q }): Query<SearchQuery>,
) -> AppResult<Response> {
    let Some(identity) = session::identity(&session).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    let Some(code) = RoomCode::parse(&code) else {
        return res::sorry("Room not found.");
    };

    let results = search_room(&store, &search, &code, &identity, &q).await?;
    Ok(Json(results).into_response())
}

/// Searches on behalf of a participant of `code`.
async fn search_room(
    store: &RoomStore,
    search: &YouTubeSearch,
    code: &RoomCode,
    who: &Identity,
    q: &str,
) -> Result<Vec<VideoRef>, SyncError> {
    store.ensure_member(code, &who.uid).await?;
    tracing::debug!(%code, user = %who.uid, query = %q, "search");
    search.search(q).await
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use sqlx::sqlite::SqlitePoolOptions;

    use super::*;
    use crate::{db, sync::Hub};

    async fn store() -> RoomStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        db::migrate(&pool).await.unwrap();
        RoomStore::new(pool, Arc::new(Hub::new()), "Klv9ZSpjWPI")
    }

    fn ada() -> Identity {
        Identity { uid: "google.com:ada".to_owned(), display_name: "Ada".to_owned(), avatar: None }
    }

    #[tokio::test]
    async fn search_needs_an_existing_room() {
        let store = store().await;
        let search = YouTubeSearch::new(None, 8);
        let code = RoomCode::parse("JO-NOPE1").unwrap();

        let err = search_room(&store, &search, &code, &ada(), "lofi").await.unwrap_err();
        assert!(matches!(err, SyncError::RoomNotFound(_)));
    }

    #[tokio::test]
    async fn search_needs_membership() {
        let store = store().await;
        let search = YouTubeSearch::new(None, 8);
        let code = store.create_room(&ada()).await.unwrap();
        let eve = Identity { uid: "google.com:eve".to_owned(), display_name: "Eve".to_owned(), avatar: None };

        let err = search_room(&store, &search, &code, &eve, "lofi").await.unwrap_err();
        assert!(matches!(err, SyncError::WriteDenied));

        // blank queries short-circuit before any request
        assert!(search_room(&store, &search, &code, &ada(), "  ").await.unwrap().is_empty());
    }
}
