use axum::{debug_handler, extract::State, response::{Html, IntoResponse, Redirect, Response}, Form};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{error::SyncError, include_res, res, session, sync::{RoomCode, RoomStore}, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub(crate) struct JoinForm {
    code: String,
}

#[debug_handler]
pub(crate) async fn lobby(session: Session) -> AppResult<Response> {
    let Some(identity) = session::identity(&session).await? else {
        return Ok(Redirect::to(&session::login_redirect("/rooms")).into_response());
    };

    Ok(Html(
        include_res!(str, "/pages/rooms/lobby.html")
            .replace("{name}", &res::escape(&identity.display_name))
    ).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn new_room(
    State(store): State<RoomStore>,
    session: Session,
) -> AppResult<Response> {
    let Some(identity) = session::identity(&session).await? else {
        return Ok(Redirect::to(&session::login_redirect("/rooms")).into_response());
    };

    let code = store.create_room(&identity).await?;
    Ok(Redirect::to(&format!("/chat/{code}")).into_response())
}

#[debug_handler(state = AppState)]
pub(crate) async fn join_room(
    State(store): State<RoomStore>,
    session: Session,

    Form(JoinForm { code }): Form<JoinForm>,
) -> AppResult<Response> {
    let Some(identity) = session::identity(&session).await? else {
        return Ok(Redirect::to(&session::login_redirect("/rooms")).into_response());
    };

    let Some(code) = RoomCode::parse(&code) else {
        return res::sorry("Enter a room code.");
    };

    match store.join_room(&code, &identity).await {
        Ok(_) => Ok(Redirect::to(&format!("/chat/{code}")).into_response()),
        Err(SyncError::RoomNotFound(_)) => res::sorry("Room not found."),
        Err(e) => Err(e.into()),
    }
}
