mod lobby;
mod msg;
mod room;
mod ws;

use axum::{routing::{get, post}, Router};

use crate::AppState;

pub use msg::{messages_to_html, msg_to_html};
pub use ws::{ClientCommand, ServerEvent};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", get(lobby::lobby))
        .route("/rooms/new", post(lobby::new_room))
        .route("/rooms/join", post(lobby::join_room))
        .route("/chat/{code}", get(room::room))
        .route("/chat/{code}/search", get(room::search))
        .route("/chat/{code}/ws", get(ws::room_ws))
}
