use axum::{debug_handler, extract::{ws::{Message as WsMessage, WebSocket}, Path, State, WebSocketUpgrade}, http::StatusCode, response::{IntoResponse, Response}};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_sessions::Session;
use uuid::Uuid;

use crate::{error::SyncError, res, rooms::msg, session, sync::{Identity, PlaybackState, PlayerEvent, QueueEntry, ReplySnapshot, RoomCode, SyncPolicy, VideoRef}, AppResult, AppState};

/// What a browser in the room can ask for.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Post {
        text: String,
        #[serde(default)]
        reply_to: Option<Uuid>,
    },
    Enqueue {
        video: VideoRef,
    },
    Select {
        video_id: String,
    },
    Player {
        event: PlayerEvent,
        #[serde(default)]
        seq: Option<i64>,
    },
}

/// Pushed to the browser. The first three always carry the whole view.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Messages { html: String, count: usize },
    Queue { entries: Vec<QueueEntry> },
    Playback { state: PlaybackState },
    Error { message: String },
}

#[debug_handler(state = AppState)]
pub(crate) async fn room_ws(
    Path(code): Path<String>,
    State(policy): State<SyncPolicy>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let Some(identity) = session::identity(&session).await? else {
        return Ok(StatusCode::UNAUTHORIZED.into_response());
    };
    let Some(code) = RoomCode::parse(&code) else {
        return res::sorry("Room not found.");
    };

    policy.store().join_room(&code, &identity).await?;

    Ok(ws.on_upgrade(move |socket| serve_socket(socket, policy, code, identity)))
}

async fn serve_socket(socket: WebSocket, policy: SyncPolicy, code: RoomCode, identity: Identity) {
    tracing::info!(%code, user = %identity.uid, "connected");

    let (mut sender, mut receiver) = socket.split();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<ServerEvent>();

    let mut messages = policy.store().subscribe_messages(&code);
    let mut queue = policy.store().subscribe_queue(&code);
    let mut playback = policy.store().subscribe_playback(&code);

    let push_code = code.clone();
    let push_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                Some(update) = messages.next() => update.map(|messages| ServerEvent::Messages {
                    html: msg::messages_to_html(&messages),
                    count: messages.len(),
                }),
                Some(update) = queue.next() => update.map(|entries| ServerEvent::Queue { entries }),
                Some(update) = playback.next() => update.map(|state| ServerEvent::Playback { state }),
                Some(event) = reply_rx.recv() => Ok(event),
                else => break,
            };

            let event = event.unwrap_or_else(|e| {
                tracing::warn!(code = %push_code, error = %e, "snapshot failed");
                ServerEvent::Error { message: e.to_string() }
            });
            let Ok(text) = serde_json::to_string(&event) else {
                continue;
            };
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(frame)) = receiver.next().await {
        let command = match frame {
            WsMessage::Text(text) => serde_json::from_str::<ClientCommand>(text.as_str()),
            WsMessage::Close(_) => break,
            _ => continue,
        };

        let result = match command {
            Ok(command) => handle_command(&policy, &code, &identity, command).await,
            Err(e) => {
                let _ = reply_tx.send(ServerEvent::Error { message: format!("bad command: {e}") });
                continue;
            }
        };

        if let Err(e) = result {
            tracing::warn!(%code, user = %identity.uid, error = %e, "command failed");
            let _ = reply_tx.send(ServerEvent::Error { message: e.to_string() });
        }
    }

    push_task.abort();
    tracing::info!(%code, user = %identity.uid, "disconnected");
}

pub(crate) async fn handle_command(
    policy: &SyncPolicy,
    code: &RoomCode,
    who: &Identity,
    command: ClientCommand,
) -> Result<(), SyncError> {
    match command {
        ClientCommand::Post { text, reply_to } => {
            let reply_to = match reply_to {
                Some(id) => policy.store().message(code, id).await?.as_ref().map(ReplySnapshot::of),
                None => None,
            };
            policy.store().post_message(code, who, &text, reply_to).await.map(|_| ())
        }
        ClientCommand::Enqueue { video } => policy.store().enqueue(code, who, &video).await.map(|_| ()),
        ClientCommand::Select { video_id } => policy.select_video(code, who, &video_id).await,
        ClientCommand::Player { event, seq } => policy.player_reported(code, who, event, seq).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_from_tagged_json() {
        let post: ClientCommand = serde_json::from_str(r#"{"type":"post","text":"hi"}"#).unwrap();
        assert_eq!(post, ClientCommand::Post { text: "hi".to_owned(), reply_to: None });

        let ended: ClientCommand =
            serde_json::from_str(r#"{"type":"player","event":"ended","seq":3}"#).unwrap();
        assert_eq!(ended, ClientCommand::Player { event: PlayerEvent::Ended, seq: Some(3) });

        let paused: ClientCommand = serde_json::from_str(r#"{"type":"player","event":"paused"}"#).unwrap();
        assert_eq!(paused, ClientCommand::Player { event: PlayerEvent::Paused, seq: None });

        let enqueue: ClientCommand = serde_json::from_str(
            r#"{"type":"enqueue","video":{"video_id":"xyz123","title":"lofi","thumbnail":"t.jpg"}}"#,
        )
        .unwrap();
        assert!(matches!(enqueue, ClientCommand::Enqueue { video } if video.video_id == "xyz123"));
    }

    #[test]
    fn events_are_tagged() {
        let event = ServerEvent::Playback {
            state: PlaybackState { current_video_id: Some("xyz123".to_owned()), playing: false, seq: 7 },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "playback");
        assert_eq!(json["state"]["seq"], 7);
        assert_eq!(json["state"]["current_video_id"], "xyz123");
        assert_eq!(json["state"]["playing"], false);
    }
}
