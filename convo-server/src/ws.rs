//! WebSocket chat: one turn per inbound text frame

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::state::AppState;

/// Outbound frame for a completed turn
#[derive(Debug, Serialize, Deserialize)]
pub struct WsReply {
    pub response: String,
    pub session_id: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    info!(session_id, "WebSocket connected");
    let (mut write, mut read) = socket.split();

    while let Some(frame) = read.next().await {
        let content = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        match state.agent.chat(&session_id, &content).await {
            Ok(response) => {
                let reply = WsReply {
                    response,
                    session_id: session_id.clone(),
                };
                let payload = match serde_json::to_string(&reply) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!(session_id, "Failed to encode reply: {}", e);
                        break;
                    }
                };
                if write.send(Message::Text(payload)).await.is_err() {
                    debug!(session_id, "Client went away before reply was sent");
                    break;
                }
            }
            Err(e) => {
                error!(session_id, "Turn failed, closing socket: {}", e);
                let _ = write
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::ERROR,
                        reason: "turn failed".into(),
                    })))
                    .await;
                break;
            }
        }
    }

    info!(session_id, "WebSocket disconnected");
}
