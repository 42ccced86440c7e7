//! WebSocket fan-out of live auction updates.
//!
//! Each connection subscribes to the broadcast channel and forwards updates
//! as JSON. Delivery is best-effort: a lagging client skips missed updates
//! and learns the current state on its next poll.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::State,
    response::Response,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::AppState;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    let Some(mut rx) = state.updates.subscribe() else {
        // Live updates disabled in this process.
        let _ = socket.send(Message::Close(None)).await;
        return;
    };

    loop {
        tokio::select! {
            update = rx.recv() => {
                match update {
                    Ok(update) => {
                        let msg = serde_json::to_string(&update)
                            .unwrap_or_else(|_| "{}".to_string());
                        if socket.send(Message::Text(msg)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "websocket client lagged behind auction updates");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Text(text))) if text == "ping" => {
                        let _ = socket.send(Message::Text("pong".to_string())).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
