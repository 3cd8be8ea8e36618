//! Live channel: WebSocket upgrade and per-connection event loop.

use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use serde::Deserialize;

use crate::logging;
use crate::presence::ConnectionHandle;
use crate::server::auth::AuthUser;
use crate::server::config::{LIVE_QUEUE_CAPACITY, LIVE_WRITE_TIMEOUT};
use crate::server::state::AppState;
use crate::types::{LiveEvent, UserId};

/// Frames a client may send on the live channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum ClientFrame {
    Logout,
}

/// Authentication runs as an extractor, so an unauthenticated upgrade is
/// refused with 401 before any connection is registered.
pub async fn ws_handler(
    AuthUser(user): AuthUser,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| live_connection(socket, state, user))
}

async fn send_event(socket: &mut WebSocket, event: &LiveEvent) -> bool {
    let json = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("live: failed to encode event: {}", e);
            return true;
        }
    };
    matches!(
        tokio::time::timeout(LIVE_WRITE_TIMEOUT, socket.send(WsMessage::Text(json))).await,
        Ok(Ok(()))
    )
}

async fn live_connection(mut socket: WebSocket, state: AppState, user: UserId) {
    let presence = Arc::clone(state.presence());
    let (handle, mut rx) = ConnectionHandle::new(LIVE_QUEUE_CAPACITY);
    let connection = handle.id();
    presence.register(&user, handle);
    tracing::info!(
        "live: {} connected ({:?})",
        logging::user_id(user.as_str()),
        connection
    );

    let snapshot = LiveEvent::PresenceSnapshot {
        online: presence.list_online().into_iter().collect(),
    };
    let mut open = send_event(&mut socket, &snapshot).await;

    while open {
        tokio::select! {
            event = rx.recv() => {
                match event {
                    Some(event) => {
                        if !send_event(&mut socket, &event).await {
                            tracing::debug!(
                                "live: write to {} failed or timed out",
                                logging::user_id(user.as_str())
                            );
                            open = false;
                        }
                    }
                    // Sender dropped: the registry evicted this connection.
                    None => open = false,
                }
            }
            frame = socket.recv() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::Logout) => {
                                tracing::info!("live: {} logged out", logging::user_id(user.as_str()));
                                let _ = socket.send(WsMessage::Close(None)).await;
                                open = false;
                            }
                            Err(_) => {
                                tracing::debug!("live: ignoring unrecognised client frame");
                            }
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => open = false,
                    // Pings are answered by the protocol layer.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    presence.unregister(&user, connection);
    tracing::info!(
        "live: {} disconnected ({:?})",
        logging::user_id(user.as_str()),
        connection
    );
}
