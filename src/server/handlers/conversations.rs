//! Conversation handlers: sidebar peers, history, and sending.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::assets::upload_or_raw;
use crate::error::ChatError;
use crate::logging;
use crate::server::auth::AuthUser;
use crate::server::state::AppState;
use crate::server::utils::ApiJson;
use crate::types::{MessageContent, UserId};

pub async fn list_peers_handler(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Response, ChatError> {
    let peers = state.users.list_peers(&me).await?;
    Ok((StatusCode::OK, Json(peers)).into_response())
}

pub async fn history_handler(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(peer_id): Path<String>,
) -> Result<Response, ChatError> {
    let peer = UserId(peer_id);
    let messages = state.messages().history(&me, &peer).await?;
    Ok((StatusCode::OK, Json(messages)).into_response())
}

pub async fn send_message_handler(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(peer_id): Path<String>,
    ApiJson(content): ApiJson<MessageContent>,
) -> Response {
    let peer = UserId(peer_id);
    if content.is_empty() {
        return ChatError::InvalidContent.into_response();
    }

    match state.users.get_user(&peer).await {
        Ok(Some(_)) => {}
        Ok(None) => return ChatError::UnknownPeer.into_response(),
        Err(e) => return e.into_response(),
    }

    // Offload inline media; a failed upload keeps the raw reference.
    let content = content.normalized();
    let image_ref = match content.image_ref {
        Some(raw) => Some(upload_or_raw(state.asset_store(), raw).await),
        None => None,
    };
    let audio_ref = match content.audio_ref {
        Some(raw) => Some(upload_or_raw(state.asset_store(), raw).await),
        None => None,
    };
    let content = MessageContent {
        text: content.text,
        image_ref,
        audio_ref,
    };

    match state.pipeline.send_message(&me, &peer, content).await {
        Ok(outcome) => {
            let body = serde_json::json!({
                "message": outcome.message,
                "delivered": outcome.delivered,
            });
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => {
            tracing::warn!(
                "send: {} to {} rejected: {}",
                logging::user_id(me.as_str()),
                logging::user_id(peer.as_str()),
                e
            );
            e.into_response()
        }
    }
}
