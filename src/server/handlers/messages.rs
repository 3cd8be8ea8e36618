//! Message deletion.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::error::ChatError;
use crate::logging;
use crate::server::auth::AuthUser;
use crate::server::state::AppState;
use crate::types::MessageId;

pub async fn delete_message_handler(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    Path(message_id): Path<String>,
) -> Response {
    let Ok(id) = message_id.parse::<i64>().map(MessageId) else {
        return ChatError::NotFound.into_response();
    };

    match state.messages().delete_own(id, &me).await {
        Ok(()) => {
            tracing::info!(
                "delete: {} removed by {}",
                logging::msg_id(id.0),
                logging::user_id(me.as_str())
            );
            (
                StatusCode::OK,
                axum::Json(serde_json::json!({ "status": "deleted" })),
            )
                .into_response()
        }
        Err(e) => e.into_response(),
    }
}
