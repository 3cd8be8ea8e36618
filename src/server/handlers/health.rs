//! Health check endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::server::state::AppState;

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let presence = state.presence();
    let body = serde_json::json!({
        "status": "ok",
        "online_users": presence.list_online().len(),
        "connections": presence.connection_count(),
    });
    (StatusCode::OK, axum::Json(body))
}
