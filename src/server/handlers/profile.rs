//! Own-profile and presence endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use crate::assets::upload_or_raw;
use crate::error::ChatError;
use crate::server::auth::AuthUser;
use crate::server::state::AppState;
use crate::server::utils::ApiJson;

pub async fn me_handler(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
) -> Result<Response, ChatError> {
    // A valid session for a user that no longer exists is as good as none.
    let profile = state.users.get_user(&me).await?.ok_or(ChatError::Unauthorized)?;
    Ok((StatusCode::OK, Json(profile)).into_response())
}

#[derive(Deserialize)]
pub struct UpdateProfileRequest {
    #[serde(default, alias = "profilePic")]
    avatar: Option<String>,
}

pub async fn update_profile_handler(
    State(state): State<AppState>,
    AuthUser(me): AuthUser,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> Result<Response, ChatError> {
    let Some(raw) = req.avatar.filter(|a| !a.trim().is_empty()) else {
        return Err(ChatError::InvalidContent);
    };
    let url = upload_or_raw(state.asset_store(), raw).await;
    let profile = state.users.update_avatar(&me, &url).await?;
    Ok((StatusCode::OK, Json(profile)).into_response())
}

pub async fn presence_handler(State(state): State<AppState>, _me: AuthUser) -> Response {
    let online = state.presence().list_online();
    (StatusCode::OK, Json(serde_json::json!({ "online": online }))).into_response()
}
