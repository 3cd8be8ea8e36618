//! Shared helpers for handlers.

use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::ChatError;

/// Build a standard JSON error response.
pub fn api_error(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": kind, "message": message.into() });
    (status, axum::Json(body)).into_response()
}

pub fn status_for(error: &ChatError) -> StatusCode {
    match error {
        ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
        ChatError::InvalidContent | ChatError::MalformedBody(_) => StatusCode::BAD_REQUEST,
        ChatError::UnknownPeer | ChatError::NotFound => StatusCode::NOT_FOUND,
        ChatError::Forbidden => StatusCode::FORBIDDEN,
        ChatError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ChatError::UploadFailed(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        api_error(status_for(&self), self.kind(), self.to_string())
    }
}

/// `Json` body extractor whose rejections use the API error format.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ChatError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ChatError::MalformedBody(rejection.body_text())),
        }
    }
}
