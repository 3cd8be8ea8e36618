//! Request authentication extractor.
//!
//! Looks for a credential token in, in order: an `Authorization: Bearer`
//! header, the `jwt` cookie, and the `token` query parameter (browsers cannot
//! set headers on websocket upgrades).

use axum::async_trait;
use axum::extract::{FromRequestParts, Query};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;

use crate::error::ChatError;
use crate::server::state::AppState;
use crate::types::UserId;

const SESSION_COOKIE: &str = "jwt";

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserId);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

fn cookie_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

fn query_token(parts: &Parts) -> Option<String> {
    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
}

pub(crate) fn request_token(parts: &Parts) -> Option<String> {
    bearer_token(parts)
        .or_else(|| cookie_token(parts))
        .or_else(|| query_token(parts))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(token) = request_token(parts) else {
            return Err(ChatError::Unauthorized.into_response());
        };
        state
            .auth
            .authenticate(&token)
            .await
            .map(AuthUser)
            .map_err(IntoResponse::into_response)
    }
}
