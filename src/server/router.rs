//! Axum router construction.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, put};
use axum::Router;

use crate::server::config::MAX_BODY_SIZE;
use crate::server::handlers;
use crate::server::state::AppState;

/// Build the complete Axum router with all API routes and the live channel.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health::health_handler))
        // Own profile / presence
        .route("/api/me", get(handlers::profile::me_handler))
        .route(
            "/api/profile",
            put(handlers::profile::update_profile_handler),
        )
        .route("/api/presence", get(handlers::profile::presence_handler))
        // Conversations API
        .route(
            "/api/conversations/peers",
            get(handlers::conversations::list_peers_handler),
        )
        .route(
            "/api/conversations/:peer_id/messages",
            get(handlers::conversations::history_handler)
                .post(handlers::conversations::send_message_handler),
        )
        .route(
            "/api/messages/:message_id",
            delete(handlers::messages::delete_message_handler),
        )
        // Live channel
        .route("/api/ws", get(handlers::websocket::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}
