pub mod auth;
pub mod envelope;
pub mod http;
pub mod state;
pub mod ws;

pub use state::AppState;

use axum::routing::{get, patch, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Assembles the hub's HTTP + WebSocket surface (§6). Mirrors the shape of
/// the teacher's `build_router`, minus the dashboard static-file fallback —
/// this service has no browser UI to serve.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(http::health::health))
        .route("/ws", get(ws::ws_handler))
        .route(
            "/channels",
            get(http::mutations::list_channels).post(http::mutations::create_channel),
        )
        .route(
            "/channels/{channel_id}/topics",
            get(http::mutations::list_topics).post(http::mutations::create_topic),
        )
        .route("/topics/{topic_id}", patch(http::mutations::rename_topic))
        .route(
            "/topics/{topic_id}/messages",
            get(http::mutations::list_messages).post(http::mutations::send_message),
        )
        .route(
            "/messages/{message_id}",
            patch(http::mutations::edit_message).delete(http::mutations::delete_message),
        )
        .route(
            "/messages/{message_id}/retopic",
            post(http::mutations::retopic_message),
        )
        .route(
            "/topics/{topic_id}/attachments",
            get(http::mutations::list_attachments).post(http::mutations::add_attachment),
        )
        .fallback(fallback_404)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn fallback_404() -> axum::http::StatusCode {
    axum::http::StatusCode::NOT_FOUND
}
