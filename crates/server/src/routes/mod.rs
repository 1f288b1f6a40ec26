pub mod conversations;
pub mod files;

use crate::ws;
use crate::AppState;
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;

pub fn build_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Conversations
        .route("/conversations", post(conversations::open_conversation))
        .route("/conversations", get(conversations::list_conversations))
        .route(
            "/conversations/{conversationId}",
            get(conversations::get_conversation),
        )
        .route(
            "/conversations/{conversationId}",
            delete(conversations::deactivate_conversation),
        )
        .route(
            "/conversations/{conversationId}/messages",
            get(conversations::list_messages),
        )
        .route(
            "/conversations/{conversationId}/read",
            post(conversations::mark_conversation_read),
        )
        .route(
            "/conversations/{conversationId}/mute",
            post(conversations::set_mute),
        )
        .route(
            "/conversations/{conversationId}/files",
            get(conversations::list_files),
        )
        // Messages
        .route(
            "/messages/{messageId}/read",
            post(conversations::mark_message_read),
        )
        // Files
        .route("/upload", post(files::upload))
        .route("/files/{id}/{filename}", get(files::serve_file));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws/chat/{conversationId}", get(ws::handler::ws_handler))
        .with_state(state)
}
