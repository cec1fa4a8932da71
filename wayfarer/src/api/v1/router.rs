use axum::{
    routing::{get, post},
    Router,
};

use crate::api::state::AppState;

use super::handlers;

pub fn v1_router() -> Router<AppState> {
    let sessions = Router::new()
        .route("/", post(handlers::chat::start_chat))
        .route("/stream", post(handlers::chat::start_chat_stream))
        .route(
            "/{sessionId}",
            get(handlers::chat::get_session).delete(handlers::chat::close_session),
        )
        .route("/{sessionId}/messages", post(handlers::chat::continue_chat))
        .route(
            "/{sessionId}/messages/stream",
            post(handlers::chat::continue_chat_stream),
        );

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/chat/sessions", sessions)
}
