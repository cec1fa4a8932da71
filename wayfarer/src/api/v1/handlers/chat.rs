//! v1 Chat handlers.
//!
//! Every turn is offered twice: a streaming variant answering with
//! `text/event-stream`, and a synchronous variant that waits for the turn to
//! finish and returns the final snapshot in the JSON envelope.

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::http::{HeaderName, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use tokio_util::sync::CancellationToken;

use crate::api::extractors::AppJson;
use crate::api::v1::dto::{
    ChatTurnResponse, ContinueChatBody, SessionResponse, StartChatBody,
};
use crate::api::v1::response::ApiResponse;
use crate::api::AppState;
use crate::services::TurnStream;

pub(crate) const SESSION_HEADER: &str = "x-session-id";

/// `POST /api/v1/chat/sessions`
pub async fn start_chat(
    State(state): State<AppState>,
    AppJson(body): AppJson<StartChatBody>,
) -> ApiResponse<ChatTurnResponse> {
    match state.chat.start_chat(body.into()).await {
        Ok(result) => ApiResponse::created(ChatTurnResponse::from(result)),
        Err(e) => e.into(),
    }
}

/// `POST /api/v1/chat/sessions/stream`
pub async fn start_chat_stream(
    State(state): State<AppState>,
    AppJson(body): AppJson<StartChatBody>,
) -> Response {
    let cancel = CancellationToken::new();
    match state.chat.start_chat_stream(body.into(), cancel.clone()) {
        Ok(turn) => sse_response(turn, cancel),
        Err(e) => ApiResponse::<()>::from(e).into_response(),
    }
}

/// `POST /api/v1/chat/sessions/{sessionId}/messages`
pub async fn continue_chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    AppJson(body): AppJson<ContinueChatBody>,
) -> ApiResponse<ChatTurnResponse> {
    match state.chat.continue_chat(body.into_request(session_id)).await {
        Ok(result) => ApiResponse::success(ChatTurnResponse::from(result)),
        Err(e) => e.into(),
    }
}

/// `POST /api/v1/chat/sessions/{sessionId}/messages/stream`
pub async fn continue_chat_stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    AppJson(body): AppJson<ContinueChatBody>,
) -> Response {
    let cancel = CancellationToken::new();
    match state
        .chat
        .continue_chat_stream(body.into_request(session_id), cancel.clone())
    {
        Ok(turn) => sse_response(turn, cancel),
        Err(e) => ApiResponse::<()>::from(e).into_response(),
    }
}

/// `GET /api/v1/chat/sessions/{sessionId}`
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResponse<SessionResponse> {
    match state.chat.get_session(&session_id).await {
        Ok(session) => ApiResponse::success(SessionResponse::from(session)),
        Err(e) => e.into(),
    }
}

/// `DELETE /api/v1/chat/sessions/{sessionId}`
pub async fn close_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResponse<SessionResponse> {
    match state.chat.close_session(&session_id).await {
        Ok(session) => ApiResponse::success(SessionResponse::from(session)),
        Err(e) => e.into(),
    }
}

/// Forwards a turn's events as SSE frames. Dropping the response body (client
/// disconnect) cancels the turn.
fn sse_response(turn: TurnStream, cancel: CancellationToken) -> Response {
    let TurnStream {
        session_id,
        mut events,
    } = turn;

    let stream = async_stream::stream! {
        let guard = cancel.drop_guard();
        while let Some(event) = events.recv().await {
            let frame = Event::default()
                .event(event.event_type.to_string())
                .id(event.event_id.clone())
                .json_data(&event);
            match frame {
                Ok(frame) => yield Ok::<Event, Infallible>(frame),
                Err(e) => tracing::warn!(error = %e, "Failed to encode stream event"),
            }
        }
        guard.disarm();
    };

    let mut response = Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response();
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_HEADER), value);
    }
    response
}
