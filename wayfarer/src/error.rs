use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WayfarerError {
    #[error("Database error: {0}")]
    Database(#[from] libsql::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API rate limit exceeded, retry after {retry_after:?} seconds")]
    ApiRateLimit { retry_after: Option<u64> },

    #[error("API authentication error: {0}")]
    ApiAuth(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),

    #[error("LLM rate limit exceeded, retry after {retry_after:?} seconds")]
    LlmRateLimit { retry_after: Option<u64> },

    #[error("Session {0} is not active")]
    SessionInactive(String),

    #[error("Could not resolve city: {0}")]
    CityNotResolved(String),

    #[error("Intent classification failed: {0}")]
    Classifier(String),

    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl WayfarerError {
    /// Status code used both by the HTTP layer and by error stream events.
    pub fn status(&self) -> StatusCode {
        match self {
            WayfarerError::NotFound(_) => StatusCode::NOT_FOUND,
            WayfarerError::Validation(_) => StatusCode::BAD_REQUEST,
            WayfarerError::Json(_) => StatusCode::BAD_REQUEST,
            WayfarerError::SessionInactive(_) => StatusCode::CONFLICT,
            WayfarerError::CityNotResolved(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WayfarerError::ApiRateLimit { .. } | WayfarerError::LlmRateLimit { .. } => {
                StatusCode::TOO_MANY_REQUESTS
            }
            WayfarerError::ApiAuth(_) => StatusCode::UNAUTHORIZED,
            WayfarerError::Http(_) | WayfarerError::Llm(_) | WayfarerError::Generation(_) => {
                StatusCode::BAD_GATEWAY
            }
            WayfarerError::LlmUnavailable(_) | WayfarerError::Classifier(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            WayfarerError::Database(_)
            | WayfarerError::Embedding(_)
            | WayfarerError::Io(_)
            | WayfarerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WayfarerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            WayfarerError::NotFound(msg)
            | WayfarerError::Validation(msg)
            | WayfarerError::Embedding(msg)
            | WayfarerError::ApiAuth(msg)
            | WayfarerError::Llm(msg)
            | WayfarerError::LlmUnavailable(msg)
            | WayfarerError::Classifier(msg)
            | WayfarerError::Generation(msg)
            | WayfarerError::Internal(msg) => msg.clone(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, WayfarerError>;
