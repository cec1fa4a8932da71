//! # V1 API Response Envelope
//!
//! Every non-streaming v1 endpoint returns an [`ApiResponse<T>`]:
//!
//! ```json
//! {
//!   "data": { ... },                                   // present on success
//!   "error": { "code": "not_found", "message": "..." } // present on error
//! }
//! ```
//!
//! Streaming endpoints answer with `text/event-stream` once the turn has been
//! accepted; a turn rejected up front still gets this envelope.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::WayfarerError;

/// Machine-readable error code included in every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// HTTP 400.
    InvalidRequest,
    /// HTTP 401.
    Unauthorized,
    /// HTTP 404.
    NotFound,
    /// The session is closed or expired. HTTP 409.
    Conflict,
    /// The session's city could not be resolved. HTTP 422.
    Unprocessable,
    /// HTTP 429.
    RateLimited,
    /// Internal details are never leaked to the client. HTTP 500.
    InternalError,
    /// The text-generation provider failed. HTTP 502.
    UpstreamError,
    /// A required provider is not configured. HTTP 503.
    Unavailable,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidRequest => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Conflict => StatusCode::CONFLICT,
            Self::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamError => StatusCode::BAD_GATEWAY,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,

    /// Not serialized on the wire.
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: StatusCode::OK,
        }
    }

    pub fn created(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
            status: StatusCode::CREATED,
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        let status = code.status();
        Self {
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
            status,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status = self.status;
        match serde_json::to_value(&self) {
            Ok(body) => (status, Json(body)).into_response(),
            Err(_) => {
                let body = serde_json::json!({
                    "error": {
                        "code": "internal_error",
                        "message": "An internal error occurred"
                    }
                });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

fn rate_limit_message(retry_after: Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!("Rate limit exceeded, retry after {secs} seconds"),
        None => "Rate limit exceeded".to_string(),
    }
}

impl<T: Serialize> From<WayfarerError> for ApiResponse<T> {
    /// Internal error details are never leaked; they are logged instead.
    fn from(err: WayfarerError) -> Self {
        match err {
            WayfarerError::NotFound(ref msg) => {
                ApiResponse::error(ErrorCode::NotFound, format!("Not found: {msg}"))
            }
            WayfarerError::Validation(ref msg) => {
                ApiResponse::error(ErrorCode::InvalidRequest, msg.clone())
            }
            WayfarerError::Json(ref e) => {
                ApiResponse::error(ErrorCode::InvalidRequest, format!("Invalid JSON: {e}"))
            }
            WayfarerError::SessionInactive(_) => {
                ApiResponse::error(ErrorCode::Conflict, err.to_string())
            }
            WayfarerError::CityNotResolved(_) => {
                ApiResponse::error(ErrorCode::Unprocessable, err.to_string())
            }
            WayfarerError::ApiAuth(_) => {
                ApiResponse::error(ErrorCode::Unauthorized, "Authentication required")
            }
            WayfarerError::ApiRateLimit { retry_after }
            | WayfarerError::LlmRateLimit { retry_after } => {
                ApiResponse::error(ErrorCode::RateLimited, rate_limit_message(retry_after))
            }
            WayfarerError::LlmUnavailable(ref msg) | WayfarerError::Classifier(ref msg) => {
                ApiResponse::error(ErrorCode::Unavailable, msg.clone())
            }
            WayfarerError::Llm(_) | WayfarerError::Generation(_) | WayfarerError::Http(_) => {
                tracing::warn!(error = %err, "Upstream error mapped to v1 response");
                ApiResponse::error(ErrorCode::UpstreamError, "The travel assistant is unavailable")
            }
            ref internal @ (WayfarerError::Database(_)
            | WayfarerError::Embedding(_)
            | WayfarerError::Io(_)
            | WayfarerError::Internal(_)) => {
                tracing::error!(error = %internal, "Internal error mapped to v1 response");
                ApiResponse::error(ErrorCode::InternalError, "An internal error occurred")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_omits_error() {
        let json = serde_json::to_value(ApiResponse::success(42)).unwrap();
        assert_eq!(json["data"], 42);
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_mapping() {
        let resp: ApiResponse<()> = WayfarerError::SessionInactive("s1".into()).into();
        assert_eq!(resp.status, StatusCode::CONFLICT);
        assert_eq!(resp.error.unwrap().code, ErrorCode::Conflict);

        let resp: ApiResponse<()> = WayfarerError::Internal("secret detail".into()).into();
        assert_eq!(resp.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(resp.error.unwrap().message, "An internal error occurred");

        let resp: ApiResponse<()> = WayfarerError::Validation("message is required".into()).into();
        assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    }
}
