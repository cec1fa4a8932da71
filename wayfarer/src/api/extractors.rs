use axum::extract::rejection::JsonRejection;
use axum::extract::FromRequest;

use crate::error::WayfarerError;

/// `axum::Json` whose rejections become [`WayfarerError::Validation`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(WayfarerError))]
pub struct AppJson<T>(pub T);

impl From<JsonRejection> for WayfarerError {
    fn from(rejection: JsonRejection) -> Self {
        map_json_rejection(rejection)
    }
}

fn map_json_rejection(rejection: JsonRejection) -> WayfarerError {
    match rejection {
        JsonRejection::JsonDataError(err) => {
            let message = err.body_text();
            if let Some(field) = extract_missing_field(&message) {
                WayfarerError::Validation(format!("Missing required field: {field}"))
            } else {
                WayfarerError::Validation(format!("Invalid JSON: {message}"))
            }
        }
        JsonRejection::JsonSyntaxError(err) => {
            WayfarerError::Validation(format!("JSON syntax error: {err}"))
        }
        JsonRejection::MissingJsonContentType(_) => {
            WayfarerError::Validation("Missing `Content-Type: application/json` header".to_string())
        }
        JsonRejection::BytesRejection(_) => {
            WayfarerError::Internal("Failed to read request body".to_string())
        }
        _ => WayfarerError::Validation(rejection.to_string()),
    }
}

fn extract_missing_field(message: &str) -> Option<&str> {
    let prefix = "missing field `";
    let start = message.find(prefix)? + prefix.len();
    let remaining = message.get(start..)?;
    let end = remaining.find('`')?;
    remaining.get(..end)
}
