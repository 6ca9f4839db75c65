//! API error types and JSON error response formatting.
//!
//! Every error response has the body `{"error": <code>, "message": <text>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use medchat_chat::orchestrator::{PERSISTENCE_FAILURE_TEXT, UNKNOWN_USER_TEXT};
use medchat_chat::ChatError;
use medchat_core::error::MedchatError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid input.
    BadRequest(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::UnknownUser(_) => ApiError::BadRequest(UNKNOWN_USER_TEXT.to_string()),
            ChatError::Persistence(_) => ApiError::Internal(PERSISTENCE_FAILURE_TEXT.to_string()),
            ChatError::Storage(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<MedchatError> for ApiError {
    fn from(err: MedchatError) -> Self {
        match err {
            MedchatError::InvalidReference(msg) => ApiError::BadRequest(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
