//! HTTP error mapping.

use axum::{http::StatusCode, response::IntoResponse, Json};
use tracing::error;

/// Error returned by every handler, rendered as `{ "error": message }`.
#[derive(Debug)]
pub enum ApiError {
    Internal(hoard_core::Error),
    NotFound(String),
    BadRequest(String),
    /// The media extraction service failed or answered with something unusable.
    BadGateway(String),
}

impl From<hoard_core::Error> for ApiError {
    fn from(err: hoard_core::Error) -> Self {
        match &err {
            hoard_core::Error::NotFound(msg) => ApiError::NotFound(msg.clone()),
            hoard_core::Error::InvalidInput(msg) => ApiError::BadRequest(msg.clone()),
            hoard_core::Error::Extraction { .. } | hoard_core::Error::Request(_) => {
                ApiError::BadGateway(err.report())
            }
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Internal(err) => {
                error!(error = %err.report(), "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
