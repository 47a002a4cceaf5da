//! API request handlers

pub mod campaigns;
pub mod channels;
pub mod conversations;
pub mod health;
pub mod metrics;
pub mod webhooks;

use axum::{http::StatusCode, Json};
use serde::Serialize;

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler error: status plus JSON body
pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub(crate) fn api_error(status: StatusCode, error: &str, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.into(),
        }),
    )
}

/// Map a shared error onto its HTTP status and code
pub(crate) fn from_common(e: parley_common::Error) -> ApiError {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %e, "Request failed");
        return api_error(status, &e.code().to_ascii_lowercase(), "Internal server error");
    }
    api_error(status, &e.code().to_ascii_lowercase(), e.to_string())
}
