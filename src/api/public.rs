//! Public API types

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use serde_json::json;

use crate::core::ChatError;

// Errors

pub struct ApiError(anyhow::Error);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.downcast_ref::<ChatError>() {
            Some(err) => status_for(err),
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn status_for(err: &ChatError) -> StatusCode {
    match err {
        ChatError::Unauthorized => StatusCode::UNAUTHORIZED,
        ChatError::QuotaExceeded { .. } => StatusCode::FORBIDDEN,
        ChatError::SessionNotFound(_) => StatusCode::NOT_FOUND,
        ChatError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        ChatError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Upstream(_)
        | ChatError::EmptyResponse
        | ChatError::Persistence(_)
        | ChatError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Convert `ApiError` into an Axum compatible response with a
/// `{"detail": ...}` body.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Always log the error
        if status.is_server_error() {
            tracing::error!("{}", self.0);
        } else {
            tracing::info!("Request rejected ({}): {}", status, self.0);
        }

        // Only errors from the taxonomy are shown to the caller, and
        // never the internals of the key file
        let detail = match self.0.downcast_ref::<ChatError>() {
            Some(ChatError::Persistence(_) | ChatError::Config(_)) | None => {
                String::from("Something went wrong")
            }
            Some(err) => err.to_string(),
        };

        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

/// Enables using `?` on functions that return `Result<_,
/// anyhow::Error>` or `Result<_, ChatError>` to turn them into
/// `Result<_, ApiError>`
impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

// Re-export public types from each route

pub mod auth {
    pub use crate::api::routes::auth::public::*;
}

pub mod chat {
    pub use crate::api::routes::chat::public::*;
}
