use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use convo_agent::AgentError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors returned by API handlers, rendered as `{"detail": ...}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        if e.is_not_found() {
            ApiError::NotFound(e.to_string())
        } else {
            ApiError::Internal(e.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
