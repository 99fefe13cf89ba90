use std::fmt::Display;

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("invalid encoder options: {0}")]
    InvalidOptions(String),
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("encoder already running: {0}")]
    AlreadyRunning(String),
    #[error("failed to spawn encoder: {0}")]
    SpawnFailure(String),
    #[error("external dependency unavailable: {0}")]
    DependencyUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(?status, error = %self);
        } else {
            tracing::debug!(?status, error = %self);
        }

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidRequest(_) | AppError::InvalidOptions(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::AlreadyRunning(_) => StatusCode::CONFLICT,
            AppError::DependencyUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::SpawnFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn invalid_request(message: impl Display) -> Self {
        Self::InvalidRequest(message.to_string())
    }

    pub fn invalid_options(message: impl Display) -> Self {
        Self::InvalidOptions(message.to_string())
    }

    pub fn not_found(resource: impl Display) -> Self {
        Self::NotFound(resource.to_string())
    }

    pub fn already_running(source: impl Display) -> Self {
        Self::AlreadyRunning(source.to_string())
    }

    pub fn spawn_failure(message: impl Display) -> Self {
        Self::SpawnFailure(message.to_string())
    }

    pub fn dependency(message: impl Display) -> Self {
        Self::DependencyUnavailable(message.to_string())
    }
}
