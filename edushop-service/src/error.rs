use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel_async::pooled_connection::PoolError;
use serde::Serialize;
use shared::ValidationError;
use thiserror::Error;
use uuid::Uuid;

/// Failures reported by a store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Could not connect to the database: {0}")]
    Connection(String),
    #[error("{0}")]
    Persistence(String),
    #[error("Lesson not found: {0}")]
    LessonNotFound(Uuid),
    #[error("Not enough spaces available for lesson: {subject}")]
    InsufficientSpace { subject: String },
}

impl From<diesel::result::Error> for StoreError {
    fn from(err: diesel::result::Error) -> Self {
        StoreError::Persistence(err.to_string())
    }
}

impl From<bb8::RunError<PoolError>> for StoreError {
    fn from(err: bb8::RunError<PoolError>) -> Self {
        StoreError::Connection(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Persistence(err.to_string())
    }
}

/// Errors surfaced by the HTTP layer.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Not enough spaces available for lesson: {0}")]
    Capacity(String),
    #[error("Lesson not found: {0}")]
    UnknownLesson(Uuid),
    #[error("{0}")]
    Connection(String),
    #[error("{0}")]
    Persistence(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Capacity(_) | AppError::UnknownLesson(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Response carrying the extra `success: false` flag used by the lesson
    /// creation endpoint.
    pub fn into_flagged_response(self) -> Response {
        self.respond(Some(false))
    }

    fn respond(self, success: Option<bool>) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        let body = ErrorResponse {
            error: self.to_string(),
            success,
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Connection(message) => AppError::Connection(message),
            StoreError::Persistence(message) => AppError::Persistence(message),
            StoreError::LessonNotFound(id) => AppError::UnknownLesson(id),
            StoreError::InsufficientSpace { subject } => AppError::Capacity(subject),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(ValidationError::Malformed(rejection.body_text()))
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(ValidationError::Malformed(rejection.body_text()))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.respond(None)
    }
}
