//! Unified error handling for the server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use threadline_engine::Error as EngineError;

/// Application error type.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,
}

/// Error response body.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Engine(EngineError::NotPermitted(_)) => StatusCode::FORBIDDEN,
            AppError::Engine(EngineError::EntityNotFound(_)) | AppError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            AppError::Engine(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Engine(e) => {
                tracing::warn!("Rejected by content policy: {}", e);
                e.to_string()
            }
            AppError::BadRequest(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::Unauthorized => "Unauthorized".to_string(),
        };

        let body = Json(ErrorResponse { error });

        (status, body).into_response()
    }
}

/// Result type alias for handlers.
pub type Result<T> = std::result::Result<T, AppError>;
