use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::gemini::GeminiError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    DbError(#[from] sqlx::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("upstream service failed: {0}")]
    Upstream(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::DbError(e) => {
                log::error!("database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".to_string())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Upstream(msg) => {
                log::error!("upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, msg)
            }
        };
        (status, Json(json!({ "success": false, "error": error_message }))).into_response()
    }
}

impl From<GeminiError> for AppError {
    fn from(err: GeminiError) -> Self {
        AppError::Upstream(err.to_string())
    }
}
