use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use axum::{routing::get, routing::post, Router};
use serde_json::json;

use crate::app_state::AppState;
use crate::services::queue::QueueError;

pub mod health;
pub mod metrics;
pub mod predict;

/// API routes sharing the queue-backed application state. The Prometheus
/// scrape endpoint is mounted separately since it carries its own state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/predict", post(predict::submit_segmentation))
        .route("/predict/plane", post(predict::submit_plane))
        .route("/result/{task_id}", get(predict::get_result))
        .with_state(state)
}

/// Error surface of the HTTP front end. Low-level broker errors are never
/// exposed; callers see a textual description only.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("task not found")]
    NotFound,

    #[error("{0}")]
    Internal(String),
}

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
