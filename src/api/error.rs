use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::warn;

use crate::model::PipelineError;

/// Failure of a request, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Pipeline(PipelineError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Pipeline(e) => match e {
                PipelineError::Fetch(_) => StatusCode::BAD_GATEWAY,
                PipelineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                PipelineError::Parse { .. }
                | PipelineError::ColumnCollision(_)
                | PipelineError::UnknownColumn(_)
                | PipelineError::LengthMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            },
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::BadRequest(msg) => msg.clone(),
            ApiError::Pipeline(e) => e.to_string(),
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        ApiError::Pipeline(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        warn!("Request failed [{}]: {}", status, message);
        (status, Json(json!({ "error": message }))).into_response()
    }
}
