//! # API Errors
//!
//! Every handler failure becomes a JSON body `{error, detail, stage?}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use marketlens_core::pipeline::{PipelineError, ValidationError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};
use utoipa::ToSchema;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("LLM unavailable: {0}")]
    LlmUnavailable(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Machine readable error code
    pub error: &'static str,
    pub detail: String,
    /// Stage that failed, for research failures
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::LlmUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Pipeline(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_failed",
            ApiError::LlmUnavailable(_) => "llm_unavailable",
            ApiError::Pipeline(_) => "research_failed",
            ApiError::BadRequest(_) => "bad_request",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.code(),
            detail: format!("{:#}", self),
            stage: match &self {
                ApiError::Pipeline(e) => e.stage().map(|s| s.to_string()),
                _ => None,
            },
        };
        if status.is_server_error() {
            error!("request error: {}", body.detail);
        } else {
            warn!("request rejected: {}", body.detail);
        }
        (status, Json(body)).into_response()
    }
}
