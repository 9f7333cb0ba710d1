use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use dsl::Diagnostic;
use engine::EngineError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("script does not compile")]
    Syntax(Vec<Diagnostic>),

    #[error("{0}")]
    Internal(String),
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::ScriptNotFound(_)
            | EngineError::WorkflowNotFound(_)
            | EngineError::NodeNotFound { .. } => Self::NotFound(e.to_string()),
            EngineError::Syntax(diagnostics) => Self::Syntax(diagnostics),
            EngineError::UnknownNodeReference { .. }
            | EngineError::DuplicateNodeId(_)
            | EngineError::CycleDetected => Self::BadRequest(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response(),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response(),
            Self::Syntax(diagnostics) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": "script does not compile", "diagnostics": diagnostics })),
            )
                .into_response(),
            Self::Internal(msg) => {
                // Full detail goes to the log only.
                error!("API error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "internal error" })),
                )
                    .into_response()
            }
        }
    }
}
