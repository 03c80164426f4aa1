use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use psylens_analysis::error::AnalysisError;

/// Unified API error type for all route handlers.
///
/// Messages come from library errors, which never carry clinical text or
/// model output.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(String),
    InvalidState(String),
    PhiDetection(String),
    ModelInference(String),
    ResultParsing(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    kind: &'static str,
    error: String,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InvalidState(_) => StatusCode::CONFLICT,
            ApiError::PhiDetection(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::ModelInference(_) | ApiError::ResultParsing(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::NotFound(_) => "not_found",
            ApiError::InvalidState(_) => "invalid_state",
            ApiError::PhiDetection(_) => "phi_detection_error",
            ApiError::ModelInference(_) => "model_inference_error",
            ApiError::ResultParsing(_) => "result_parsing_error",
            ApiError::Internal(_) => "analysis_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = match self {
            ApiError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                "internal server error".to_string()
            }
            ApiError::Validation(msg)
            | ApiError::NotFound(msg)
            | ApiError::InvalidState(msg)
            | ApiError::PhiDetection(msg)
            | ApiError::ModelInference(msg)
            | ApiError::ResultParsing(msg) => msg,
        };

        (status, Json(ErrorBody { kind, error: message })).into_response()
    }
}

impl From<AnalysisError> for ApiError {
    fn from(e: AnalysisError) -> Self {
        let message = e.to_string();
        match e {
            AnalysisError::Validation(_) => ApiError::Validation(message),
            AnalysisError::TaskNotFound(_) | AnalysisError::ResultNotFound(_) => {
                ApiError::NotFound(message)
            }
            AnalysisError::TaskState(_) => ApiError::InvalidState(message),
            AnalysisError::PhiDetection(_) => ApiError::PhiDetection(message),
            AnalysisError::ModelInference(_) => ApiError::ModelInference(message),
            AnalysisError::ResultParsing(_) => ApiError::ResultParsing(message),
            AnalysisError::Storage(_) | AnalysisError::Internal(_) => ApiError::Internal(message),
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for ApiError {
    fn from(e: axum::extract::rejection::JsonRejection) -> Self {
        ApiError::Validation(e.body_text())
    }
}
