use thiserror::Error;
use uuid::Uuid;

use psylens_bedrock::error::ModelInferenceError;
use psylens_core::error::CoreError;
use psylens_core::models::analysis::AnalysisType;
use psylens_core::models::task::{ErrorKind, TaskError};
use psylens_phi::error::PhiError;
use psylens_storage::error::StorageError;

/// Top-level error for one analysis.
///
/// Every message is safe to return to callers and to log: none of them
/// carries input text or model output.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("PHI detection error: {0}")]
    PhiDetection(#[from] PhiError),

    #[error("model inference error: {0}")]
    ModelInference(#[from] ModelInferenceError),

    #[error("result parsing error: {0}")]
    ResultParsing(#[from] ResultParsingError),

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("result not found: {0}")]
    ResultNotFound(Uuid),

    #[error("invalid task state: {0}")]
    TaskState(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("analysis failed: {0}")]
    Internal(String),
}

impl AnalysisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::ValidationError,
            Self::PhiDetection(_) => ErrorKind::PhiDetectionError,
            Self::ModelInference(_) => ErrorKind::ModelInferenceError,
            Self::ResultParsing(_) => ErrorKind::ResultParsingError,
            Self::TaskNotFound(_)
            | Self::ResultNotFound(_)
            | Self::TaskState(_)
            | Self::Storage(_)
            | Self::Internal(_) => ErrorKind::AnalysisError,
        }
    }

    /// The `{kind, message}` pair recorded on a failed task.
    pub fn to_task_error(&self) -> TaskError {
        TaskError::new(self.kind(), self.to_string())
    }
}

impl From<CoreError> for AnalysisError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::UnsupportedAnalysisType(_) | CoreError::InvalidRequest(_) => {
                Self::Validation(e.to_string())
            }
            CoreError::InvalidTransition { .. } => Self::TaskState(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// The model output did not follow the requested format.
#[derive(Debug, Error)]
pub enum ResultParsingError {
    #[error("no {analysis_type} fields found in model output ({len} bytes)")]
    MissingBlock {
        analysis_type: AnalysisType,
        len: usize,
    },
}

/// A registry that would accept a type with only half its contract.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0} has a prompt template but no result parser")]
    MissingParser(AnalysisType),

    #[error("{0} has a result parser but no prompt template")]
    MissingTemplate(AnalysisType),

    #[error("template for {analysis_type} never uses declared variable '{variable}'")]
    UnusedVariable {
        analysis_type: AnalysisType,
        variable: &'static str,
    },
}
