use thiserror::Error;

use crate::models::task::TaskStatus;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("unsupported analysis type: {0}")]
    UnsupportedAnalysisType(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid task transition: {from} -> {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },

    #[error("invalid uuid: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
