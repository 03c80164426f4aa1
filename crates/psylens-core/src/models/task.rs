use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use super::analysis::AnalysisRequest;
use crate::error::CoreError;

/// Lifecycle of an asynchronous analysis.
///
/// ```text
/// Queued ──> Processing ──> Completed
///   │            │
///   └────────────┴────────> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum TaskStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Taxonomy kind recorded on a failed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ErrorKind {
    ValidationError,
    PhiDetectionError,
    ModelInferenceError,
    ResultParsingError,
    AnalysisError,
    Cancelled,
}

/// Kind plus a PHI-free, human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "cancelled by caller")
    }

    pub fn shutdown() -> Self {
        Self::new(ErrorKind::Cancelled, "service shut down before the task started")
    }
}

/// An asynchronous analysis tracked by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AnalysisTask {
    pub task_id: Uuid,
    pub request: AnalysisRequest,
    pub status: TaskStatus,
    pub created_at: jiff::Timestamp,
    pub started_at: Option<jiff::Timestamp>,
    pub completed_at: Option<jiff::Timestamp>,
    pub result_id: Option<Uuid>,
    pub error: Option<TaskError>,
}

impl AnalysisTask {
    pub fn new(request: AnalysisRequest) -> Self {
        Self {
            task_id: Uuid::new_v4(),
            request,
            status: TaskStatus::Queued,
            created_at: jiff::Timestamp::now(),
            started_at: None,
            completed_at: None,
            result_id: None,
            error: None,
        }
    }

    /// `Queued -> Processing`.
    pub fn start(&mut self, now: jiff::Timestamp) -> Result<(), CoreError> {
        self.transition(TaskStatus::Queued, TaskStatus::Processing)?;
        self.started_at = Some(now);
        Ok(())
    }

    /// `Processing -> Completed`.
    pub fn complete(&mut self, result_id: Uuid, now: jiff::Timestamp) -> Result<(), CoreError> {
        self.transition(TaskStatus::Processing, TaskStatus::Completed)?;
        self.result_id = Some(result_id);
        self.completed_at = Some(now);
        Ok(())
    }

    /// `Processing -> Failed`.
    pub fn fail(&mut self, error: TaskError, now: jiff::Timestamp) -> Result<(), CoreError> {
        self.transition(TaskStatus::Processing, TaskStatus::Failed)?;
        self.error = Some(error);
        self.completed_at = Some(now);
        Ok(())
    }

    /// `Queued | Processing -> Failed(cancelled)`.
    pub fn cancel(&mut self, now: jiff::Timestamp) -> Result<(), CoreError> {
        self.abandon(TaskError::cancelled(), now)
    }

    /// Like [`cancel`](Self::cancel) with a caller-chosen reason.
    pub fn abandon(&mut self, error: TaskError, now: jiff::Timestamp) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to: TaskStatus::Failed,
            });
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(now);
        Ok(())
    }

    fn transition(&mut self, from: TaskStatus, to: TaskStatus) -> Result<(), CoreError> {
        if self.status != from {
            return Err(CoreError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Best-effort completion percentage while processing.
    ///
    /// Elapsed time against `expected`, capped at 99 so a slow task never
    /// reports done before it is.
    pub fn progress(&self, now: jiff::Timestamp, expected: Duration) -> Option<u8> {
        if self.status != TaskStatus::Processing {
            return None;
        }
        let started = self.started_at?;
        let elapsed = now.duration_since(started).as_secs_f64().max(0.0);
        let expected = expected.as_secs_f64();
        if expected <= 0.0 {
            return Some(99);
        }
        let pct = (elapsed / expected * 100.0).floor().min(99.0);
        Some(pct as u8)
    }

    pub fn status_report(&self, now: jiff::Timestamp, expected: Duration) -> TaskStatusReport {
        TaskStatusReport {
            task_id: self.task_id,
            status: self.status,
            progress: self.progress(now, expected),
            result_id: self.result_id,
            error: self.error.clone(),
        }
    }
}

/// What a status poll returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TaskStatusReport {
    pub task_id: Uuid,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
}
