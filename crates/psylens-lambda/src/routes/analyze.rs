use std::collections::BTreeMap;
use std::time::Instant;

use axum::Extension;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use psylens_analysis::orchestrator::Submission;
use psylens_core::models::analysis::{AnalysisRequest, AnalysisType, CompositeRequest};
use psylens_core::models::result::{AnalysisResult, CompositeAnalysis};

use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CompletedAnalysis {
    pub request_id: Uuid,
    pub analysis_type: AnalysisType,
    pub result: BTreeMap<String, serde_json::Value>,
    pub model_version: String,
    pub phi_detected: bool,
    pub phi_detection_partial: bool,
    pub timestamp: jiff::Timestamp,
    pub processing_time_ms: u64,
}

impl CompletedAnalysis {
    fn new(result: AnalysisResult, processing_time_ms: u64) -> Self {
        Self {
            request_id: result.request_id,
            analysis_type: result.analysis_type,
            result: result.structured_result,
            model_version: result.model_version,
            phi_detected: result.phi_detected,
            phi_detection_partial: result.phi_detection_partial,
            timestamp: result.timestamp,
            processing_time_ms,
        }
    }
}

/// Returned for background submissions; `request_id` is the task id.
#[derive(Debug, Serialize)]
pub struct AcceptedAnalysis {
    pub request_id: Uuid,
    pub status: &'static str,
    pub processing_time_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum AnalyzeResponse {
    Completed(CompletedAnalysis),
    Accepted(AcceptedAnalysis),
}

/// Run one analysis, inline or in the background.
pub async fn analyze(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AnalyzeResponse>), ApiError> {
    let Json(request) = payload?;
    let started = Instant::now();

    let submission = state.orchestrator.submit(request, &user.caller()).await?;
    let processing_time_ms = started.elapsed().as_millis() as u64;

    let (status, body) = match submission {
        Submission::Completed(result) => (
            StatusCode::OK,
            AnalyzeResponse::Completed(CompletedAnalysis::new(result, processing_time_ms)),
        ),
        Submission::Queued(report) => (
            StatusCode::ACCEPTED,
            AnalyzeResponse::Accepted(AcceptedAnalysis {
                request_id: report.task_id,
                status: "processing",
                processing_time_ms,
            }),
        ),
    };
    Ok((status, Json(body)))
}

#[derive(Debug, Serialize)]
pub struct CompositeResponse {
    #[serde(flatten)]
    pub composite: CompositeAnalysis,
    pub processing_time_ms: u64,
}

/// Run several analyses over one text; all succeed or none are kept.
pub async fn analyze_composite(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CompositeRequest>, JsonRejection>,
) -> Result<Json<CompositeResponse>, ApiError> {
    let Json(request) = payload?;
    let started = Instant::now();

    let composite = state
        .orchestrator
        .run_composite(request, &user.caller())
        .await?;

    Ok(Json(CompositeResponse {
        composite,
        processing_time_ms: started.elapsed().as_millis() as u64,
    }))
}
