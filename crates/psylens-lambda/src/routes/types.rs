use axum::Json;
use axum::extract::State;
use serde::Serialize;

use psylens_core::models::analysis::AnalysisType;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct AnalysisTypes {
    pub analysis_types: Vec<AnalysisType>,
}

/// Analysis types with both a template and a parser registered.
pub async fn list_types(State(state): State<AppState>) -> Json<AnalysisTypes> {
    Json(AnalysisTypes {
        analysis_types: state.orchestrator.registry().supported_types(),
    })
}
