use axum::Json;
use axum::extract::State;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub model_version: String,
}

pub async fn health_check(State(state): State<AppState>) -> Json<Health> {
    Json(Health {
        status: "ok",
        model_version: state.orchestrator.model_version().to_string(),
    })
}
