use axum::Extension;
use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use psylens_core::models::task::TaskStatusReport;

use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Block until the task finishes or the configured wait timeout passes.
    #[serde(default)]
    pub wait: bool,
}

pub async fn get_task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<TaskStatusReport>, ApiError> {
    if query.wait {
        state
            .orchestrator
            .wait_for(task_id, state.config.wait_timeout)
            .await?;
    }
    let report = state.orchestrator.get_status(task_id).await?;
    Ok(Json(report))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskStatusReport>, ApiError> {
    let report = state.orchestrator.cancel(task_id, &user.caller()).await?;
    Ok(Json(report))
}
