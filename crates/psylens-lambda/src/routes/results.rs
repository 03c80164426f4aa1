use axum::Extension;
use axum::Json;
use axum::extract::{Path, State};
use uuid::Uuid;

use psylens_core::models::result::AnalysisResult;

use crate::error::ApiError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub async fn get_result(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(result_id): Path<Uuid>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let result = state
        .orchestrator
        .get_result(result_id, &user.caller())
        .await?;
    Ok(Json(result))
}
