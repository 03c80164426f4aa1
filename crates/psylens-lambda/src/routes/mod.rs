pub mod analyze;
pub mod health;
pub mod results;
pub mod tasks;
pub mod types;

use axum::Router;
use axum::middleware as axum_mw;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};

use crate::middleware::{audit, auth};
use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/analyze", post(analyze::analyze))
        .route("/analyze/composite", post(analyze::analyze_composite))
        .route("/analyze/tasks/{task_id}", get(tasks::get_task_status))
        .route("/analyze/tasks/{task_id}/cancel", post(tasks::cancel_task))
        .route("/analyze/results/{result_id}", get(results::get_result))
        .route_layer(axum_mw::from_fn(auth::require_auth));

    Router::new()
        // Health and type listing (no auth)
        .route("/health", get(health::health_check))
        .route("/analyze/types", get(types::list_types))
        .merge(protected)
        .layer(axum_mw::from_fn(audit::audit_log))
        .layer(cors)
        .with_state(state)
}
