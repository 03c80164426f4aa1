use std::sync::Arc;

use psylens_analysis::orchestrator::Orchestrator;

use crate::config::AppConfig;

/// Shared application state, injected into all route handlers via Axum state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    pub config: Arc<AppConfig>,
}
