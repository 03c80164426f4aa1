use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Request logging middleware.
///
/// Logs method, path, status and duration for every API request. Bodies are
/// never logged.
pub async fn audit_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    tracing::info!(
        method = %method,
        path = %uri,
        status = status,
        duration_ms = started.elapsed().as_millis() as u64,
        "api_request"
    );

    response
}
