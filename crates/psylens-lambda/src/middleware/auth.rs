use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use psylens_analysis::orchestrator::CallerContext;

/// Header naming the patient a request concerns, for audit correlation only.
pub const PATIENT_ID_HEADER: &str = "x-patient-id";

/// Caller identity middleware.
///
/// Token verification happens upstream (API Gateway authorizer); here the
/// `Authorization: Bearer <sub>` value is taken as the opaque caller
/// identity. On success, inserts `AuthUser` into request extensions.
pub async fn require_auth(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let sub = {
        let auth_header = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or(StatusCode::UNAUTHORIZED)?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .ok_or(StatusCode::UNAUTHORIZED)?;

        if token.is_empty() {
            return Err(StatusCode::UNAUTHORIZED);
        }
        token.to_string()
    };

    let patient_id = req
        .headers()
        .get(PATIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    req.extensions_mut().insert(AuthUser { sub, patient_id });

    Ok(next.run(req).await)
}

/// Authenticated caller, as established by the outer layer.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub sub: String,
    pub patient_id: Option<String>,
}

impl AuthUser {
    pub fn caller(&self) -> CallerContext {
        CallerContext::new(&self.sub).with_patient(self.patient_id.clone())
    }
}
