use serde::Serialize;
use tracing::info;

/// Action names used across the pipeline.
pub mod actions {
    pub const ANALYSIS_SUBMITTED: &str = "analysis.submitted";
    pub const ANALYSIS_COMPLETED: &str = "analysis.completed";
    pub const ANALYSIS_FAILED: &str = "analysis.failed";
    pub const ANALYSIS_CANCELLED: &str = "analysis.cancelled";
    pub const COMPOSITE_COMPLETED: &str = "composite.completed";
    pub const COMPOSITE_FAILED: &str = "composite.failed";
    pub const RESULT_READ: &str = "result.read";
}

/// A structured audit event.
///
/// The caller identity and patient ID arrive from the authenticated outer
/// layer and are opaque here; the patient ID is carried only so audit
/// trails can be correlated per patient. `details` must never contain
/// clinical text or model output.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub caller: String,
    pub patient_id: Option<String>,
    pub details: Option<serde_json::Value>,
}

impl AuditEvent {
    pub fn new(
        action: impl Into<String>,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        caller: impl Into<String>,
    ) -> Self {
        Self {
            action: action.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            caller: caller.into(),
            patient_id: None,
            details: None,
        }
    }

    pub fn with_patient(mut self, patient_id: Option<&str>) -> Self {
        self.patient_id = patient_id.map(str::to_string);
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Emit this audit event via tracing.
    pub fn emit(&self) {
        let details = self
            .details
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();
        info!(
            audit.action = %self.action,
            audit.resource_type = %self.resource_type,
            audit.resource_id = %self.resource_id,
            audit.caller = %self.caller,
            audit.patient_id = self.patient_id.as_deref().unwrap_or(""),
            audit.details = %details,
            "audit event"
        );
    }
}
