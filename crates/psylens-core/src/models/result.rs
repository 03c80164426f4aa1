use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use super::analysis::AnalysisType;

/// The outcome of one completed analysis. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AnalysisResult {
    pub request_id: Uuid,
    pub analysis_type: AnalysisType,
    pub structured_result: BTreeMap<String, serde_json::Value>,
    pub model_version: String,
    pub phi_detected: bool,
    /// Masking ran with at least one detector unavailable.
    #[serde(default)]
    pub phi_detection_partial: bool,
    pub timestamp: jiff::Timestamp,
}

impl AnalysisResult {
    /// Read a string field from the structured result.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.structured_result.get(key).and_then(|v| v.as_str())
    }

    /// True when the parser flagged a field for human review.
    pub fn requires_review(&self) -> bool {
        self.structured_result
            .get("requires_review")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// Clinical urgency derived from the merged sub-results.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum InsightPriority {
    #[default]
    Routine,
    Elevated,
    Urgent,
}

/// Cross-analysis findings merged from every sub-result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComprehensiveInsights {
    /// Suggested focus areas, sorted and de-duplicated.
    pub focus_areas: Vec<String>,
    pub priority: InsightPriority,
    pub review_required: bool,
    pub contributing_analyses: Vec<AnalysisType>,
}

/// A "digital twin" result: several analyses of the same text, merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompositeAnalysis {
    pub request_id: Uuid,
    pub sub_results: BTreeMap<AnalysisType, AnalysisResult>,
    pub comprehensive_insights: ComprehensiveInsights,
    pub timestamp: jiff::Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composite_serializes_analysis_types_as_keys() {
        let result = AnalysisResult {
            request_id: Uuid::nil(),
            analysis_type: AnalysisType::RiskAssessment,
            structured_result: BTreeMap::from([(
                "risk_level".to_string(),
                serde_json::json!("low"),
            )]),
            model_version: "test-model".to_string(),
            phi_detected: false,
            phi_detection_partial: false,
            timestamp: jiff::Timestamp::UNIX_EPOCH,
        };
        let composite = CompositeAnalysis {
            request_id: Uuid::nil(),
            sub_results: BTreeMap::from([(AnalysisType::RiskAssessment, result)]),
            comprehensive_insights: ComprehensiveInsights::default(),
            timestamp: jiff::Timestamp::UNIX_EPOCH,
        };

        let json = serde_json::to_value(&composite).unwrap();
        assert!(json["sub_results"]["risk_assessment"].is_object());
        assert_eq!(json["comprehensive_insights"]["priority"], "routine");

        let back: CompositeAnalysis = serde_json::from_value(json).unwrap();
        assert_eq!(back, composite);
    }

    #[test]
    fn priority_orders_by_urgency() {
        assert!(InsightPriority::Urgent > InsightPriority::Elevated);
        assert!(InsightPriority::Elevated > InsightPriority::Routine);
    }
}
