//! Merge rules turning composite sub-results into comprehensive insights.
//!
//! Every rule looks at one sub-result in isolation and contributes focus
//! areas, a priority and a review flag. Contributions are combined with set
//! union, max and or, so the merged insights do not depend on the order in
//! which sub-results completed.

use std::collections::{BTreeMap, BTreeSet};

use psylens_core::models::analysis::AnalysisType;
use psylens_core::models::result::{AnalysisResult, ComprehensiveInsights, InsightPriority};

use crate::parse::WELLNESS_DIMENSIONS;

/// Wellness scores at or below this become a focus area.
const LOW_WELLNESS_SCORE: f64 = 4.0;
/// Wellness scores at or below this also raise the priority.
const CRITICAL_WELLNESS_SCORE: f64 = 2.0;

#[derive(Debug, Default)]
struct Contribution {
    focus_areas: Vec<String>,
    priority: InsightPriority,
}

impl Contribution {
    fn focus(&mut self, area: impl Into<String>) {
        self.focus_areas.push(area.into());
    }

    fn raise(&mut self, priority: InsightPriority) {
        self.priority = self.priority.max(priority);
    }
}

pub fn merge(sub_results: &BTreeMap<AnalysisType, AnalysisResult>) -> ComprehensiveInsights {
    let mut focus_areas = BTreeSet::new();
    let mut priority = InsightPriority::Routine;
    let mut review_required = false;

    for (analysis_type, result) in sub_results {
        let contribution = contribute(*analysis_type, result);
        focus_areas.extend(contribution.focus_areas);
        priority = priority.max(contribution.priority);
        review_required |= result.requires_review() || result.phi_detection_partial;
    }

    ComprehensiveInsights {
        focus_areas: focus_areas.into_iter().collect(),
        priority,
        review_required,
        contributing_analyses: sub_results.keys().copied().collect(),
    }
}

fn contribute(analysis_type: AnalysisType, result: &AnalysisResult) -> Contribution {
    let mut c = Contribution::default();
    match analysis_type {
        AnalysisType::RiskAssessment => match result.field_str("risk_level") {
            Some("high") => {
                c.focus("safety planning");
                c.focus("crisis resources");
                c.raise(InsightPriority::Urgent);
            }
            Some("medium") => {
                c.focus("risk monitoring");
                c.raise(InsightPriority::Elevated);
            }
            _ => {}
        },
        AnalysisType::DepressionDetection => {
            if result.field_str("depression_indicated") == Some("yes") {
                c.focus("mood assessment");
                c.raise(InsightPriority::Elevated);
            }
            match result.field_str("severity") {
                Some("severe") => {
                    c.focus("depression treatment review");
                    c.raise(InsightPriority::Urgent);
                }
                Some("moderate") => {
                    c.focus("depression treatment review");
                    c.raise(InsightPriority::Elevated);
                }
                _ => {}
            }
        }
        AnalysisType::SentimentAnalysis => match result.field_str("overall_sentiment") {
            Some("negative") => c.focus("emotional regulation"),
            Some("mixed") => c.focus("emotional processing"),
            _ => {}
        },
        AnalysisType::WellnessDimensions => {
            for dimension in WELLNESS_DIMENSIONS {
                let score = result
                    .structured_result
                    .get(*dimension)
                    .and_then(|v| v.as_f64());
                if let Some(score) = score {
                    if score <= LOW_WELLNESS_SCORE {
                        c.focus(format!("{dimension} wellness"));
                    }
                    if score <= CRITICAL_WELLNESS_SCORE {
                        c.raise(InsightPriority::Elevated);
                    }
                }
            }
        }
        AnalysisType::ProgressComparison => match result.field_str("overall_progress") {
            Some("declined") => {
                c.focus("treatment plan review");
                c.raise(InsightPriority::Elevated);
            }
            Some("mixed") => c.focus("treatment plan review"),
            _ => {}
        },
    }
    c
}
