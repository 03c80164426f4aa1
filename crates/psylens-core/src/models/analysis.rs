use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

/// Shortest accepted clinical text, in characters.
pub const MIN_TEXT_CHARS: usize = 5;
/// Longest accepted clinical text, in characters.
pub const MAX_TEXT_CHARS: usize = 4000;

/// The closed set of analyses the pipeline knows how to run.
///
/// Adding a variant requires registering both a prompt template and a
/// result parser for it; the analysis registry refuses to build otherwise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS,
)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum AnalysisType {
    RiskAssessment,
    DepressionDetection,
    SentimentAnalysis,
    WellnessDimensions,
    ProgressComparison,
}

impl AnalysisType {
    pub const ALL: [AnalysisType; 5] = [
        AnalysisType::RiskAssessment,
        AnalysisType::DepressionDetection,
        AnalysisType::SentimentAnalysis,
        AnalysisType::WellnessDimensions,
        AnalysisType::ProgressComparison,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RiskAssessment => "risk_assessment",
            Self::DepressionDetection => "depression_detection",
            Self::SentimentAnalysis => "sentiment_analysis",
            Self::WellnessDimensions => "wellness_dimensions",
            Self::ProgressComparison => "progress_comparison",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| CoreError::UnsupportedAnalysisType(truncate_for_error(s)))
    }
}

/// Keep echoed identifiers short; callers may send arbitrary strings.
fn truncate_for_error(s: &str) -> String {
    s.chars().take(64).collect()
}

/// Whether the caller waits for the result or gets a task id back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ProcessingMode {
    #[default]
    Sync,
    Async,
}

/// Sampling parameters forwarded to the language model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl GenerationParams {
    pub const MAX_TOKENS_LIMIT: u32 = 1024;

    pub fn validate(&self) -> Result<(), CoreError> {
        if !(1..=Self::MAX_TOKENS_LIMIT).contains(&self.max_tokens) {
            return Err(CoreError::InvalidRequest(format!(
                "max_tokens must be between 1 and {}, got {}",
                Self::MAX_TOKENS_LIMIT,
                self.max_tokens
            )));
        }
        if !(0.1..=1.0).contains(&self.temperature) {
            return Err(CoreError::InvalidRequest(format!(
                "temperature must be between 0.1 and 1.0, got {}",
                self.temperature
            )));
        }
        if !(0.1..=1.0).contains(&self.top_p) {
            return Err(CoreError::InvalidRequest(format!(
                "top_p must be between 0.1 and 1.0, got {}",
                self.top_p
            )));
        }
        Ok(())
    }
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 256,
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

/// A single analysis request. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AnalysisRequest {
    pub text_content: String,
    pub analysis_type: AnalysisType,
    #[serde(default, alias = "generation_params")]
    pub parameters: GenerationParams,
    #[serde(default)]
    pub processing_mode: ProcessingMode,
    /// Extra template variables (e.g. `baseline_text` for progress
    /// comparison). Values are masked exactly like `text_content`.
    #[serde(default)]
    pub prompt_options: BTreeMap<String, String>,
}

impl AnalysisRequest {
    pub fn new(text_content: impl Into<String>, analysis_type: AnalysisType) -> Self {
        Self {
            text_content: text_content.into(),
            analysis_type,
            parameters: GenerationParams::default(),
            processing_mode: ProcessingMode::Sync,
            prompt_options: BTreeMap::new(),
        }
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.processing_mode = mode;
        self
    }

    pub fn with_parameters(mut self, parameters: GenerationParams) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.prompt_options.insert(key.into(), value.into());
        self
    }

    /// Check length bounds and generation parameters. Messages never echo
    /// the text itself.
    pub fn validate(&self) -> Result<(), CoreError> {
        let chars = self.text_content.chars().count();
        if !(MIN_TEXT_CHARS..=MAX_TEXT_CHARS).contains(&chars) {
            return Err(CoreError::InvalidRequest(format!(
                "text_content must be between {MIN_TEXT_CHARS} and {MAX_TEXT_CHARS} characters, got {chars}"
            )));
        }
        for (key, value) in &self.prompt_options {
            if value.chars().count() > MAX_TEXT_CHARS {
                return Err(CoreError::InvalidRequest(format!(
                    "prompt option '{key}' exceeds {MAX_TEXT_CHARS} characters"
                )));
            }
        }
        self.parameters.validate()
    }
}

/// Several analysis types over the same text, run together and stored
/// only if every one succeeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CompositeRequest {
    pub text_content: String,
    pub analysis_types: Vec<AnalysisType>,
    #[serde(default, alias = "generation_params")]
    pub parameters: GenerationParams,
    #[serde(default)]
    pub prompt_options: BTreeMap<String, String>,
}

impl CompositeRequest {
    pub fn new(
        text_content: impl Into<String>,
        analysis_types: impl IntoIterator<Item = AnalysisType>,
    ) -> Self {
        Self {
            text_content: text_content.into(),
            analysis_types: analysis_types.into_iter().collect(),
            parameters: GenerationParams::default(),
            prompt_options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.prompt_options.insert(key.into(), value.into());
        self
    }

    /// One synchronous request per distinct type, in type order.
    pub fn sub_requests(&self) -> Result<Vec<AnalysisRequest>, CoreError> {
        let types: BTreeSet<AnalysisType> = self.analysis_types.iter().copied().collect();
        if types.is_empty() {
            return Err(CoreError::InvalidRequest(
                "analysis_types must name at least one analysis".to_string(),
            ));
        }
        Ok(types
            .into_iter()
            .map(|analysis_type| AnalysisRequest {
                text_content: self.text_content.clone(),
                analysis_type,
                parameters: self.parameters,
                processing_mode: ProcessingMode::Sync,
                prompt_options: self.prompt_options.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analysis_type_round_trips_through_str() {
        for t in AnalysisType::ALL {
            assert_eq!(t.as_str().parse::<AnalysisType>().unwrap(), t);
        }
        assert_eq!(
            " Risk_Assessment ".parse::<AnalysisType>().unwrap(),
            AnalysisType::RiskAssessment
        );
    }

    #[test]
    fn unknown_analysis_type_is_rejected() {
        let err = "horoscope".parse::<AnalysisType>().unwrap_err();
        assert!(matches!(err, CoreError::UnsupportedAnalysisType(ref s) if s == "horoscope"));
    }

    #[test]
    fn serde_uses_snake_case_names() {
        let json = serde_json::to_string(&AnalysisType::WellnessDimensions).unwrap();
        assert_eq!(json, "\"wellness_dimensions\"");
    }

    #[test]
    fn default_params_are_valid() {
        let params = GenerationParams::default();
        assert_eq!(params.max_tokens, 256);
        assert!(params.validate().is_ok());
    }

    #[test]
    fn out_of_range_params_are_rejected() {
        let too_many = GenerationParams {
            max_tokens: 2048,
            ..GenerationParams::default()
        };
        assert!(too_many.validate().is_err());

        let cold = GenerationParams {
            temperature: 0.0,
            ..GenerationParams::default()
        };
        assert!(cold.validate().is_err());

        let nan = GenerationParams {
            top_p: f32::NAN,
            ..GenerationParams::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn text_length_bounds_are_enforced() {
        assert!(AnalysisRequest::new("hi", AnalysisType::RiskAssessment)
            .validate()
            .is_err());
        assert!(AnalysisRequest::new("x".repeat(4001), AnalysisType::RiskAssessment)
            .validate()
            .is_err());
        assert!(AnalysisRequest::new("I feel tired", AnalysisType::RiskAssessment)
            .validate()
            .is_ok());
    }

    #[test]
    fn request_defaults_fill_missing_fields() {
        let req: AnalysisRequest = serde_json::from_str(
            r#"{"text_content":"feeling low lately","analysis_type":"depression_detection"}"#,
        )
        .unwrap();
        assert_eq!(req.processing_mode, ProcessingMode::Sync);
        assert_eq!(req.parameters, GenerationParams::default());
        assert!(req.prompt_options.is_empty());
    }

    #[test]
    fn generation_params_alias_is_accepted() {
        let req: AnalysisRequest = serde_json::from_str(
            r#"{"text_content":"feeling low lately","analysis_type":"risk_assessment","generation_params":{"max_tokens":128}}"#,
        )
        .unwrap();
        assert_eq!(req.parameters.max_tokens, 128);
        assert_eq!(req.parameters.temperature, GenerationParams::default().temperature);
    }

    #[test]
    fn composite_sub_requests_are_distinct_and_sync() {
        let composite = CompositeRequest::new(
            "I have been sleeping badly",
            [
                AnalysisType::SentimentAnalysis,
                AnalysisType::RiskAssessment,
                AnalysisType::SentimentAnalysis,
            ],
        );
        let subs = composite.sub_requests().unwrap();
        let types: Vec<_> = subs.iter().map(|r| r.analysis_type).collect();
        assert_eq!(
            types,
            vec![AnalysisType::RiskAssessment, AnalysisType::SentimentAnalysis]
        );
        assert!(subs.iter().all(|r| r.processing_mode == ProcessingMode::Sync));
    }

    #[test]
    fn empty_composite_is_rejected() {
        let composite = CompositeRequest::new("I have been sleeping badly", []);
        assert!(composite.sub_requests().is_err());
    }
}
