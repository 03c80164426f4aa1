//! Prompt templates, one per analysis type.
//!
//! Each template asks for a plain `Key: value` block so the matching parser
//! can read the answer without trusting the model to emit valid JSON.

use std::collections::BTreeMap;

use psylens_core::models::analysis::AnalysisType;

use crate::error::AnalysisError;

/// Variable that always receives the masked `text_content`.
pub const TEXT: &str = "text";
/// Variable filled from the masked `text_content` unless the caller
/// supplies it as a prompt option.
pub const CURRENT_TEXT: &str = "current_text";
/// Earlier note for progress comparison. Always caller-supplied.
pub const BASELINE_TEXT: &str = "baseline_text";

/// Variables the pipeline can fill without help from prompt options.
pub const PIPELINE_VARIABLES: &[&str] = &[TEXT, CURRENT_TEXT];

/// A template and the variables it declares.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub text: &'static str,
    pub variables: &'static [&'static str],
}

impl PromptTemplate {
    /// Declared variables the caller has to provide through prompt options.
    pub fn caller_variables(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.variables
            .iter()
            .copied()
            .filter(|v| !PIPELINE_VARIABLES.contains(v))
    }

    /// Substitute `{name}` placeholders in a single pass.
    ///
    /// Substituted values are never rescanned, so text that itself contains
    /// `{...}` is inserted verbatim. Braces that do not wrap an identifier are
    /// copied through unchanged.
    pub fn render(&self, vars: &BTreeMap<String, String>) -> Result<String, AnalysisError> {
        let mut out = String::with_capacity(self.text.len());
        let mut rest = self.text;

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let name_len = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());

            if name_len > 0 && after[name_len..].starts_with('}') {
                let name = &after[..name_len];
                let value = vars.get(name).ok_or_else(|| {
                    AnalysisError::Validation(format!("missing template variable '{name}'"))
                })?;
                out.push_str(value);
                rest = &after[name_len + 1..];
            } else {
                out.push('{');
                rest = after;
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

const RISK_ASSESSMENT: &str = r#"Assess the suicide and self-harm risk expressed in the following de-identified clinical text.

Text:
"""
{text}
"""

Respond with exactly these lines and nothing else:
Risk Level: <low | medium | high>
Rationale: <one or two sentences>
Key Indicators: <comma-separated list, or none>"#;

const DEPRESSION_DETECTION: &str = r#"Screen the following de-identified clinical text for indicators of depression.

Text:
"""
{text}
"""

Respond with exactly these lines and nothing else:
Depression Indicated: <yes | no>
Severity: <none | mild | moderate | severe>
Confidence: <low | medium | high>
Key Indicators: <comma-separated list, or none>
Rationale: <one or two sentences>"#;

const SENTIMENT_ANALYSIS: &str = r#"Describe the emotional tone of the following de-identified clinical text.

Text:
"""
{text}
"""

Respond with exactly these lines and nothing else:
Overall Sentiment: <positive | neutral | negative | mixed>
Sentiment Score: <number from -1.0 (most negative) to 1.0 (most positive)>
Emotions: <comma-separated list>
Rationale: <one or two sentences>"#;

const WELLNESS_DIMENSIONS: &str = r#"Rate the client's wellbeing in each dimension below, based only on the following de-identified clinical text. Use 1 for severe difficulty and 10 for thriving.

Text:
"""
{text}
"""

Respond with exactly these lines and nothing else:
Emotional: <1-10>
Social: <1-10>
Physical: <1-10>
Occupational: <1-10>
Intellectual: <1-10>
Spiritual: <1-10>
Summary: <one or two sentences>"#;

const PROGRESS_COMPARISON: &str = r#"Compare two de-identified clinical notes about the same client and describe the change between them.

Earlier note:
"""
{baseline_text}
"""

Recent note:
"""
{current_text}
"""

Respond with exactly these lines and nothing else:
Overall Progress: <improved | unchanged | declined | mixed>
Improvements: <comma-separated list, or none>
Concerns: <comma-separated list, or none>
Summary: <one or two sentences>"#;

/// The built-in template for `analysis_type`.
pub fn standard_template(analysis_type: AnalysisType) -> PromptTemplate {
    match analysis_type {
        AnalysisType::RiskAssessment => PromptTemplate {
            text: RISK_ASSESSMENT,
            variables: &[TEXT],
        },
        AnalysisType::DepressionDetection => PromptTemplate {
            text: DEPRESSION_DETECTION,
            variables: &[TEXT],
        },
        AnalysisType::SentimentAnalysis => PromptTemplate {
            text: SENTIMENT_ANALYSIS,
            variables: &[TEXT],
        },
        AnalysisType::WellnessDimensions => PromptTemplate {
            text: WELLNESS_DIMENSIONS,
            variables: &[TEXT],
        },
        AnalysisType::ProgressComparison => PromptTemplate {
            text: PROGRESS_COMPARISON,
            variables: &[BASELINE_TEXT, CURRENT_TEXT],
        },
    }
}
