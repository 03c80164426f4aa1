//! Parsers turning raw model output into structured result maps.
//!
//! Models answer with a `Key: value` block but rarely follow the format to
//! the letter, so the reader is forgiving about case, bullets, bold markers
//! and wrapped lines. Missing fields become `"unknown"`; enumerations and
//! scores outside their closed range also become `"unknown"` and are added
//! to `review_flags`. Only output with none of the expected keys is an
//! error.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use psylens_core::models::analysis::AnalysisType;

use crate::error::ResultParsingError;

/// Structured result fields produced by a parser.
pub type StructuredResult = BTreeMap<String, Value>;

/// Parser entry point registered per analysis type.
pub type ParserFn = fn(&str) -> Result<StructuredResult, ResultParsingError>;

pub const UNKNOWN: &str = "unknown";
pub const REQUIRES_REVIEW: &str = "requires_review";
pub const REVIEW_FLAGS: &str = "review_flags";

const MAX_KEY_LEN: usize = 40;

pub const RISK_LEVELS: &[&str] = &["low", "medium", "high"];
pub const YES_NO: &[&str] = &["yes", "no"];
pub const SEVERITIES: &[&str] = &["none", "mild", "moderate", "severe"];
pub const CONFIDENCE_LEVELS: &[&str] = &["low", "medium", "high"];
pub const SENTIMENTS: &[&str] = &["positive", "neutral", "negative", "mixed"];
pub const PROGRESS_LEVELS: &[&str] = &["improved", "unchanged", "declined", "mixed"];
pub const WELLNESS_DIMENSIONS: &[&str] = &[
    "emotional",
    "social",
    "physical",
    "occupational",
    "intellectual",
    "spiritual",
];

/// `Key: value` pairs read from model output, keyed by snake_case name.
#[derive(Debug, Default)]
struct FieldBlock {
    fields: HashMap<String, String>,
}

impl FieldBlock {
    fn parse(raw: &str) -> Self {
        let mut fields: HashMap<String, String> = HashMap::new();
        let mut current: Option<String> = None;

        for line in raw.lines() {
            let line = clean_line(line);
            if line.is_empty() {
                current = None;
                continue;
            }

            let labelled = line
                .split_once(':')
                .and_then(|(lhs, rhs)| field_key(lhs).map(|key| (key, rhs.trim().to_string())));

            if let Some((key, value)) = labelled {
                // First occurrence wins when the model repeats itself.
                if fields.contains_key(&key) {
                    current = None;
                } else {
                    fields.insert(key.clone(), value);
                    current = Some(key);
                }
                continue;
            }

            let continued = current.as_ref().and_then(|key| fields.get_mut(key));
            if let Some(value) = continued {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(&line);
            }
        }

        Self { fields }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    fn has_any(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.fields.contains_key(*k))
    }
}

/// Strip list bullets, numbering and markdown emphasis.
fn clean_line(line: &str) -> String {
    let without_emphasis = line.replace("**", "").replace("__", "");
    let mut s = without_emphasis.trim();
    s = s.trim_start_matches(['-', '*', '•', '#', '>']).trim_start();
    s.to_string()
}

/// Normalize a key such as `Risk Level` into `risk_level`.
///
/// Only short labels made of letters, digits, spaces, `_`, `-` and `/` count
/// as keys; anything else is treated as prose.
fn field_key(lhs: &str) -> Option<String> {
    let lhs = lhs.trim();
    if lhs.is_empty() || lhs.len() > MAX_KEY_LEN {
        return None;
    }
    if !lhs
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-' | '/'))
    {
        return None;
    }
    let key = lhs
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(str::to_ascii_lowercase)
        .collect::<Vec<_>>()
        .join("_");
    (!key.is_empty()).then_some(key)
}

/// Lowercase and strip surrounding punctuation from an enumerated value.
fn normalize_choice(value: &str) -> String {
    value
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
        .to_ascii_lowercase()
}

/// Builds one structured result, tracking fields that need review.
#[derive(Debug, Default)]
struct ResultBuilder {
    fields: StructuredResult,
    flags: Vec<String>,
}

impl ResultBuilder {
    fn text(&mut self, block: &FieldBlock, key: &str) {
        let value = block.get(key).unwrap_or(UNKNOWN);
        self.fields.insert(key.to_string(), Value::from(value));
    }

    fn choice(&mut self, block: &FieldBlock, key: &str, allowed: &[&str]) {
        let normalized = block.get(key).map(normalize_choice);
        match normalized {
            Some(v) if allowed.contains(&v.as_str()) => {
                self.fields.insert(key.to_string(), Value::from(v));
            }
            _ => {
                self.fields.insert(key.to_string(), Value::from(UNKNOWN));
                self.flags.push(key.to_string());
            }
        }
    }

    fn list(&mut self, block: &FieldBlock, key: &str) {
        let Some(raw) = block.get(key) else {
            self.fields.insert(key.to_string(), Value::from(UNKNOWN));
            return;
        };
        let items: Vec<Value> = raw
            .split([',', ';'])
            .map(|item| item.trim().trim_end_matches('.').trim())
            .filter(|item| {
                !item.is_empty()
                    && !item.eq_ignore_ascii_case("none")
                    && !item.eq_ignore_ascii_case("n/a")
            })
            .map(Value::from)
            .collect();
        self.fields.insert(key.to_string(), Value::Array(items));
    }

    /// Read the leading number of the value (`7`, `7/10`, `-0.4 (negative)`).
    fn score(&mut self, block: &FieldBlock, key: &str, min: f64, max: f64) {
        let parsed = block.get(key).and_then(|raw| {
            let token: String = raw
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit() || matches!(c, '.' | '-' | '+'))
                .collect();
            token.trim_end_matches('.').parse::<f64>().ok()
        });
        match parsed {
            Some(n) if n.is_finite() && (min..=max).contains(&n) => {
                self.fields.insert(key.to_string(), Value::from(n));
            }
            _ => {
                self.fields.insert(key.to_string(), Value::from(UNKNOWN));
                self.flags.push(key.to_string());
            }
        }
    }

    fn finish(mut self) -> StructuredResult {
        self.fields
            .insert(REQUIRES_REVIEW.to_string(), Value::Bool(!self.flags.is_empty()));
        self.fields.insert(
            REVIEW_FLAGS.to_string(),
            Value::Array(self.flags.into_iter().map(Value::from).collect()),
        );
        self.fields
    }
}

fn read_block(
    raw: &str,
    analysis_type: AnalysisType,
    expected: &[&str],
) -> Result<FieldBlock, ResultParsingError> {
    let block = FieldBlock::parse(raw);
    if block.has_any(expected) {
        Ok(block)
    } else {
        Err(ResultParsingError::MissingBlock {
            analysis_type,
            len: raw.len(),
        })
    }
}

pub fn parse_risk_assessment(raw: &str) -> Result<StructuredResult, ResultParsingError> {
    let block = read_block(
        raw,
        AnalysisType::RiskAssessment,
        &["risk_level", "rationale", "key_indicators"],
    )?;
    let mut out = ResultBuilder::default();
    out.choice(&block, "risk_level", RISK_LEVELS);
    out.text(&block, "rationale");
    out.list(&block, "key_indicators");
    Ok(out.finish())
}

pub fn parse_depression_detection(raw: &str) -> Result<StructuredResult, ResultParsingError> {
    let block = read_block(
        raw,
        AnalysisType::DepressionDetection,
        &["depression_indicated", "severity", "confidence"],
    )?;
    let mut out = ResultBuilder::default();
    out.choice(&block, "depression_indicated", YES_NO);
    out.choice(&block, "severity", SEVERITIES);
    out.choice(&block, "confidence", CONFIDENCE_LEVELS);
    out.list(&block, "key_indicators");
    out.text(&block, "rationale");
    Ok(out.finish())
}

pub fn parse_sentiment_analysis(raw: &str) -> Result<StructuredResult, ResultParsingError> {
    let block = read_block(
        raw,
        AnalysisType::SentimentAnalysis,
        &["overall_sentiment", "sentiment_score", "emotions"],
    )?;
    let mut out = ResultBuilder::default();
    out.choice(&block, "overall_sentiment", SENTIMENTS);
    out.score(&block, "sentiment_score", -1.0, 1.0);
    out.list(&block, "emotions");
    out.text(&block, "rationale");
    Ok(out.finish())
}

pub fn parse_wellness_dimensions(raw: &str) -> Result<StructuredResult, ResultParsingError> {
    let block = read_block(raw, AnalysisType::WellnessDimensions, WELLNESS_DIMENSIONS)?;
    let mut out = ResultBuilder::default();
    for dimension in WELLNESS_DIMENSIONS {
        out.score(&block, dimension, 1.0, 10.0);
    }
    out.text(&block, "summary");
    Ok(out.finish())
}

pub fn parse_progress_comparison(raw: &str) -> Result<StructuredResult, ResultParsingError> {
    let block = read_block(
        raw,
        AnalysisType::ProgressComparison,
        &["overall_progress", "improvements", "concerns"],
    )?;
    let mut out = ResultBuilder::default();
    out.choice(&block, "overall_progress", PROGRESS_LEVELS);
    out.list(&block, "improvements");
    out.list(&block, "concerns");
    out.text(&block, "summary");
    Ok(out.finish())
}

/// The built-in parser for `analysis_type`.
pub fn standard_parser(analysis_type: AnalysisType) -> ParserFn {
    match analysis_type {
        AnalysisType::RiskAssessment => parse_risk_assessment,
        AnalysisType::DepressionDetection => parse_depression_detection,
        AnalysisType::SentimentAnalysis => parse_sentiment_analysis,
        AnalysisType::WellnessDimensions => parse_wellness_dimensions,
        AnalysisType::ProgressComparison => parse_progress_comparison,
    }
}
