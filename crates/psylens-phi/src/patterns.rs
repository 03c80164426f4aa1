//! Regex-based PHI detector.
//!
//! A fixed table of HIPAA Safe Harbor identifiers that have a reliable
//! lexical shape. Names are only caught when preceded by an honorific; free
//! names are left to the clinical NER detector.

use regex::Regex;

use psylens_core::models::phi::{DetectorId, PhiSpan};

use crate::detector::{BoxFuture, PhiDetector};
use crate::error::DetectorError;

/// Built-in pattern table: `(entity type, confidence, pattern)`.
const BUILTIN_PATTERNS: &[(&str, f32, &str)] = &[
    (
        "EMAIL",
        0.95,
        r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b",
    ),
    ("SSN", 0.95, r"\b\d{3}-\d{2}-\d{4}\b"),
    (
        "PHONE",
        0.9,
        r"(?:\+?1[-.\s]?)?(?:\(\d{3}\)\s?|\b\d{3}[-.\s])\d{3}[-.\s]\d{4}\b",
    ),
    (
        "MRN",
        0.9,
        r"(?i)\b(?:MRN|medical record(?: number| no\.?)?)[:#\s]*\d{5,10}\b",
    ),
    (
        "DATE",
        0.85,
        r"\b(?:0?[1-9]|1[0-2])[/-](?:0?[1-9]|[12]\d|3[01])[/-](?:\d{4}|\d{2})\b",
    ),
    ("DATE", 0.85, r"\b\d{4}-\d{2}-\d{2}\b"),
    (
        "DATE",
        0.8,
        r"\b(?:Jan(?:uary)?|Feb(?:ruary)?|Mar(?:ch)?|Apr(?:il)?|May|June?|July?|Aug(?:ust)?|Sep(?:t(?:ember)?)?|Oct(?:ober)?|Nov(?:ember)?|Dec(?:ember)?)\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s+\d{4}\b",
    ),
    ("URL", 0.9, r#"\b(?:https?://|www\.)[^\s<>"]+"#),
    ("IP_ADDRESS", 0.85, r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
    ("ZIP", 0.8, r"\b\d{5}-\d{4}\b"),
    (
        "NAME",
        0.75,
        r"\b(?:Dr|Mr|Mrs|Ms|Miss|Prof)\.?\s+[A-Z][a-z]+(?:-[A-Z][a-z]+)?",
    ),
];

/// Compiled pattern with metadata.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub regex: Regex,
    pub entity_type: &'static str,
    pub confidence: f32,
}

/// Regex-based PHI detector.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    patterns: Vec<CompiledPattern>,
    confidence_threshold: f32,
}

impl PatternDetector {
    /// Compile the built-in pattern table.
    pub fn new() -> Result<Self, DetectorError> {
        let patterns = BUILTIN_PATTERNS
            .iter()
            .map(|(entity_type, confidence, pattern)| {
                let regex = Regex::new(pattern).map_err(|e| {
                    DetectorError::Config(format!("invalid {entity_type} pattern: {e}"))
                })?;
                Ok(CompiledPattern {
                    regex,
                    entity_type,
                    confidence: *confidence,
                })
            })
            .collect::<Result<Vec<_>, DetectorError>>()?;

        Ok(Self {
            patterns,
            confidence_threshold: 0.7,
        })
    }

    /// Skip patterns whose confidence is below `threshold`.
    pub fn with_confidence_threshold(mut self, threshold: f32) -> Self {
        self.confidence_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    /// Synchronous scan; `detect` wraps this.
    pub fn scan(&self, text: &str) -> Vec<PhiSpan> {
        let mut spans = Vec::new();
        for pattern in &self.patterns {
            if pattern.confidence < self.confidence_threshold {
                continue;
            }
            for m in pattern.regex.find_iter(text) {
                spans.push(PhiSpan::new(
                    m.start(),
                    m.end(),
                    pattern.entity_type,
                    DetectorId::Pattern,
                ));
            }
        }
        spans
    }
}

impl PhiDetector for PatternDetector {
    fn id(&self) -> DetectorId {
        DetectorId::Pattern
    }

    fn detect<'a>(
        &'a self,
        text: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PhiSpan>, DetectorError>> {
        Box::pin(async move { Ok(self.scan(text)) })
    }
}
