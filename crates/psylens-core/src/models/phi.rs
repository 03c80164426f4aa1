use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Which detector produced a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum DetectorId {
    /// Clinical named-entity recognition service.
    ClinicalNer,
    /// Built-in regular expression table.
    Pattern,
}

impl DetectorId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClinicalNer => "clinical_ner",
            Self::Pattern => "pattern",
        }
    }
}

impl fmt::Display for DetectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PHI range inside one piece of text.
///
/// `start` and `end` are UTF-8 byte offsets. Spans are ephemeral: produced
/// and consumed within one masking call, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhiSpan {
    pub start: usize,
    pub end: usize,
    pub entity_type: String,
    pub source: DetectorId,
}

impl PhiSpan {
    pub fn new(start: usize, end: usize, entity_type: impl Into<String>, source: DetectorId) -> Self {
        Self {
            start,
            end,
            entity_type: entity_type.into(),
            source,
        }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when `other` lies entirely inside this span.
    pub fn contains(&self, other: &PhiSpan) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// True when the two spans share at least one byte.
    pub fn overlaps(&self, other: &PhiSpan) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// How a masked span is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum MaskMode {
    /// `[NAME]`, `[PHONE]`, … keeps the entity type as a hint for the model.
    #[default]
    Token,
    /// A fixed `[REDACTED]` for every span.
    Redaction,
}

impl MaskMode {
    pub const REDACTED: &'static str = "[REDACTED]";

    pub fn token_for(&self, entity_type: &str) -> String {
        match self {
            Self::Token => format!("[{entity_type}]"),
            Self::Redaction => Self::REDACTED.to_string(),
        }
    }
}

/// Summary of one masking pass. Safe to log: it never carries the masked
/// content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MaskingMetadata {
    pub phi_detected: bool,
    pub entity_count: usize,
    pub entity_types_counted: BTreeMap<String, usize>,
    /// At least one detector failed and contributed no spans.
    pub detection_partial: bool,
    pub failed_detectors: Vec<DetectorId>,
}

impl MaskingMetadata {
    /// Fold another pass (e.g. over a prompt option) into this one.
    pub fn absorb(&mut self, other: MaskingMetadata) {
        self.phi_detected |= other.phi_detected;
        self.entity_count += other.entity_count;
        for (entity_type, count) in other.entity_types_counted {
            *self.entity_types_counted.entry(entity_type).or_default() += count;
        }
        self.detection_partial |= other.detection_partial;
        for id in other.failed_detectors {
            if !self.failed_detectors.contains(&id) {
                self.failed_detectors.push(id);
            }
        }
    }
}
