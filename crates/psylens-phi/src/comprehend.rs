//! Clinical NER detector backed by Amazon Comprehend Medical `DetectPHI`.
//!
//! Comprehend Medical reports character offsets; spans are converted to
//! UTF-8 byte offsets before leaving this module.

use std::time::Duration;

use aws_config::timeout::TimeoutConfig;
use tracing::info;

use psylens_core::models::phi::{DetectorId, PhiSpan};

use crate::detector::{BoxFuture, PhiDetector};
use crate::error::DetectorError;

/// Clinical NER detector.
pub struct ComprehendMedicalDetector {
    client: aws_sdk_comprehendmedical::Client,
    min_score: f32,
}

impl ComprehendMedicalDetector {
    /// Build a client whose calls give up after `operation_timeout`.
    pub fn new(config: &aws_config::SdkConfig, operation_timeout: Duration) -> Self {
        let conf = aws_sdk_comprehendmedical::config::Builder::from(config)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(operation_timeout)
                    .build(),
            )
            .build();
        Self {
            client: aws_sdk_comprehendmedical::Client::from_conf(conf),
            min_score: 0.5,
        }
    }

    /// Ignore entities scored below `min_score`.
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score.clamp(0.0, 1.0);
        self
    }

    async fn detect_phi(&self, text: &str) -> Result<Vec<PhiSpan>, DetectorError> {
        let response = self
            .client
            .detect_phi()
            .text(text)
            .send()
            .await
            .map_err(|e| DetectorError::Unavailable(e.into_service_error().to_string()))?;

        let mut spans = Vec::new();
        for entity in response.entities() {
            if entity.score().unwrap_or(0.0) < self.min_score {
                continue;
            }
            let (Some(begin), Some(end)) = (entity.begin_offset(), entity.end_offset()) else {
                continue;
            };
            let (Some(start), Some(end)) = (char_to_byte(text, begin), char_to_byte(text, end))
            else {
                return Err(DetectorError::InvalidResponse(
                    "entity offset outside input text".to_string(),
                ));
            };
            if start >= end {
                continue;
            }
            let entity_type = entity
                .r#type()
                .map(|t| normalize_entity_type(t.as_str()))
                .unwrap_or_else(|| "PHI".to_string());
            spans.push(PhiSpan::new(start, end, entity_type, DetectorId::ClinicalNer));
        }

        info!(entities = spans.len(), "clinical NER detection complete");

        Ok(spans)
    }
}

impl PhiDetector for ComprehendMedicalDetector {
    fn id(&self) -> DetectorId {
        DetectorId::ClinicalNer
    }

    fn detect<'a>(
        &'a self,
        text: &'a str,
    ) -> BoxFuture<'a, Result<Vec<PhiSpan>, DetectorError>> {
        Box::pin(self.detect_phi(text))
    }
}

/// Map a character index to a byte offset. `text.chars().count()` maps to
/// `text.len()`.
pub fn char_to_byte(text: &str, char_index: i32) -> Option<usize> {
    let idx = usize::try_from(char_index).ok()?;
    text.char_indices()
        .map(|(b, _)| b)
        .chain(std::iter::once(text.len()))
        .nth(idx)
}

/// Align Comprehend Medical's entity subtypes with the pattern detector's
/// labels.
pub fn normalize_entity_type(raw: &str) -> String {
    match raw.to_ascii_uppercase().as_str() {
        "PHONE_OR_FAX" => "PHONE".to_string(),
        "ID" => "IDENTIFIER".to_string(),
        other => other.to_string(),
    }
}
