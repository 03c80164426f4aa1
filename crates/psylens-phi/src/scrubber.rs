use std::sync::Arc;

use tracing::{info, warn};

use psylens_core::models::phi::{MaskMode, MaskingMetadata};

use crate::detector::{DetectionPolicy, PhiDetector, detect_all};
use crate::error::PhiError;
use crate::mask::mask_phi;

/// Text with PHI masked, plus what was masked.
#[derive(Debug, Clone)]
pub struct Scrubbed {
    pub text: String,
    pub metadata: MaskingMetadata,
}

/// Detection and masking in one fail-closed step.
///
/// Stateless apart from its configuration; safe to share across tasks.
#[derive(Clone)]
pub struct PhiScrubber {
    detectors: Vec<Arc<dyn PhiDetector>>,
    policy: DetectionPolicy,
    mode: MaskMode,
}

impl PhiScrubber {
    pub fn new(detectors: Vec<Arc<dyn PhiDetector>>) -> Self {
        Self {
            detectors,
            policy: DetectionPolicy::default(),
            mode: MaskMode::default(),
        }
    }

    pub fn with_policy(mut self, policy: DetectionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_mode(mut self, mode: MaskMode) -> Self {
        self.mode = mode;
        self
    }

    /// Detect and mask PHI in `text`.
    ///
    /// Errors mean PHI safety could not be established and the text must not
    /// leave the process.
    pub async fn scrub(&self, text: &str) -> Result<Scrubbed, PhiError> {
        let detection = detect_all(&self.detectors, text, &self.policy).await?;
        let partial = detection.is_partial();

        let (masked, mut metadata) = mask_phi(text, &detection.spans, self.mode);
        metadata.detection_partial = partial;
        metadata.failed_detectors = detection.failed;

        if partial {
            warn!(
                failed = metadata.failed_detectors.len(),
                "PHI masking ran with a partial detector set"
            );
        }
        info!(
            phi_detected = metadata.phi_detected,
            entity_count = metadata.entity_count,
            "PHI masking complete"
        );

        Ok(Scrubbed {
            text: masked,
            metadata,
        })
    }
}
