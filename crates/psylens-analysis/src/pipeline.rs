use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;
use uuid::Uuid;

use psylens_bedrock::adapter::InferenceAdapter;
use psylens_core::models::analysis::AnalysisRequest;
use psylens_core::models::result::AnalysisResult;
use psylens_phi::scrubber::PhiScrubber;

use crate::error::AnalysisError;
use crate::registry::AnalysisRegistry;

/// One analysis, start to finish: Detect → Mask → Prompt → Infer → Parse.
///
/// Stages run strictly in that order. Nothing reaches the inference adapter
/// until every piece of caller text has been masked, and a detection failure
/// stops the run before a prompt exists.
#[derive(Clone)]
pub struct AnalysisPipeline {
    scrubber: PhiScrubber,
    registry: Arc<AnalysisRegistry>,
    adapter: InferenceAdapter,
}

impl AnalysisPipeline {
    pub fn new(scrubber: PhiScrubber, registry: Arc<AnalysisRegistry>, adapter: InferenceAdapter) -> Self {
        Self {
            scrubber,
            registry,
            adapter,
        }
    }

    pub fn registry(&self) -> &AnalysisRegistry {
        &self.registry
    }

    pub fn model_version(&self) -> &str {
        self.adapter.model_version()
    }

    pub async fn run(
        &self,
        request_id: Uuid,
        request: &AnalysisRequest,
    ) -> Result<AnalysisResult, AnalysisError> {
        let analysis_type = request.analysis_type;
        let started = Instant::now();

        self.registry.validate_request(request)?;

        let scrubbed = self.scrubber.scrub(&request.text_content).await?;
        let mut masking = scrubbed.metadata;

        let mut options = BTreeMap::new();
        for (key, value) in &request.prompt_options {
            let masked = self.scrubber.scrub(value).await?;
            masking.absorb(masked.metadata);
            options.insert(key.clone(), masked.text);
        }

        let prompt = self
            .registry
            .build_prompt(analysis_type, &scrubbed.text, &options)?;

        let raw = self.adapter.analyze_text(&prompt, &request.parameters).await?;

        let structured_result = self.registry.parse(analysis_type, &raw)?;

        let result = AnalysisResult {
            request_id,
            analysis_type,
            structured_result,
            model_version: self.adapter.model_version().to_string(),
            phi_detected: masking.phi_detected,
            phi_detection_partial: masking.detection_partial,
            timestamp: jiff::Timestamp::now(),
        };

        info!(
            %request_id,
            analysis_type = %analysis_type,
            phi_entities = masking.entity_count,
            phi_partial = masking.detection_partial,
            requires_review = result.requires_review(),
            duration_ms = started.elapsed().as_millis() as u64,
            "analysis complete"
        );

        Ok(result)
    }
}
