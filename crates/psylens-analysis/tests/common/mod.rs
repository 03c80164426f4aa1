//! Fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use psylens_analysis::orchestrator::{Orchestrator, OrchestratorConfig};
use psylens_analysis::pipeline::AnalysisPipeline;
use psylens_analysis::registry::AnalysisRegistry;
use psylens_analysis::error::AnalysisError;
use psylens_analysis::store::{self, InMemoryResultStore, ResultStore};
use psylens_bedrock::adapter::InferenceAdapter;
use psylens_bedrock::error::ModelInferenceError;
use psylens_bedrock::model::{BoxFuture, Generation, TextModel};
use psylens_core::models::analysis::GenerationParams;
use psylens_core::models::phi::{DetectorId, PhiSpan};
use psylens_core::models::result::AnalysisResult;
use psylens_phi::detector::{self, PhiDetector};
use psylens_phi::error::DetectorError;
use psylens_phi::patterns::PatternDetector;
use psylens_phi::scrubber::PhiScrubber;
use psylens_storage::error::StorageError;
use uuid::Uuid;

pub const RISK_REPLY: &str =
    "Risk Level: medium\nRationale: shows hopelessness\nKey Indicators: hopelessness, withdrawal";
pub const DEPRESSION_REPLY: &str = "Depression Indicated: yes\nSeverity: mild\nConfidence: medium\nKey Indicators: low mood\nRationale: reports low mood";
pub const SENTIMENT_REPLY: &str =
    "Overall Sentiment: negative\nSentiment Score: -0.5\nEmotions: sadness\nRationale: sad tone";
pub const WELLNESS_REPLY: &str = "Emotional: 3\nSocial: 4\nPhysical: 6\nOccupational: 7\nIntellectual: 7\nSpiritual: 5\nSummary: emotionally strained";
pub const PROGRESS_REPLY: &str =
    "Overall Progress: improved\nImprovements: sleep\nConcerns: none\nSummary: sleeping better";

/// Answers each prompt with the block its format asks for.
pub struct FakeModel {
    delay: Duration,
    /// Prompts containing this marker fail with a backend error.
    fail_marker: Option<&'static str>,
    garbage: bool,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    pub fn new() -> Arc<Self> {
        Self::build(Duration::ZERO, None, false)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::build(delay, None, false)
    }

    pub fn failing_on(marker: &'static str) -> Arc<Self> {
        Self::build(Duration::ZERO, Some(marker), false)
    }

    pub fn garbage() -> Arc<Self> {
        Self::build(Duration::ZERO, None, true)
    }

    fn build(delay: Duration, fail_marker: Option<&'static str>, garbage: bool) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_marker,
            garbage,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn reply_for(&self, prompt: &str) -> Result<String, ModelInferenceError> {
        if let Some(marker) = self.fail_marker {
            if prompt.contains(marker) {
                return Err(ModelInferenceError::Backend("service unavailable".to_string()));
            }
        }
        if self.garbage {
            return Ok("I would rather not answer in that format.".to_string());
        }
        let reply = if prompt.contains("Risk Level:") {
            RISK_REPLY
        } else if prompt.contains("Depression Indicated:") {
            DEPRESSION_REPLY
        } else if prompt.contains("Overall Sentiment:") {
            SENTIMENT_REPLY
        } else if prompt.contains("Emotional: <1-10>") {
            WELLNESS_REPLY
        } else {
            PROGRESS_REPLY
        };
        Ok(reply.to_string())
    }
}

impl TextModel for FakeModel {
    fn model_version(&self) -> &str {
        "fake-model-v1"
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        _params: &'a GenerationParams,
    ) -> BoxFuture<'a, Result<Generation, ModelInferenceError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts.lock().unwrap().push(prompt.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply_for(prompt).map(|text| Generation { text, usage: None })
        })
    }
}

/// NER stand-in that either finds nothing or is unavailable.
pub struct FakeNer {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeNer {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PhiDetector for FakeNer {
    fn id(&self) -> DetectorId {
        DetectorId::ClinicalNer
    }

    fn detect<'a>(
        &'a self,
        _text: &'a str,
    ) -> detector::BoxFuture<'a, Result<Vec<PhiSpan>, DetectorError>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DetectorError::Unavailable("endpoint unreachable".to_string()))
            } else {
                Ok(Vec::<PhiSpan>::new())
            }
        })
    }
}

pub fn patterns() -> Arc<dyn PhiDetector> {
    Arc::new(PatternDetector::new().unwrap())
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub model: Arc<FakeModel>,
    pub results: Arc<InMemoryResultStore>,
}

pub fn harness(model: Arc<FakeModel>, detectors: Vec<Arc<dyn PhiDetector>>) -> Harness {
    harness_with(model, detectors, AnalysisRegistry::standard().unwrap())
}

pub fn harness_with(
    model: Arc<FakeModel>,
    detectors: Vec<Arc<dyn PhiDetector>>,
    registry: AnalysisRegistry,
) -> Harness {
    let adapter = InferenceAdapter::new(model.clone()).with_timeout(Duration::from_secs(10));
    let pipeline = AnalysisPipeline::new(PhiScrubber::new(detectors), Arc::new(registry), adapter);
    let results = Arc::new(InMemoryResultStore::new());
    let config = OrchestratorConfig {
        workers: 2,
        queue_capacity: 8,
        ..OrchestratorConfig::default()
    };
    let orchestrator = Orchestrator::new(pipeline, results.clone(), config);
    Harness {
        orchestrator,
        model,
        results,
    }
}

/// In-memory store that can acknowledge writes late or refuse the n-th one.
pub struct TestStore {
    results: InMemoryResultStore,
    ack_delay: Duration,
    fail_on_put: Option<usize>,
    puts: AtomicUsize,
}

impl TestStore {
    /// Writes land immediately but `put` only returns after `delay`.
    pub fn slow_ack(delay: Duration) -> Arc<Self> {
        Self::build(delay, None)
    }

    /// The `n`-th put (1-based) fails without writing.
    pub fn failing_on_put(n: usize) -> Arc<Self> {
        Self::build(Duration::ZERO, Some(n))
    }

    fn build(ack_delay: Duration, fail_on_put: Option<usize>) -> Arc<Self> {
        Arc::new(Self {
            results: InMemoryResultStore::new(),
            ack_delay,
            fail_on_put,
            puts: AtomicUsize::new(0),
        })
    }

    pub async fn len(&self) -> usize {
        self.results.len().await
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl ResultStore for TestStore {
    fn put<'a>(
        &'a self,
        result: &'a AnalysisResult,
    ) -> store::BoxFuture<'a, Result<(), AnalysisError>> {
        Box::pin(async move {
            let n = self.puts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on_put == Some(n) {
                return Err(AnalysisError::Storage(StorageError::Put {
                    key: result.request_id.to_string(),
                    message: "service unavailable".to_string(),
                }));
            }
            self.results.put(result).await?;
            if !self.ack_delay.is_zero() {
                tokio::time::sleep(self.ack_delay).await;
            }
            Ok(())
        })
    }

    fn get<'a>(
        &'a self,
        result_id: Uuid,
    ) -> store::BoxFuture<'a, Result<Option<AnalysisResult>, AnalysisError>> {
        self.results.get(result_id)
    }

    fn delete<'a>(&'a self, result_id: Uuid) -> store::BoxFuture<'a, Result<(), AnalysisError>> {
        self.results.delete(result_id)
    }
}

/// Orchestrator over the pattern detector and a caller-supplied store.
pub fn orchestrator_with_store(
    model: Arc<FakeModel>,
    results: Arc<dyn ResultStore>,
    workers: usize,
) -> Orchestrator {
    let config = OrchestratorConfig {
        workers,
        queue_capacity: 8,
        ..OrchestratorConfig::default()
    };
    orchestrator_with_config(model, results, config)
}

pub fn orchestrator_with_config(
    model: Arc<FakeModel>,
    results: Arc<dyn ResultStore>,
    config: OrchestratorConfig,
) -> Orchestrator {
    let adapter = InferenceAdapter::new(model).with_timeout(Duration::from_secs(10));
    let pipeline = AnalysisPipeline::new(
        PhiScrubber::new(vec![patterns()]),
        Arc::new(AnalysisRegistry::standard().unwrap()),
        adapter,
    );
    Orchestrator::new(pipeline, results, config)
}
