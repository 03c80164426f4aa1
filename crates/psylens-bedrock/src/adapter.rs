use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::{info, warn};

use psylens_core::models::analysis::GenerationParams;

use crate::error::ModelInferenceError;
use crate::model::TextModel;

/// Wraps the model capability with a hard timeout and a concurrency ceiling.
///
/// Calls beyond the ceiling wait for a permit rather than being rejected.
/// Nothing is retried here; retry is the orchestrator's decision. Only
/// lengths, durations and token counts are logged, never prompt or response
/// text.
#[derive(Clone)]
pub struct InferenceAdapter {
    model: Arc<dyn TextModel>,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl InferenceAdapter {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
    pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

    pub fn new(model: Arc<dyn TextModel>) -> Self {
        Self {
            model,
            timeout: Self::DEFAULT_TIMEOUT,
            permits: Arc::new(Semaphore::new(Self::DEFAULT_MAX_CONCURRENCY)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(max.max(1)));
        self
    }

    pub fn model_version(&self) -> &str {
        self.model.model_version()
    }

    /// Permits not currently held by an in-flight call.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Send `prompt` to the model and return the raw generated text.
    pub async fn analyze_text(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<String, ModelInferenceError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| ModelInferenceError::Unavailable("inference pool closed".to_string()))?;

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.timeout, self.model.generate(prompt, params)).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let generation = match outcome {
            Err(_) => {
                warn!(
                    prompt_len = prompt.len(),
                    duration_ms,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "model call timed out"
                );
                return Err(ModelInferenceError::Timeout(self.timeout));
            }
            Ok(Err(e)) => {
                warn!(prompt_len = prompt.len(), duration_ms, error = %e, "model call failed");
                return Err(e);
            }
            Ok(Ok(generation)) => generation,
        };

        if generation.text.trim().is_empty() {
            warn!(prompt_len = prompt.len(), duration_ms, "model returned empty text");
            return Err(ModelInferenceError::MalformedResponse(
                "model returned no text".to_string(),
            ));
        }

        let usage = generation.usage.unwrap_or_default();
        info!(
            model = self.model.model_version(),
            prompt_len = prompt.len(),
            response_len = generation.text.len(),
            duration_ms,
            input_tokens = usage.input,
            output_tokens = usage.output,
            total_tokens = usage.total(),
            "model call complete"
        );

        Ok(generation.text)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::model::{BoxFuture, Generation};

    struct ScriptedModel {
        reply: Option<&'static str>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(reply: Option<&'static str>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                reply,
                delay,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            })
        }
    }

    impl TextModel for ScriptedModel {
        fn model_version(&self) -> &str {
            "scripted-v1"
        }

        fn generate<'a>(
            &'a self,
            _prompt: &'a str,
            _params: &'a GenerationParams,
        ) -> BoxFuture<'a, Result<Generation, ModelInferenceError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(self.delay).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                match self.reply {
                    Some(text) => Ok(Generation {
                        text: text.to_string(),
                        usage: None,
                    }),
                    None => Err(ModelInferenceError::Backend("throttled".to_string())),
                }
            })
        }
    }

    #[tokio::test]
    async fn returns_generated_text() {
        let model = ScriptedModel::new(Some("Risk Level: low"), Duration::ZERO);
        let adapter = InferenceAdapter::new(model.clone());
        let text = adapter
            .analyze_text("prompt", &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(text, "Risk Level: low");
        assert_eq!(adapter.model_version(), "scripted-v1");
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn times_out_slow_calls() {
        let model = ScriptedModel::new(Some("late"), Duration::from_secs(5));
        let adapter = InferenceAdapter::new(model).with_timeout(Duration::from_millis(20));
        let err = adapter
            .analyze_text("prompt", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelInferenceError::Timeout(_)));
        // The permit is released after a timeout.
        assert_eq!(
            adapter.available_permits(),
            InferenceAdapter::DEFAULT_MAX_CONCURRENCY
        );
    }

    #[tokio::test]
    async fn backend_errors_are_not_retried() {
        let model = ScriptedModel::new(None, Duration::ZERO);
        let adapter = InferenceAdapter::new(model.clone());
        let err = adapter
            .analyze_text("prompt", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelInferenceError::Backend(_)));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_text_is_malformed() {
        let model = ScriptedModel::new(Some("   "), Duration::ZERO);
        let adapter = InferenceAdapter::new(model);
        let err = adapter
            .analyze_text("prompt", &GenerationParams::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ModelInferenceError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn concurrency_ceiling_is_respected() {
        let model = ScriptedModel::new(Some("ok"), Duration::from_millis(20));
        let adapter = InferenceAdapter::new(model.clone()).with_max_concurrency(2);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let adapter = adapter.clone();
            handles.push(tokio::spawn(async move {
                adapter
                    .analyze_text("prompt", &GenerationParams::default())
                    .await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap().is_ok());
        }

        assert_eq!(model.calls.load(Ordering::SeqCst), 8);
        assert!(model.max_in_flight.load(Ordering::SeqCst) <= 2);
    }
}
