use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::warn;

use psylens_core::models::phi::{DetectorId, PhiSpan};

use crate::error::{DetectorError, PhiError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A source of PHI spans.
///
/// Implementations are pure over their input: they never mutate the text and
/// hold no per-call state. Methods return boxed futures for dyn
/// compatibility.
pub trait PhiDetector: Send + Sync {
    fn id(&self) -> DetectorId;

    /// Find PHI spans in `text`. Offsets are UTF-8 byte offsets.
    fn detect<'a>(&'a self, text: &'a str)
        -> BoxFuture<'a, Result<Vec<PhiSpan>, DetectorError>>;
}

/// Which detectors must succeed for a detection pass to count, and how long
/// each one gets before it counts as failed.
#[derive(Debug, Clone)]
pub struct DetectionPolicy {
    pub required: Vec<DetectorId>,
    pub timeout: Duration,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            required: Vec::new(),
            timeout: Self::DEFAULT_TIMEOUT,
        }
    }
}

impl DetectionPolicy {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn requiring(id: DetectorId) -> Self {
        Self {
            required: vec![id],
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Spans from every detector that succeeded, plus the ones that did not.
#[derive(Debug, Default)]
pub struct Detection {
    pub spans: Vec<PhiSpan>,
    pub failed: Vec<DetectorId>,
}

impl Detection {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Run all detectors concurrently and concatenate their spans.
///
/// A failing detector is logged and skipped, and so is one that outlives
/// `policy.timeout`. The pass fails closed when no detector succeeds or when
/// a required detector fails.
pub async fn detect_all(
    detectors: &[Arc<dyn PhiDetector>],
    text: &str,
    policy: &DetectionPolicy,
) -> Result<Detection, PhiError> {
    if detectors.is_empty() {
        return Err(PhiError::NoDetectorsConfigured);
    }

    let timeout = policy.timeout;
    let outcomes = join_all(detectors.iter().map(|d| async move {
        let outcome = tokio::time::timeout(timeout, d.detect(text))
            .await
            .unwrap_or_else(|_| Err(DetectorError::Timeout(timeout)));
        (d.id(), outcome)
    }))
    .await;

    let mut detection = Detection::default();
    for (id, outcome) in outcomes {
        match outcome {
            Ok(spans) => detection.spans.extend(spans),
            Err(e) => {
                warn!(detector = %id, error = %e, "PHI detector failed, continuing without it");
                detection.failed.push(id);
            }
        }
    }

    if detection.failed.len() == detectors.len() {
        return Err(PhiError::AllDetectorsFailed {
            count: detectors.len(),
        });
    }

    if let Some(id) = policy
        .required
        .iter()
        .find(|id| detection.failed.contains(id))
    {
        return Err(PhiError::RequiredDetectorFailed(*id));
    }

    Ok(detection)
}


#[cfg(test)]
mod tests {
    use super::testing::{HangingDetector, StaticDetector};
    use super::*;

    #[tokio::test]
    async fn spans_from_all_detectors_are_concatenated() {
        let detectors = vec![
            StaticDetector::ok(
                DetectorId::ClinicalNer,
                vec![PhiSpan::new(0, 4, "NAME", DetectorId::ClinicalNer)],
            ),
            StaticDetector::ok(
                DetectorId::Pattern,
                vec![PhiSpan::new(10, 20, "PHONE", DetectorId::Pattern)],
            ),
        ];
        let detection = detect_all(&detectors, "text", &DetectionPolicy::default())
            .await
            .unwrap();
        assert_eq!(detection.spans.len(), 2);
        assert!(!detection.is_partial());
    }

    #[tokio::test]
    async fn one_failure_degrades_to_partial() {
        let detectors = vec![
            StaticDetector::failing(DetectorId::ClinicalNer),
            StaticDetector::ok(
                DetectorId::Pattern,
                vec![PhiSpan::new(0, 3, "SSN", DetectorId::Pattern)],
            ),
        ];
        let detection = detect_all(&detectors, "text", &DetectionPolicy::default())
            .await
            .unwrap();
        assert!(detection.is_partial());
        assert_eq!(detection.failed, vec![DetectorId::ClinicalNer]);
        assert_eq!(detection.spans.len(), 1);
    }

    #[tokio::test]
    async fn all_failures_fail_closed() {
        let detectors = vec![
            StaticDetector::failing(DetectorId::ClinicalNer),
            StaticDetector::failing(DetectorId::Pattern),
        ];
        let err = detect_all(&detectors, "text", &DetectionPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PhiError::AllDetectorsFailed { count: 2 }));
    }

    #[tokio::test]
    async fn required_detector_failure_fails_closed() {
        let detectors = vec![
            StaticDetector::failing(DetectorId::ClinicalNer),
            StaticDetector::ok(DetectorId::Pattern, vec![]),
        ];
        let err = detect_all(
            &detectors,
            "text",
            &DetectionPolicy::requiring(DetectorId::ClinicalNer),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            PhiError::RequiredDetectorFailed(DetectorId::ClinicalNer)
        ));
    }

    #[tokio::test]
    async fn hung_detector_times_out_as_partial() {
        let detectors: Vec<Arc<dyn PhiDetector>> = vec![
            Arc::new(HangingDetector(DetectorId::ClinicalNer)),
            StaticDetector::ok(
                DetectorId::Pattern,
                vec![PhiSpan::new(0, 3, "SSN", DetectorId::Pattern)],
            ),
        ];
        let policy = DetectionPolicy::default().with_timeout(Duration::from_millis(50));

        let detection = tokio::time::timeout(
            Duration::from_secs(5),
            detect_all(&detectors, "text", &policy),
        )
        .await
        .expect("detection must not wait on a hung detector")
        .unwrap();
        assert_eq!(detection.failed, vec![DetectorId::ClinicalNer]);
        assert_eq!(detection.spans.len(), 1);
    }

    #[tokio::test]
    async fn hung_required_detector_fails_closed() {
        let detectors: Vec<Arc<dyn PhiDetector>> = vec![
            Arc::new(HangingDetector(DetectorId::ClinicalNer)),
            StaticDetector::ok(DetectorId::Pattern, vec![]),
        ];
        let policy = DetectionPolicy::requiring(DetectorId::ClinicalNer)
            .with_timeout(Duration::from_millis(50));

        let err = detect_all(&detectors, "text", &policy).await.unwrap_err();
        assert!(matches!(
            err,
            PhiError::RequiredDetectorFailed(DetectorId::ClinicalNer)
        ));
    }

    #[tokio::test]
    async fn no_detectors_is_an_error() {
        let err = detect_all(&[], "text", &DetectionPolicy::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PhiError::NoDetectorsConfigured));
    }
}
