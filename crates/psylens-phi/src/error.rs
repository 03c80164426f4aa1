use std::time::Duration;

use thiserror::Error;

use psylens_core::models::phi::DetectorId;

/// Failure of a single detector. Absorbed by the scrubber unless every
/// detector fails or the detector is required.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("detector service unavailable: {0}")]
    Unavailable(String),

    #[error("detector returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("detector misconfigured: {0}")]
    Config(String),

    #[error("detector did not answer within {0:?}")]
    Timeout(Duration),
}

/// PHI safety could not be established; nothing may be sent downstream.
#[derive(Debug, Error)]
pub enum PhiError {
    #[error("no PHI detectors configured")]
    NoDetectorsConfigured,

    #[error("all {count} PHI detectors failed")]
    AllDetectorsFailed { count: usize },

    #[error("required PHI detector '{0}' failed")]
    RequiredDetectorFailed(DetectorId),
}
