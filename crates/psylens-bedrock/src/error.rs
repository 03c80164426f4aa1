use std::time::Duration;

use thiserror::Error;

/// The one error type for any failure of the model call.
///
/// Messages describe the failure only; they never carry prompt or response
/// text.
#[derive(Debug, Error)]
pub enum ModelInferenceError {
    #[error("model call timed out after {0:?}")]
    Timeout(Duration),

    #[error("model invocation failed: {0}")]
    Backend(String),

    #[error("malformed model response: {0}")]
    MalformedResponse(String),

    #[error("model unavailable: {0}")]
    Unavailable(String),
}
