//! psylens-phi
//!
//! PHI detection and masking. Detectors find spans, the masking engine
//! rewrites text, and [`scrubber::PhiScrubber`] ties the two together with
//! a fail-closed policy.

pub mod comprehend;
pub mod detector;
pub mod error;
pub mod mask;
pub mod patterns;
pub mod scrubber;
