//! psylens-bedrock
//!
//! The single external model call: a `TextModel` capability (Bedrock
//! Converse in production) wrapped by an `InferenceAdapter` that owns the
//! timeout and concurrency ceiling.

pub mod adapter;
pub mod error;
pub mod model;
pub mod tokens;
