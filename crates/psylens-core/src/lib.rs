//! psylens-core
//!
//! Pure domain types and S3 key conventions for the analysis pipeline.
//! No AWS SDK dependency; this is the shared vocabulary of the Psylens system.

pub mod error;
pub mod models;
pub mod s3_keys;
