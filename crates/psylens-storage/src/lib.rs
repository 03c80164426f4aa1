//! psylens-storage
//!
//! Encrypted JSON documents in a single S3 bucket.

pub mod bucket;
pub mod error;
