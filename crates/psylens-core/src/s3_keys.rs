//! S3 key/path conventions.
//!
//! Pure string functions with no AWS SDK dependency. These define the canonical
//! layout of objects in the Psylens S3 bucket.

use uuid::Uuid;

pub const ANALYSIS_RESULTS_PREFIX: &str = "analysis/results/";

pub fn analysis_result(id: Uuid) -> String {
    format!("{ANALYSIS_RESULTS_PREFIX}{id}.json")
}
