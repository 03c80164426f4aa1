//! psylens-analysis
//!
//! Prompt construction, result parsing and the orchestrator that drives
//! Detect → Mask → Prompt → Infer → Parse for single, background and
//! composite analyses.

pub mod error;
pub mod insights;
pub mod orchestrator;
pub mod parse;
pub mod pipeline;
pub mod prompts;
pub mod registry;
pub mod store;
pub mod tasks;
