//! PR discovery/readiness and merge-execution pipelines for botmerge-tools.
//!
//! The [`processor::Processor`] fans out over the configured repositories,
//! applies the skip filters and readiness rules to every discovered pull
//! request, and returns one [`botmerge_core::types::ProcessResult`] per
//! repository. The [`merger::Merger`] takes that output and executes (or
//! simulates) the merges. Both pipelines isolate failures at repository and
//! PR granularity: one bad repository or PR never aborts the batch.

pub mod merger;
pub mod processor;

pub use merger::{MergeOptions, Merger};
pub use processor::{ProcessOptions, Processor};
