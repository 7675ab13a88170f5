//! Conflict resolution after a failed merge.
//!
//! 1. **Pipeline** -- lists unmerged files and drives the completion engine
//!    over each one, writing and staging what it returns.
//! 2. **Sanitize** -- turns raw engine output into file content that matches
//!    the "ours" side's conventions.

pub mod pipeline;
pub mod sanitize;

pub use pipeline::{ConflictPipeline, FileReport, FileResolution, PipelineReport};
pub use sanitize::sanitize_merged_text;
