//! The completion-engine contract.

use async_trait::async_trait;

use crate::errors::AiError;
use crate::models::{AiMergePrefs, AiMergeResult, ConflictContext};

/// Something that can turn a three-way conflict into merged file content.
///
/// Implementations never return an error for a single file: every problem is
/// reported as [`AiMergeResult::Failure`] so the pipeline can move on to the
/// next file.
#[async_trait]
pub trait MergeEngine: Send + Sync {
    /// Produce merged content for one conflicted file.
    async fn merge(&self, context: &ConflictContext, prefs: &AiMergePrefs) -> AiMergeResult;

    /// Check that the engine can be used at all before the first call.
    ///
    /// The default accepts; the HTTP engine rejects a missing key when the
    /// deployment requires one.
    fn preflight(&self) -> Result<(), AiError> {
        Ok(())
    }

    /// Short name for log lines.
    fn name(&self) -> &str;
}
