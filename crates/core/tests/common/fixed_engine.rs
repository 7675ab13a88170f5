//! Deterministic merge engine.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use multimerge_core::ai::MergeEngine;
use multimerge_core::errors::AiError;
use multimerge_core::models::{AiMergePrefs, AiMergeResult, ConflictContext};

/// Returns a fixed result per file path (or a default), and records every
/// request.
pub struct FixedEngine {
    default: AiMergeResult,
    per_file: Mutex<HashMap<String, AiMergeResult>>,
    missing_key: bool,
    calls: Mutex<Vec<(ConflictContext, AiMergePrefs)>>,
}

impl FixedEngine {
    pub fn succeeding(content: &str) -> Self {
        Self {
            default: AiMergeResult::Success(content.to_string()),
            per_file: Mutex::new(HashMap::new()),
            missing_key: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            default: AiMergeResult::Failure(reason.to_string()),
            ..Self::succeeding("")
        }
    }

    /// Pre-flight reports a missing API key.
    pub fn without_key() -> Self {
        Self {
            missing_key: true,
            ..Self::succeeding("unused")
        }
    }

    pub fn respond(self, path: &str, result: AiMergeResult) -> Self {
        self.per_file
            .lock()
            .unwrap()
            .insert(path.to_string(), result);
        self
    }

    pub fn calls(&self) -> Vec<(ConflictContext, AiMergePrefs)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl MergeEngine for FixedEngine {
    async fn merge(&self, context: &ConflictContext, prefs: &AiMergePrefs) -> AiMergeResult {
        self.calls
            .lock()
            .unwrap()
            .push((context.clone(), prefs.clone()));
        self.per_file
            .lock()
            .unwrap()
            .get(&context.file_path)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }

    fn preflight(&self) -> Result<(), AiError> {
        if self.missing_key {
            return Err(AiError::MissingApiKey);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
