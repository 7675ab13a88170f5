//! AI-assisted merging: the completion-engine contract and its
//! OpenAI-compatible implementation.

pub mod engine;
pub mod language;
pub mod openai;
pub mod prompt;

pub use engine::MergeEngine;
pub use language::Language;
pub use openai::{OpenAiCompatibleEngine, ProviderSettings};
