//! multimerge core library.
//!
//! This crate provides the building blocks for merging one branch into many
//! git working trees: configuration, the git command gateway, the per-repo
//! merge controller, and AI-assisted conflict resolution through an
//! OpenAI-compatible completion endpoint.

pub mod ai;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod events;
pub mod git;
pub mod merge;
pub mod models;

// Re-exports for convenience.
pub use ai::{MergeEngine, OpenAiCompatibleEngine};
pub use config::AppConfig;
pub use events::{EventSink, MergeEvent};
pub use git::{CommandGateway, GitCli, RepositoryHandle};
pub use merge::MergeController;
pub use models::{MergeOptions, RepoOutcome, RepoStatus, RunReport};
