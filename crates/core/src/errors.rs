//! Error types for the multimerge core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Ai(#[from] AiError),

    #[error(transparent)]
    WriteOrStage(#[from] WriteOrStageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Handoff(#[from] HandoffError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

// ---------------------------------------------------------------------------
// Gateway errors
// ---------------------------------------------------------------------------

/// Errors raised when a git subprocess could not be run at all.
///
/// A command that runs and exits non-zero is *not* an error at this level;
/// it comes back as a failed [`CommandResult`](crate::git::CommandResult).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// The working-tree root does not exist.
    #[error("working tree not found at '{0}'")]
    RootNotFound(String),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Merge controller errors
// ---------------------------------------------------------------------------

/// Failures of a single step of the per-repository merge state machine.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
    /// A git command exited non-zero (or could not be spawned).
    #[error("command failed: {command}: {output}")]
    CommandFailed { command: String, output: String },

    /// Neither the local branch nor `origin/<branch>` exists.
    #[error("branch '{0}' not found locally or on origin")]
    RefNotFound(String),

    /// `git stash push` failed on a dirty working tree.
    #[error("auto-stash failed: {0}")]
    StashFailed(String),

    /// `git stash pop` failed; the stash is still on the stack.
    #[error("stash pop failed, resolve manually: {0}")]
    StashPopFailed(String),

    /// The merge failed but left no conflicted files behind.
    #[error("merge failed without conflicts (bad ref or non-mergeable state): {0}")]
    MergeFailedNoConflicts(String),

    /// Conflicts are still present after the AI pass.
    #[error("{} conflicted file(s) remain", .0.len())]
    ConflictsRemain(Vec<String>),

    /// `git push` failed.
    #[error("push failed: {0}")]
    PushFailed(String),

    /// The AI step could not start (e.g. missing API key).
    #[error("AI pre-flight failed: {0}")]
    AiPreflight(String),
}

// ---------------------------------------------------------------------------
// AI engine errors
// ---------------------------------------------------------------------------

/// Errors from the completion engine and the three-way blob extraction that
/// feeds it.
#[derive(Debug, Error)]
pub enum AiError {
    /// The provider answered with a non-success status code.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A key is required by the deployment but none is configured.
    #[error("no API key configured (set one or disable require_api_key)")]
    MissingApiKey,

    /// The provider answered 2xx but without a completion choice.
    #[error("No content from provider")]
    NoContent,

    /// One of the three index stages could not be read.
    #[error("missing index stage {stage} for '{path}'")]
    MissingBlob { stage: u8, path: String },

    /// An index stage holds bytes that are not UTF-8 text (binary, Latin-1).
    #[error("index stage {stage} of '{path}' is not UTF-8 text")]
    NotText { stage: u8, path: String },

    /// HTTP-level transport error (network, TLS, timeout).
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body was not the expected JSON shape.
    #[error("invalid response from provider: {0}")]
    Decode(String),
}

// ---------------------------------------------------------------------------
// Hand-off errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum HandoffError {
    /// The external resolution tool could not be started.
    #[error("could not launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Write / stage errors
// ---------------------------------------------------------------------------

/// Errors while applying a resolved file to the working tree.
#[derive(Debug, Error)]
pub enum WriteOrStageError {
    /// Writing the merged content failed.
    #[error("could not write '{path}': {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// `git add` failed after the content was written.
    #[error("git add failed for '{path}': {output}")]
    Stage { path: String, output: String },
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Repository errors
// ---------------------------------------------------------------------------

/// Errors opening or discovering working trees.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The path does not exist or is not inside a git working tree.
    #[error("git repository not found at '{0}'")]
    NotFound(String),

    /// The repository is bare and has no working tree.
    #[error("repository at '{0}' has no working tree")]
    Bare(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper.
    #[error("repository I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = AiError::Http {
            status: 401,
            body: "unauthorized".into(),
        };
        assert_eq!(err.to_string(), "HTTP 401: unauthorized");

        assert_eq!(AiError::NoContent.to_string(), "No content from provider");

        let err = AiError::NotText {
            stage: 2,
            path: "legacy.txt".into(),
        };
        assert_eq!(err.to_string(), "index stage 2 of 'legacy.txt' is not UTF-8 text");

        let err = MergeError::RefNotFound("release".into());
        assert_eq!(
            err.to_string(),
            "branch 'release' not found locally or on origin"
        );

        let err = MergeError::ConflictsRemain(vec!["a.cs".into(), "b.json".into()]);
        assert_eq!(err.to_string(), "2 conflicted file(s) remain");

        let err = ConfigError::InvalidValue {
            field: "ai.base_url".into(),
            detail: "must start with http:// or https://".into(),
        };
        assert!(err.to_string().contains("ai.base_url"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = MergeError::PushFailed("rejected".into()).into();
        assert!(matches!(core_err, CoreError::Merge(_)));

        let core_err: CoreError = AiError::MissingApiKey.into();
        assert!(matches!(core_err, CoreError::Ai(_)));

        let core_err: CoreError = GatewayError::BinaryNotFound("git".into()).into();
        assert!(matches!(core_err, CoreError::Gateway(_)));
    }
}
