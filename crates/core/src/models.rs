//! Domain model types used throughout multimerge.
//!
//! These types bridge the merge controller, the conflict pipeline, the
//! completion engine, and whatever host renders a run.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ai::language::Language;
use crate::errors::MergeError;

// ---------------------------------------------------------------------------
// Merge options
// ---------------------------------------------------------------------------

/// User-authored options for one batch run. Read-only once the run starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MergeOptions {
    /// Branch to merge into every repository's current branch.
    #[serde(default)]
    pub source_branch: String,

    /// Run `git fetch --all --prune` first.
    #[serde(default = "default_true")]
    pub fetch_before_merge: bool,

    /// Stash tracked and untracked changes when the tree is dirty.
    #[serde(default = "default_true")]
    pub stash_if_dirty: bool,

    /// Merge into a dirty tree when not stashing (or when the stash failed).
    #[serde(default)]
    pub allow_dirty_merge: bool,

    /// Pass `--no-ff` to `git merge`.
    #[serde(default)]
    pub no_fast_forward: bool,

    /// Pass `--squash` to `git merge`.
    #[serde(default)]
    pub squash: bool,

    /// Run `git push` after a successful merge.
    #[serde(default)]
    pub push_after_merge: bool,

    /// Abort the whole batch on the first qualifying failure instead of
    /// skipping to the next repository.
    #[serde(default = "default_true")]
    pub stop_on_conflict: bool,

    /// Count untracked files when deciding whether a tree is dirty.
    #[serde(default)]
    pub include_untracked: bool,

    /// Output-language hint for the completion engine.
    #[serde(default)]
    pub language_mode: LanguageMode,
}

fn default_true() -> bool {
    true
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            source_branch: String::new(),
            fetch_before_merge: true,
            stash_if_dirty: true,
            allow_dirty_merge: false,
            no_fast_forward: false,
            squash: false,
            push_after_merge: false,
            stop_on_conflict: true,
            include_untracked: false,
            language_mode: LanguageMode::Auto,
        }
    }
}

/// Either infer the language from each file's extension, or force one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LanguageMode {
    #[default]
    Auto,
    Fixed(Language),
}

impl LanguageMode {
    /// The hint to send for `rel_path` under this mode.
    pub fn hint_for(&self, rel_path: &str) -> Language {
        match self {
            Self::Auto => Language::from_path(rel_path),
            Self::Fixed(language) => *language,
        }
    }
}

impl fmt::Display for LanguageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => write!(f, "Auto"),
            Self::Fixed(language) => write!(f, "{}", language),
        }
    }
}

impl FromStr for LanguageMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        s.parse::<Language>().map(Self::Fixed)
    }
}

impl TryFrom<String> for LanguageMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LanguageMode> for String {
    fn from(mode: LanguageMode) -> Self {
        mode.to_string()
    }
}

// ---------------------------------------------------------------------------
// AI merge contract
// ---------------------------------------------------------------------------

/// The three index-stage texts of one conflicted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictContext {
    /// Path relative to the working-tree root.
    pub file_path: String,
    pub base: String,
    pub ours: String,
    pub theirs: String,
}

/// Per-request preferences for the completion engine.
#[derive(Debug, Clone, PartialEq)]
pub struct AiMergePrefs {
    pub language_hint: Option<Language>,
    pub max_tokens: u32,
    pub temperature: f64,
    /// `git add` the file after writing merged content.
    pub stage_on_success: bool,
}

impl Default for AiMergePrefs {
    fn default() -> Self {
        Self {
            language_hint: None,
            max_tokens: 8000,
            temperature: 0.1,
            stage_on_success: true,
        }
    }
}

impl AiMergePrefs {
    /// Copy of these prefs with a per-file language hint.
    pub fn with_language(&self, language: Language) -> Self {
        Self {
            language_hint: Some(language),
            ..self.clone()
        }
    }
}

/// What the completion engine produced for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiMergeResult {
    Success(String),
    Failure(String),
}

impl AiMergeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

// ---------------------------------------------------------------------------
// Run outcome
// ---------------------------------------------------------------------------

/// How processing of one repository ended.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RepoStatus {
    /// Not processed (batch aborted or cancelled earlier).
    #[default]
    Pending,
    /// Merge (and optional unstash/push) completed.
    Merged,
    /// Merge completed after the AI pass resolved every conflict.
    ResolvedByAi,
    /// Conflicts remain and were handed off for interactive resolution.
    ConflictsRemaining,
    /// Skipped; the batch moved on to the next repository.
    Skipped,
    /// Processing stopped here and the batch was aborted.
    Aborted,
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Merged => write!(f, "merged"),
            Self::ResolvedByAi => write!(f, "resolved_by_ai"),
            Self::ConflictsRemaining => write!(f, "conflicts_remaining"),
            Self::Skipped => write!(f, "skipped"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Outcome record returned by each per-repository step.
#[derive(Debug, Clone, Default)]
pub struct RepoOutcome {
    /// Display name of the repository (root directory name).
    pub repo: String,
    pub status: RepoStatus,
    /// A stash was created by this run.
    pub stashed: bool,
    /// The owed stash was popped successfully.
    pub stash_popped: bool,
    /// This repository caused the batch to abort.
    pub aborted: bool,
    /// The merge ref that was used (`feature` or `origin/feature`).
    pub merge_ref: Option<String>,
    /// Files the AI pass wrote (and staged, when configured).
    pub ai_resolved: Vec<String>,
    /// Files still conflicted when processing ended.
    pub remaining_conflicts: Vec<String>,
    pub pushed: bool,
    pub errors: Vec<MergeError>,
}

impl RepoOutcome {
    pub fn new(repo: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            ..Default::default()
        }
    }

    /// A stash was created but is still on the stash stack.
    pub fn stash_left_in_place(&self) -> bool {
        self.stashed && !self.stash_popped
    }
}

/// Result of one batch run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// One entry per repository handed to the run, in order.
    pub outcomes: Vec<RepoOutcome>,
    /// The batch stopped early because of the stop policy or a pre-flight
    /// failure.
    pub aborted: bool,
    /// The batch stopped early because the cancel flag was raised.
    pub cancelled: bool,
    /// Terminal summary line.
    pub summary: String,
}

impl RunReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at: Utc::now(),
            completed_at: None,
            outcomes: Vec::new(),
            aborted: false,
            cancelled: false,
            summary: String::new(),
        }
    }

    pub fn count(&self, status: RepoStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// True when every repository merged cleanly (with or without AI help).
    pub fn is_success(&self) -> bool {
        !self.aborted
            && !self.cancelled
            && self
                .outcomes
                .iter()
                .all(|o| matches!(o.status, RepoStatus::Merged | RepoStatus::ResolvedByAi))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_options_defaults() {
        let opts: MergeOptions = toml::from_str("source_branch = \"release\"").unwrap();
        assert_eq!(opts.source_branch, "release");
        assert!(opts.fetch_before_merge);
        assert!(opts.stash_if_dirty);
        assert!(!opts.allow_dirty_merge);
        assert!(opts.stop_on_conflict);
        assert!(!opts.include_untracked);
        assert_eq!(opts.language_mode, LanguageMode::Auto);
        assert_eq!(opts, MergeOptions { source_branch: "release".into(), ..Default::default() });
    }

    #[test]
    fn test_language_mode_parse() {
        assert_eq!("Auto".parse::<LanguageMode>().unwrap(), LanguageMode::Auto);
        assert_eq!(
            "C#".parse::<LanguageMode>().unwrap(),
            LanguageMode::Fixed(Language::CSharp)
        );
        assert_eq!(
            "plain text".parse::<LanguageMode>().unwrap(),
            LanguageMode::Fixed(Language::PlainText)
        );
        assert!("cobol".parse::<LanguageMode>().is_err());
    }

    #[test]
    fn test_language_mode_hint() {
        assert_eq!(LanguageMode::Auto.hint_for("src/App.cs"), Language::CSharp);
        assert_eq!(
            LanguageMode::Fixed(Language::Xml).hint_for("src/App.cs"),
            Language::Xml
        );
    }

    #[test]
    fn test_prefs_with_language_keeps_other_fields() {
        let prefs = AiMergePrefs {
            max_tokens: 1234,
            stage_on_success: false,
            ..Default::default()
        };
        let per_file = prefs.with_language(Language::Json);
        assert_eq!(per_file.language_hint, Some(Language::Json));
        assert_eq!(per_file.max_tokens, 1234);
        assert!(!per_file.stage_on_success);
    }

    #[test]
    fn test_report_success() {
        let mut report = RunReport::new("run");
        report.outcomes.push(RepoOutcome {
            status: RepoStatus::Merged,
            ..RepoOutcome::new("a")
        });
        assert!(report.is_success());
        report.outcomes.push(RepoOutcome {
            status: RepoStatus::Skipped,
            ..RepoOutcome::new("b")
        });
        assert!(!report.is_success());
        assert_eq!(report.count(RepoStatus::Skipped), 1);
    }
}
