//! AI conflict resolution pass over a conflicted working tree.
//!
//! Each conflicted file is handled on its own: read the three index stages,
//! ask the engine for merged content, sanitize it, write it, stage it. A file
//! that fails at any step stays conflicted and the pass moves on.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};

use super::sanitize::sanitize_merged_text;
use crate::ai::MergeEngine;
use crate::errors::{AiError, WriteOrStageError};
use crate::events::EventSink;
use crate::git::{CommandGateway, GitCommand, RepositoryHandle};
use crate::models::{AiMergePrefs, AiMergeResult, ConflictContext, LanguageMode};

/// What happened to one conflicted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileResolution {
    /// Merged content was written (and staged, when configured).
    Resolved,
    /// The engine was not called.
    Skipped(String),
    /// The engine failed, or its content could not be applied.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: String,
    pub resolution: FileResolution,
}

/// Per-file results of one AI pass, in listing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineReport {
    pub files: Vec<FileReport>,
}

impl PipelineReport {
    pub fn resolved(&self) -> Vec<String> {
        self.files
            .iter()
            .filter(|f| f.resolution == FileResolution::Resolved)
            .map(|f| f.path.clone())
            .collect()
    }

    pub fn unresolved_count(&self) -> usize {
        self.files.len() - self.resolved().len()
    }

    fn push(&mut self, path: &str, resolution: FileResolution) {
        self.files.push(FileReport {
            path: path.to_string(),
            resolution,
        });
    }
}

pub struct ConflictPipeline {
    gateway: Arc<dyn CommandGateway>,
    events: EventSink,
}

impl ConflictPipeline {
    pub fn new(gateway: Arc<dyn CommandGateway>, events: EventSink) -> Self {
        Self { gateway, events }
    }

    /// Repo-relative paths of unmerged files.
    ///
    /// A failed listing is logged and reported as no conflicts.
    pub async fn list_conflicted(&self, repo: &RepositoryHandle) -> Vec<String> {
        let args = ["--name-only", "--diff-filter=U"];
        match self.gateway.run(repo.root(), GitCommand::Diff, &args).await {
            Ok(result) if result.success => result.non_blank_lines(),
            Ok(result) => {
                self.events.warn(
                    repo.name(),
                    format!(
                        "failed to list conflicts: {}",
                        result.combined_output()
                    ),
                );
                Vec::new()
            }
            Err(e) => {
                self.events
                    .warn(repo.name(), format!("failed to list conflicts: {}", e));
                Vec::new()
            }
        }
    }

    /// Text of index stage `stage` (1 base, 2 ours, 3 theirs), byte-exact.
    ///
    /// Stages that are not UTF-8, or hold a NUL byte, are refused so the
    /// file is left conflicted instead of being rewritten lossily.
    pub async fn index_blob(
        &self,
        repo: &RepositoryHandle,
        stage: u8,
        rel_path: &str,
    ) -> Result<String, AiError> {
        let revspec = format!(":{}:{}", stage, rel_path);
        let missing = || AiError::MissingBlob {
            stage,
            path: rel_path.to_string(),
        };
        match self.gateway.run(repo.root(), GitCommand::Show, &[&revspec]).await {
            Ok(result) if result.success => {
                blob_text(result.stdout_bytes).ok_or_else(|| AiError::NotText {
                    stage,
                    path: rel_path.to_string(),
                })
            }
            Ok(result) => {
                debug!(%revspec, output = %result.diagnostic_output(), "index stage unavailable");
                Err(missing())
            }
            Err(e) => {
                debug!(%revspec, error = %e, "index stage unavailable");
                Err(missing())
            }
        }
    }

    /// All three stages of `rel_path`.
    pub async fn conflict_context(
        &self,
        repo: &RepositoryHandle,
        rel_path: &str,
    ) -> Result<ConflictContext, AiError> {
        let base = self.index_blob(repo, 1, rel_path).await?;
        let ours = self.index_blob(repo, 2, rel_path).await?;
        let theirs = self.index_blob(repo, 3, rel_path).await?;
        Ok(ConflictContext {
            file_path: rel_path.to_string(),
            base,
            ours,
            theirs,
        })
    }

    /// Run the AI pass over every currently conflicted file.
    #[instrument(
        skip(self, repo, engine, prefs),
        fields(repo = %repo.name(), engine = %engine.name())
    )]
    pub async fn try_resolve_with_ai(
        &self,
        repo: &RepositoryHandle,
        engine: &dyn MergeEngine,
        prefs: &AiMergePrefs,
        language_mode: LanguageMode,
    ) -> PipelineReport {
        let name = repo.name();
        let mut report = PipelineReport::default();

        let conflicted = self.list_conflicted(repo).await;
        if conflicted.is_empty() {
            self.events.info(name, "(AI) no conflicted files detected");
            return report;
        }
        self.events.info(
            name,
            format!(
                "(AI) attempting to resolve {} conflicted file(s)",
                conflicted.len()
            ),
        );

        for rel in &conflicted {
            if !repo.root().join(rel).is_file() {
                self.events
                    .warn(name, format!("skip {} (not in working tree)", rel));
                report.push(rel, FileResolution::Skipped("not in working tree".into()));
                continue;
            }

            let context = match self.conflict_context(repo, rel).await {
                Ok(ctx) => ctx,
                Err(e) => {
                    self.events
                        .warn(name, format!("skip {} ({})", rel, e));
                    report.push(rel, FileResolution::Skipped(e.to_string()));
                    continue;
                }
            };

            let language = language_mode.hint_for(rel);
            let file_prefs = prefs.with_language(language);
            debug!(file = %rel, %language, "calling merge engine");

            match engine.merge(&context, &file_prefs).await {
                AiMergeResult::Success(raw) => {
                    let merged = sanitize_merged_text(&raw, &context.ours);
                    match self
                        .write_and_stage(repo, rel, &merged, prefs.stage_on_success)
                        .await
                    {
                        Ok(()) => {
                            self.events.success(name, format!("{}: auto-merged by AI", rel));
                            report.push(rel, FileResolution::Resolved);
                        }
                        Err(e) => {
                            self.events.error(
                                name,
                                format!("{}: could not write/stage merged content: {}", rel, e),
                            );
                            report.push(rel, FileResolution::Failed(e.to_string()));
                        }
                    }
                }
                AiMergeResult::Failure(reason) => {
                    self.events
                        .error(name, format!("{}: AI failed: {}", rel, reason));
                    report.push(rel, FileResolution::Failed(reason));
                }
            }
        }

        report
    }

    /// Replace the working-tree file with `content`, then `git add` it when
    /// `stage` is set. The write lands before the add.
    pub async fn write_and_stage(
        &self,
        repo: &RepositoryHandle,
        rel_path: &str,
        content: &str,
        stage: bool,
    ) -> Result<(), WriteOrStageError> {
        write_atomically(&repo.root().join(rel_path), content).map_err(|source| {
            WriteOrStageError::Write {
                path: rel_path.to_string(),
                source,
            }
        })?;

        if !stage {
            return Ok(());
        }

        let stage_err = |output: String| WriteOrStageError::Stage {
            path: rel_path.to_string(),
            output,
        };
        match self
            .gateway
            .run(repo.root(), GitCommand::Add, &[rel_path])
            .await
        {
            Ok(result) if result.success => Ok(()),
            Ok(result) => Err(stage_err(result.combined_output())),
            Err(e) => Err(stage_err(e.to_string())),
        }
    }
}

fn blob_text(bytes: Vec<u8>) -> Option<String> {
    if bytes.contains(&0) {
        return None;
    }
    String::from_utf8(bytes).ok()
}

/// Write through a temp file in the target's directory, then rename over it.
/// The existing file's permissions are carried over.
fn write_atomically(path: &Path, content: &str) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.as_file().sync_all()?;
    if let Ok(meta) = std::fs::metadata(path) {
        if let Err(e) = tmp.as_file().set_permissions(meta.permissions()) {
            warn!(path = %path.display(), error = %e, "could not copy file permissions");
        }
    }
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomically_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, "<<<<<<< HEAD\nx\n=======\ny\n>>>>>>> b\n").unwrap();

        write_atomically(&path, "xy\r\n").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"xy\r\n");

        let leftovers: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_write_atomically_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = write_atomically(&dir.path().join("nope/a.txt"), "x");
        assert!(result.is_err());
    }

    #[test]
    fn test_blob_text_refuses_binary_and_latin1() {
        assert_eq!(blob_text(b"caf\xc3\xa9\r\n".to_vec()).as_deref(), Some("caf\u{e9}\r\n"));
        assert_eq!(blob_text(b"caf\xe9\n".to_vec()), None);
        assert_eq!(blob_text(b"PK\x03\x04\x00\x00".to_vec()), None);
        assert_eq!(blob_text(Vec::new()).as_deref(), Some(""));
    }

    #[test]
    fn test_report_counts() {
        let mut report = PipelineReport::default();
        report.push("a.cs", FileResolution::Resolved);
        report.push("b.cs", FileResolution::Skipped("missing".into()));
        report.push("c.cs", FileResolution::Failed("HTTP 500: x".into()));
        assert_eq!(report.resolved(), vec!["a.cs"]);
        assert_eq!(report.unresolved_count(), 2);
    }
}
