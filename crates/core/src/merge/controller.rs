//! Batch merge controller.
//!
//! Merges one source branch into the current branch of each repository, one
//! repository at a time:
//!
//! fetch -> dirty check / stash -> ref resolution -> merge -> AI pass ->
//! unstash -> push
//!
//! A merge the AI pass fully resolved stays staged and uncommitted.
//!
//! A failing step either aborts the batch or skips to the next repository,
//! depending on [`MergeOptions::stop_on_conflict`]. Two cases ignore that
//! flag: a dirty tree that may not be stashed is always skipped, and a failed
//! AI pre-flight always aborts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use super::handoff::{ConflictHandoff, NoHandoff};
use crate::ai::MergeEngine;
use crate::conflict::ConflictPipeline;
use crate::errors::MergeError;
use crate::events::{EventSink, LogLevel, MergeEvent};
use crate::git::{CommandGateway, CommandResult, GitCommand, RepositoryHandle};
use crate::models::{AiMergePrefs, MergeOptions, RepoOutcome, RepoStatus, RunReport};

/// Message attached to the stash created for dirty trees.
pub const STASH_MESSAGE: &str = "multimerge-auto-stash";

/// Whether the batch goes on after a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Abort,
}

/// Result of the conflict step.
enum ConflictFlow {
    Resolved,
    Remaining,
    /// The AI step could not start; the whole run stops.
    PreflightFailed,
}

pub struct MergeController {
    gateway: Arc<dyn CommandGateway>,
    engine: Option<Arc<dyn MergeEngine>>,
    prefs: AiMergePrefs,
    handoff: Arc<dyn ConflictHandoff>,
    events: EventSink,
    cancel: Arc<AtomicBool>,
    pipeline: ConflictPipeline,
}

impl MergeController {
    /// A controller with no engine (conflicts go straight to hand-off) and
    /// a hand-off that only logs.
    pub fn new(gateway: Arc<dyn CommandGateway>, events: EventSink) -> Self {
        let pipeline = ConflictPipeline::new(Arc::clone(&gateway), events.clone());
        Self {
            gateway,
            engine: None,
            prefs: AiMergePrefs::default(),
            handoff: Arc::new(NoHandoff),
            events,
            cancel: Arc::new(AtomicBool::new(false)),
            pipeline,
        }
    }

    pub fn with_engine(mut self, engine: Arc<dyn MergeEngine>, prefs: AiMergePrefs) -> Self {
        self.engine = Some(engine);
        self.prefs = prefs;
        self
    }

    pub fn with_handoff(mut self, handoff: Arc<dyn ConflictHandoff>) -> Self {
        self.handoff = handoff;
        self
    }

    /// Share an externally owned cancel flag (e.g. set from a signal handler).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Raising this flag stops the run before the next repository.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn pipeline(&self) -> &ConflictPipeline {
        &self.pipeline
    }

    /// Process `repos` in order and report one outcome per repository.
    #[instrument(skip_all, fields(repos = repos.len(), branch = %opts.source_branch))]
    pub async fn run(&self, repos: &[RepositoryHandle], opts: &MergeOptions) -> RunReport {
        let mut report = RunReport::new(Uuid::new_v4().to_string());
        let total = repos.len();
        info!(run_id = %report.run_id, total, "starting merge run");

        for (index, repo) in repos.iter().enumerate() {
            if self.cancel.load(Ordering::SeqCst) {
                report.cancelled = true;
                break;
            }

            self.events.emit(MergeEvent::RepoStarted {
                index,
                total,
                name: repo.name().to_string(),
            });
            let (outcome, flow) = self.process_repo(repo, opts).await;
            self.events.emit(MergeEvent::RepoFinished(outcome.clone()));
            report.outcomes.push(outcome);

            if flow == Flow::Abort {
                report.aborted = true;
                break;
            }
        }

        let processed = report.outcomes.len();
        for repo in &repos[processed..] {
            report.outcomes.push(RepoOutcome::new(repo.name()));
        }

        report.summary = if report.aborted {
            let at = report
                .outcomes
                .get(processed.saturating_sub(1))
                .map(|o| o.repo.as_str())
                .unwrap_or("-");
            format!(
                "Aborted at {}; {} repository(ies) not processed.",
                at,
                total - processed
            )
        } else if report.cancelled {
            format!(
                "Cancelled; {} repository(ies) not processed.",
                total - processed
            )
        } else {
            "All done.".to_string()
        };
        report.completed_at = Some(Utc::now());

        let level = if report.aborted || report.cancelled {
            LogLevel::Warn
        } else {
            LogLevel::Info
        };
        self.events.log(level, None, report.summary.clone());
        report
    }

    /// Run the state machine for one repository.
    #[instrument(skip(self, repo, opts), fields(repo = %repo.name()))]
    async fn process_repo(
        &self,
        repo: &RepositoryHandle,
        opts: &MergeOptions,
    ) -> (RepoOutcome, Flow) {
        let name = repo.name();
        let mut outcome = RepoOutcome::new(name);
        let current = repo.current_ref();
        self.events.info(name, format!("current={}", current));

        // 1) Fetch
        if opts.fetch_before_merge {
            self.events.info(name, "fetching");
            if let Err(e) = self.git(repo, GitCommand::Fetch, &["--all", "--prune"]).await {
                self.events.error(name, "fetch failed");
                return self.fail(repo, outcome, opts, e).await;
            }
        }

        // 2) Dirty handling
        if !self.is_clean(repo, opts.include_untracked).await {
            if opts.stash_if_dirty {
                self.events.info(name, "repo dirty, auto-stashing");
                match self
                    .git(repo, GitCommand::Stash, &["push", "-u", "-m", STASH_MESSAGE])
                    .await
                {
                    Ok(_) => outcome.stashed = true,
                    Err(e) => {
                        let err = MergeError::StashFailed(failure_output(&e));
                        if !opts.allow_dirty_merge {
                            self.events.error(name, "stash failed");
                            return self.fail(repo, outcome, opts, err).await;
                        }
                        self.events
                            .warn(name, "stash failed, merging into the dirty tree");
                        outcome.errors.push(err);
                    }
                }
            } else if opts.allow_dirty_merge {
                self.events.info(name, "repo dirty, proceeding without stashing");
            } else {
                self.events.warn(name, "repo has local changes; skipping");
                outcome.status = RepoStatus::Skipped;
                return (outcome, Flow::Continue);
            }
        }

        // 3) Merge ref
        let branch = opts.source_branch.trim();
        let merge_ref = match self.resolve_merge_ref(repo, branch).await {
            Some(r) => r,
            None => {
                self.events.error(
                    name,
                    format!("branch '{}' not found locally or on origin", branch),
                );
                return self
                    .fail(repo, outcome, opts, MergeError::RefNotFound(branch.to_string()))
                    .await;
            }
        };
        outcome.merge_ref = Some(merge_ref.clone());

        // 4) Merge
        self.events
            .info(name, format!("merging '{}' into '{}'", merge_ref, current));
        let mut args: Vec<&str> = Vec::new();
        if opts.no_fast_forward {
            args.push("--no-ff");
        }
        if opts.squash {
            args.push("--squash");
        }
        args.push(&merge_ref);

        outcome.status = RepoStatus::Merged;
        if let Err(merge_err) = self.git(repo, GitCommand::Merge, &args).await {
            let conflicted = self.pipeline.list_conflicted(repo).await;
            if conflicted.is_empty() {
                self.events.error(
                    name,
                    "merge failed without conflicts (bad ref or non-mergeable state)",
                );
                let err = MergeError::MergeFailedNoConflicts(failure_output(&merge_err));
                return self.fail(repo, outcome, opts, err).await;
            }

            match self.resolve_conflicts(repo, opts, &mut outcome, conflicted).await {
                ConflictFlow::Resolved => {
                    outcome.status = RepoStatus::ResolvedByAi;
                    self.events
                        .info(name, "resolved merge left staged for review; commit when ready");
                }
                ConflictFlow::PreflightFailed => {
                    return (self.abort_with_conflicts(repo, outcome), Flow::Abort);
                }
                ConflictFlow::Remaining if opts.stop_on_conflict => {
                    return (self.abort_with_conflicts(repo, outcome), Flow::Abort);
                }
                ConflictFlow::Remaining => {
                    outcome.status = RepoStatus::ConflictsRemaining;
                }
            }
        }

        // 5) Pop stash
        if outcome.stashed {
            self.events.info(name, "restoring stashed changes");
            if !self.pop_stash(repo, &mut outcome).await && opts.stop_on_conflict {
                outcome.status = RepoStatus::Aborted;
                outcome.aborted = true;
                return (outcome, Flow::Abort);
            }
        }

        // 6) Push
        if opts.push_after_merge {
            if outcome.status == RepoStatus::ConflictsRemaining {
                self.events.warn(name, "push skipped: conflicts remain");
            } else {
                self.events.info(name, "pushing");
                match self.git(repo, GitCommand::Push, &[]).await {
                    Ok(_) => {
                        outcome.pushed = true;
                        self.events.success(name, "pushed");
                    }
                    Err(e) => {
                        self.events.error(name, "push failed");
                        outcome.errors.push(MergeError::PushFailed(failure_output(&e)));
                        if opts.stop_on_conflict {
                            outcome.status = RepoStatus::Aborted;
                            outcome.aborted = true;
                            return (outcome, Flow::Abort);
                        }
                    }
                }
            }
        }

        (outcome, Flow::Continue)
    }

    /// AI pass (when an engine is configured), then hand-off of whatever is
    /// left.
    async fn resolve_conflicts(
        &self,
        repo: &RepositoryHandle,
        opts: &MergeOptions,
        outcome: &mut RepoOutcome,
        conflicted: Vec<String>,
    ) -> ConflictFlow {
        let name = repo.name();
        match self.engine {
            Some(ref engine) => {
                self.events
                    .warn(name, "merge has conflicts, trying AI auto-merge");
                if let Err(e) = engine.preflight() {
                    self.events.notify("AI Merge", e.to_string());
                    outcome.errors.push(MergeError::AiPreflight(e.to_string()));
                    outcome.remaining_conflicts = conflicted;
                    return ConflictFlow::PreflightFailed;
                }
                let report = self
                    .pipeline
                    .try_resolve_with_ai(repo, engine.as_ref(), &self.prefs, opts.language_mode)
                    .await;
                outcome.ai_resolved = report.resolved();
            }
            None => {
                self.events.warn(
                    name,
                    format!("merge has {} conflicted file(s)", conflicted.len()),
                );
            }
        }

        let remaining = self.pipeline.list_conflicted(repo).await;
        if remaining.is_empty() {
            self.events.success(name, "all conflicts resolved");
            return ConflictFlow::Resolved;
        }

        self.events.warn(
            name,
            format!(
                "conflicts remain, handing off for manual resolution: {}",
                remaining.join(", ")
            ),
        );
        if let Err(e) = self.handoff.request_resolution(repo.root(), &remaining) {
            self.events.warn(name, format!("manual resolution hand-off failed: {}", e));
        }
        outcome.errors.push(MergeError::ConflictsRemain(remaining.clone()));
        outcome.remaining_conflicts = remaining;
        ConflictFlow::Remaining
    }

    /// Stop the batch on a conflicted tree. The stash stays on the stack.
    fn abort_with_conflicts(
        &self,
        repo: &RepositoryHandle,
        mut outcome: RepoOutcome,
    ) -> RepoOutcome {
        outcome.status = RepoStatus::Aborted;
        outcome.aborted = true;
        if outcome.stash_left_in_place() {
            self.events.warn(
                repo.name(),
                format!(
                    "stashed changes left in place ('{}'); run `git stash pop` after resolving",
                    STASH_MESSAGE
                ),
            );
        }
        outcome
    }

    /// Apply the stop policy to a failed step. An owed stash is popped first;
    /// the tree holds no conflicts on any path that gets here.
    async fn fail(
        &self,
        repo: &RepositoryHandle,
        mut outcome: RepoOutcome,
        opts: &MergeOptions,
        err: MergeError,
    ) -> (RepoOutcome, Flow) {
        outcome.errors.push(err);
        if outcome.stash_left_in_place() {
            self.events.info(repo.name(), "restoring stashed changes");
            self.pop_stash(repo, &mut outcome).await;
        }
        if opts.stop_on_conflict {
            outcome.status = RepoStatus::Aborted;
            outcome.aborted = true;
            (outcome, Flow::Abort)
        } else {
            outcome.status = RepoStatus::Skipped;
            self.events.info(repo.name(), "skipping");
            (outcome, Flow::Continue)
        }
    }

    /// `git stash pop`; true when the stash was restored.
    async fn pop_stash(&self, repo: &RepositoryHandle, outcome: &mut RepoOutcome) -> bool {
        match self.git(repo, GitCommand::Stash, &["pop"]).await {
            Ok(_) => {
                outcome.stash_popped = true;
                self.events.success(repo.name(), "stash restored");
                true
            }
            Err(e) => {
                self.events
                    .error(repo.name(), "stash pop had conflicts or failed; resolve manually");
                outcome
                    .errors
                    .push(MergeError::StashPopFailed(failure_output(&e)));
                false
            }
        }
    }

    /// Clean when `status --porcelain` prints nothing but blank lines, on
    /// either stream. Untracked files count only with `include_untracked`.
    pub async fn is_clean(&self, repo: &RepositoryHandle, include_untracked: bool) -> bool {
        let mut args = vec!["--porcelain"];
        if !include_untracked {
            args.push("--untracked-files=no");
        }
        match self.gateway.run(repo.root(), GitCommand::Status, &args).await {
            Ok(result) => result
                .stdout_lines()
                .chain(result.stderr_lines())
                .all(|l| l.trim().is_empty()),
            Err(e) => {
                self.events
                    .warn(repo.name(), format!("could not read status: {}", e));
                false
            }
        }
    }

    /// `branch` if it exists locally, else `origin/<branch>`, else `None`.
    pub async fn resolve_merge_ref(&self, repo: &RepositoryHandle, branch: &str) -> Option<String> {
        let branch = branch.trim();
        if branch.is_empty() {
            return None;
        }
        let remote = format!("origin/{}", branch);
        for candidate in [branch.to_string(), remote] {
            if self.ref_exists(repo, &candidate).await {
                debug!(%candidate, "resolved merge ref");
                return Some(candidate);
            }
        }
        None
    }

    async fn ref_exists(&self, repo: &RepositoryHandle, name: &str) -> bool {
        matches!(
            self.gateway
                .run(repo.root(), GitCommand::RevParse, &["--verify", "--quiet", name])
                .await,
            Ok(CommandResult { success: true, .. })
        )
    }

    /// Run a step command, logging the command line and its outcome.
    async fn git(
        &self,
        repo: &RepositoryHandle,
        command: GitCommand,
        args: &[&str],
    ) -> Result<CommandResult, MergeError> {
        match self.gateway.run(repo.root(), command, args).await {
            Ok(result) if result.success => {
                self.events.log(
                    LogLevel::Debug,
                    Some(repo.name()),
                    format!("{} ok", result.command_line),
                );
                Ok(result)
            }
            Ok(result) => {
                let output = result.diagnostic_output();
                self.events.error(
                    repo.name(),
                    format!("{} -> {}", result.command_line, output),
                );
                Err(MergeError::CommandFailed {
                    command: result.command_line,
                    output,
                })
            }
            Err(e) => {
                let command_line = crate::git::gateway::printable_command_line(command, args);
                self.events
                    .error(repo.name(), format!("{} -> {}", command_line, e));
                Err(MergeError::CommandFailed {
                    command: command_line,
                    output: e.to_string(),
                })
            }
        }
    }
}

/// The output carried by a failed step, for the step-specific error.
fn failure_output(err: &MergeError) -> String {
    match err {
        MergeError::CommandFailed { output, .. } => output.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_output_prefers_command_output() {
        let err = MergeError::CommandFailed {
            command: "git fetch --all --prune".into(),
            output: "could not resolve host".into(),
        };
        assert_eq!(failure_output(&err), "could not resolve host");
        assert_eq!(
            failure_output(&MergeError::RefNotFound("x".into())),
            "branch 'x' not found locally or on origin"
        );
    }

    #[test]
    fn test_cancel_flag_is_shared() {
        let gateway: Arc<dyn CommandGateway> = Arc::new(crate::git::GitCli::new());
        let flag = Arc::new(AtomicBool::new(false));
        let controller = MergeController::new(gateway, EventSink::disabled())
            .with_cancel_flag(Arc::clone(&flag));
        flag.store(true, Ordering::SeqCst);
        assert!(controller.cancel_flag().load(Ordering::SeqCst));
    }
}
