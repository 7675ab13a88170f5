//! Interactive fallback for conflicts the AI pass left behind.

use std::path::Path;
use std::process::{Command, Stdio};

use tracing::{debug, info};

use crate::config::HandoffConfig;
use crate::errors::HandoffError;

/// Receives the still-conflicted paths of a repository.
///
/// Fire-and-forget: the controller does not wait for the user and re-reads
/// nothing afterwards. An `Err` means the request could not be delivered.
pub trait ConflictHandoff: Send + Sync {
    fn request_resolution(&self, root: &Path, paths: &[String]) -> Result<(), HandoffError>;
}

/// Hand-off that does nothing beyond what the controller already logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHandoff;

impl ConflictHandoff for NoHandoff {
    fn request_resolution(&self, _root: &Path, _paths: &[String]) -> Result<(), HandoffError> {
        Ok(())
    }
}

/// Launches an external tool (e.g. an editor or merge tool) in the
/// repository root with the conflicted paths appended to its arguments.
#[derive(Debug, Clone)]
pub struct CommandHandoff {
    program: String,
    args: Vec<String>,
}

impl CommandHandoff {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `None` when no command is configured.
    pub fn from_config(config: &HandoffConfig) -> Option<Self> {
        config
            .command
            .as_ref()
            .filter(|c| !c.trim().is_empty())
            .map(|c| Self::new(c.trim(), config.args.clone()))
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl ConflictHandoff for CommandHandoff {
    fn request_resolution(&self, root: &Path, paths: &[String]) -> Result<(), HandoffError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut child = Command::new(&self.program)
            .current_dir(root)
            .args(&self.args)
            .args(paths)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| HandoffError::Launch {
                program: self.program.clone(),
                source,
            })?;
        info!(
            program = %self.program,
            pid = child.id(),
            files = paths.len(),
            "launched conflict hand-off"
        );

        // Reap the tool when it exits; the run never waits on it.
        let program = self.program.clone();
        let reaper = std::thread::Builder::new()
            .name("handoff-wait".into())
            .spawn(move || match child.wait() {
                Ok(status) => debug!(%program, %status, "conflict hand-off exited"),
                Err(e) => debug!(%program, error = %e, "could not wait for conflict hand-off"),
            });
        if let Err(e) = reaper {
            debug!(error = %e, "no reaper thread for conflict hand-off");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config() {
        assert!(CommandHandoff::from_config(&HandoffConfig::default()).is_none());
        assert!(CommandHandoff::from_config(&HandoffConfig {
            command: Some("  ".into()),
            args: Vec::new(),
        })
        .is_none());

        let handoff = CommandHandoff::from_config(&HandoffConfig {
            command: Some("code".into()),
            args: vec!["--wait".into()],
        })
        .unwrap();
        assert_eq!(handoff.program(), "code");
    }

    #[test]
    fn test_missing_program_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = CommandHandoff::new("definitely-not-a-merge-tool", Vec::new())
            .request_resolution(dir.path(), &["a.cs".to_string()])
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("could not launch 'definitely-not-a-merge-tool'"));
    }

    #[test]
    fn test_no_paths_launches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        CommandHandoff::new("definitely-not-a-merge-tool", Vec::new())
            .request_resolution(dir.path(), &[])
            .unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_launch_returns_without_waiting() {
        let dir = tempfile::tempdir().unwrap();
        CommandHandoff::new("true", Vec::new())
            .request_resolution(dir.path(), &["a.cs".to_string()])
            .unwrap();
    }
}
