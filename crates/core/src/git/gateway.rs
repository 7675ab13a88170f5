//! Command gateway: runs git subcommands against a working-tree root.
//!
//! Every git operation the controller and the conflict pipeline perform goes
//! through [`CommandGateway::run`]. There are no retries; callers decide
//! whether a failed command is fatal.

use std::fmt;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::errors::GatewayError;

/// The git subcommands the core invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitCommand {
    Status,
    Fetch,
    Stash,
    RevParse,
    Merge,
    Diff,
    Show,
    Add,
    Push,
}

impl GitCommand {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Fetch => "fetch",
            Self::Stash => "stash",
            Self::RevParse => "rev-parse",
            Self::Merge => "merge",
            Self::Diff => "diff",
            Self::Show => "show",
            Self::Add => "add",
            Self::Push => "push",
        }
    }
}

impl fmt::Display for GitCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single git invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub success: bool,
    /// Process exit code, `None` when killed by a signal.
    pub exit_code: Option<i32>,
    /// Printable command line, e.g. `git merge --no-ff release`.
    pub command_line: String,
    /// Standard output, lossily decoded. Fine for listings and logs.
    pub stdout: String,
    /// Standard output exactly as git wrote it.
    pub stdout_bytes: Vec<u8>,
    pub stderr: String,
}

impl CommandResult {
    /// Build a result for `git <command> <args>`.
    pub fn new(
        command: GitCommand,
        args: &[&str],
        success: bool,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) -> Self {
        let stdout = stdout.into();
        Self {
            success,
            exit_code: Some(if success { 0 } else { 1 }),
            command_line: printable_command_line(command, args),
            stdout_bytes: stdout.as_bytes().to_vec(),
            stdout,
            stderr: stderr.into(),
        }
    }

    /// Replace stdout with raw bytes, which need not be UTF-8.
    pub fn with_stdout_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.stdout = String::from_utf8_lossy(&bytes).into_owned();
        self.stdout_bytes = bytes;
        self
    }

    /// Ordered stdout lines.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines()
    }

    /// Ordered stderr lines.
    pub fn stderr_lines(&self) -> impl Iterator<Item = &str> {
        self.stderr.lines()
    }

    /// Non-blank, trimmed stdout lines.
    pub fn non_blank_lines(&self) -> Vec<String> {
        self.stdout_lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// stderr if it has anything to say, otherwise stdout, trimmed.
    pub fn diagnostic_output(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }

    /// stdout followed by stderr, for callers that log everything.
    pub fn combined_output(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len() + 1);
        out.push_str(self.stdout.trim_end());
        if !self.stderr.trim().is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(self.stderr.trim_end());
        }
        out
    }
}

/// `git <command> <args...>` as shown in logs.
pub fn printable_command_line(command: GitCommand, args: &[&str]) -> String {
    let mut line = format!("git {}", command);
    for arg in args {
        line.push(' ');
        if arg.is_empty() || arg.contains(char::is_whitespace) {
            line.push('"');
            line.push_str(arg);
            line.push('"');
        } else {
            line.push_str(arg);
        }
    }
    line
}

/// Executes git subcommands for the core.
#[async_trait]
pub trait CommandGateway: Send + Sync {
    /// Run `git <command> <args>` with `root` as the working directory.
    ///
    /// A non-zero exit is reported through [`CommandResult::success`]; an
    /// `Err` means git could not be run at all.
    async fn run(
        &self,
        root: &Path,
        command: GitCommand,
        args: &[&str],
    ) -> Result<CommandResult, GatewayError>;
}

/// Gateway that spawns the `git` binary.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: "git".into(),
        }
    }

    /// Use a different git executable (e.g. an absolute path).
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl CommandGateway for GitCli {
    #[instrument(skip(self, args), fields(root = %root.display(), command = %command))]
    async fn run(
        &self,
        root: &Path,
        command: GitCommand,
        args: &[&str],
    ) -> Result<CommandResult, GatewayError> {
        if !root.is_dir() {
            return Err(GatewayError::RootNotFound(root.display().to_string()));
        }

        let command_line = printable_command_line(command, args);
        debug!(cmd = %command_line, "running git command");

        let output = Command::new(&self.program)
            .current_dir(root)
            .arg(command.as_str())
            .args(args)
            // Never block on credential or editor prompts.
            .env("GIT_TERMINAL_PROMPT", "0")
            .env("GIT_EDITOR", "true")
            .env("GIT_MERGE_AUTOEDIT", "no")
            // Unquoted non-ASCII paths in `diff --name-only`.
            .env("GIT_CONFIG_COUNT", "1")
            .env("GIT_CONFIG_KEY_0", "core.quotePath")
            .env("GIT_CONFIG_VALUE_0", "false")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    GatewayError::BinaryNotFound(self.program.clone())
                } else {
                    GatewayError::IoError(e)
                }
            })?;

        let result = CommandResult {
            success: output.status.success(),
            exit_code: output.status.code(),
            command_line,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stdout_bytes: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success {
            debug!(
                exit_code = ?result.exit_code,
                stderr = %result.stderr.trim(),
                "git command exited non-zero"
            );
        }
        Ok(result)
    }
}

/// Returns true if a usable `git` binary is on `$PATH`.
pub fn git_available() -> bool {
    match std::process::Command::new("git")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
    {
        Ok(status) => status.success(),
        Err(e) => {
            warn!(error = %e, "git not available");
            false
        }
    }
}
