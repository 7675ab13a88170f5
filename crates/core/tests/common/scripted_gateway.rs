//! Scripted command gateway.
//!
//! Responses are keyed by working-tree root and the printable command line
//! (`git merge --no-ff feature`). Each key holds a queue; the last response
//! repeats once the queue is down to one. Anything unscripted succeeds with
//! empty output, which reads as a clean tree and a successful step.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use multimerge_core::errors::GatewayError;
use multimerge_core::git::gateway::printable_command_line;
use multimerge_core::git::{CommandGateway, CommandResult, GitCommand};

#[derive(Debug, Clone)]
struct Scripted {
    success: bool,
    stdout: Vec<u8>,
    stderr: String,
}

#[derive(Default)]
pub struct ScriptedGateway {
    responses: Mutex<HashMap<(PathBuf, String), VecDeque<Scripted>>>,
    calls: Mutex<Vec<(PathBuf, String)>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for `line` in `root`.
    pub fn on(&self, root: &Path, line: &str, success: bool, stdout: &str, stderr: &str) -> &Self {
        self.on_bytes(root, line, success, stdout.as_bytes(), stderr)
    }

    /// Like [`on`](Self::on) with stdout that need not be UTF-8.
    pub fn on_bytes(
        &self,
        root: &Path,
        line: &str,
        success: bool,
        stdout: &[u8],
        stderr: &str,
    ) -> &Self {
        self.responses
            .lock()
            .unwrap()
            .entry((root.to_path_buf(), line.to_string()))
            .or_default()
            .push_back(Scripted {
                success,
                stdout: stdout.to_vec(),
                stderr: stderr.to_string(),
            });
        self
    }

    pub fn ok(&self, root: &Path, line: &str, stdout: &str) -> &Self {
        self.on(root, line, true, stdout, "")
    }

    pub fn fail(&self, root: &Path, line: &str, stderr: &str) -> &Self {
        self.on(root, line, false, "", stderr)
    }

    /// Report `root` as dirty (tracked changes).
    pub fn dirty(&self, root: &Path) -> &Self {
        self.ok(root, "git status --porcelain --untracked-files=no", " M src/lib.cs\n")
    }

    /// `rev-parse --verify --quiet <name>` fails in `root`.
    pub fn missing_ref(&self, root: &Path, name: &str) -> &Self {
        self.fail(root, &format!("git rev-parse --verify --quiet {}", name), "")
    }

    /// Every call, in order.
    pub fn calls(&self) -> Vec<(PathBuf, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines run in `root`, in order.
    pub fn calls_for(&self, root: &Path) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(r, _)| r == root)
            .map(|(_, line)| line)
            .collect()
    }

    pub fn count(&self, root: &Path, line: &str) -> usize {
        self.calls_for(root).iter().filter(|l| *l == line).count()
    }
}

#[async_trait]
impl CommandGateway for ScriptedGateway {
    async fn run(
        &self,
        root: &Path,
        command: GitCommand,
        args: &[&str],
    ) -> Result<CommandResult, GatewayError> {
        let line = printable_command_line(command, args);
        self.calls
            .lock()
            .unwrap()
            .push((root.to_path_buf(), line.clone()));

        let scripted = {
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(&(root.to_path_buf(), line.clone())) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        let result = match scripted {
            Some(s) => CommandResult::new(command, args, s.success, "", s.stderr)
                .with_stdout_bytes(s.stdout),
            None => CommandResult::new(command, args, true, "", ""),
        };
        Ok(result)
    }
}
