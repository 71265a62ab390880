//! git command execution abstraction

use async_trait::async_trait;
use bulwark_core::{BulwarkError, RawResult, Result};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::process::Output;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tracing::{debug, instrument};

/// Exit code reported when git could not be started at all
pub const SPAWN_FAILURE_EXIT: i32 = 127;

/// Output from a git command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub success: bool,
}

impl GitOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            success: true,
        }
    }

    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
            success: false,
        }
    }

    /// Unclassified outcome for the invoker
    pub fn into_raw(self) -> RawResult {
        RawResult::process(self.exit_code, self.stdout, self.stderr)
    }
}

impl From<Output> for GitOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            // Killed by a signal: no code
            exit_code: output.status.code().unwrap_or(-1),
            success: output.status.success(),
        }
    }
}

/// Map an executor result to a `RawResult`; a spawn failure is terminal
pub fn raw_outcome(result: Result<GitOutput>) -> RawResult {
    match result {
        Ok(output) => output.into_raw(),
        Err(e) => RawResult::process(SPAWN_FAILURE_EXIT, "", e.to_string()),
    }
}

/// Trait for executing git commands (allows mocking in tests)
#[async_trait]
pub trait GitExecutor: Send + Sync {
    /// Execute a git command with the given arguments
    async fn exec(&self, args: &[&str]) -> Result<GitOutput>;

    /// Get the repository root
    fn repo_root(&self) -> &PathBuf;
}

/// Real git command executor
#[derive(Debug, Clone)]
pub struct GitCommand {
    repo_root: PathBuf,
}

impl GitCommand {
    /// Create a new git command executor for the given repository
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
        }
    }

    /// Detect the work tree containing `path`
    pub async fn detect(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(&path)
            .output()
            .await
            .map_err(|e| BulwarkError::Git(format!("Failed to run git rev-parse: {}", e)))?;

        if !output.status.success() {
            return Err(BulwarkError::Git(format!(
                "Not a git work tree: {}",
                path.display()
            )));
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self::new(root))
    }
}

#[async_trait]
impl GitExecutor for GitCommand {
    #[instrument(skip(self), fields(repo = %self.repo_root.display()))]
    async fn exec(&self, args: &[&str]) -> Result<GitOutput> {
        debug!("Executing git {:?}", args);

        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_root)
            // Never block a CI job on a credential prompt
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .await
            .map_err(|e| BulwarkError::Git(format!("Failed to execute git: {}", e)))?;

        let git_output = GitOutput::from(output);

        if !git_output.success {
            debug!("git exited with {}", git_output.exit_code);
        }

        Ok(git_output)
    }

    fn repo_root(&self) -> &PathBuf {
        &self.repo_root
    }
}

/// Mock git executor for testing
///
/// Responses are keyed by the space-joined arguments. A key also matches any
/// command it is a prefix of (longest key wins). Queued responses are
/// replayed in order; the last one repeats.
#[derive(Debug, Clone, Default)]
pub struct MockGitExecutor {
    repo_root: PathBuf,
    responses: Arc<Mutex<HashMap<String, VecDeque<GitOutput>>>>,
    fallback: Option<GitOutput>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockGitExecutor {
    pub fn new() -> Self {
        Self {
            repo_root: PathBuf::from("/mock/repo"),
            ..Default::default()
        }
    }

    /// Queue a response for `command`
    pub fn with_response(self, command: &str, output: GitOutput) -> Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses
                .entry(command.to_string())
                .or_default()
                .push_back(output);
        }
        self
    }

    /// Response for commands without a matching key
    pub fn with_fallback(mut self, output: GitOutput) -> Self {
        self.fallback = Some(output);
        self
    }

    /// Every command executed so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Executed commands starting with `prefix`
    pub fn calls_starting_with(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl GitExecutor for MockGitExecutor {
    async fn exec(&self, args: &[&str]) -> Result<GitOutput> {
        let key = args.join(" ");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.clone());
        }

        let mut responses = self
            .responses
            .lock()
            .map_err(|_| BulwarkError::Other("mock git responses poisoned".to_string()))?;

        let matched = responses
            .keys()
            .filter(|k| key == **k || key.starts_with(k.as_str()))
            .max_by_key(|k| k.len())
            .cloned();

        match matched.and_then(|k| responses.get_mut(&k)) {
            Some(queue) if queue.len() > 1 => {
                Ok(queue.pop_front().unwrap_or_else(|| GitOutput::ok("")))
            }
            Some(queue) if !queue.is_empty() => Ok(queue[0].clone()),
            _ => self
                .fallback
                .clone()
                .ok_or_else(|| BulwarkError::Git(format!("No mock response for: {}", key))),
        }
    }

    fn repo_root(&self) -> &PathBuf {
        &self.repo_root
    }
}
