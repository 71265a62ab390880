//! Shared outcome and dependency types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// External dependency class an operation talks to
///
/// Circuit and rate-limit state is keyed by this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Dependency {
    GithubApi,
    AiApi,
    Git,
}

impl Dependency {
    pub const ALL: [Dependency; 3] = [Dependency::GithubApi, Dependency::AiApi, Dependency::Git];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dependency::GithubApi => "github-api",
            Dependency::AiApi => "ai-api",
            Dependency::Git => "git",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Dependency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "github-api" | "github" => Ok(Dependency::GithubApi),
            "ai-api" | "ai" => Ok(Dependency::AiApi),
            "git" => Ok(Dependency::Git),
            _ => Err(format!(
                "Invalid dependency: {}. Use github-api, ai-api, or git.",
                s
            )),
        }
    }
}

/// Whether an operation reads or mutates remote state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Read => write!(f, "read"),
            OperationKind::Write => write!(f, "write"),
        }
    }
}

/// Quota snapshot for one dependency, taken from response headers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitWindow {
    pub dependency: Dependency,
    /// Calls left in the current window
    pub remaining: u64,
    /// Window size, 0 when the provider did not say
    pub limit: u64,
    /// When the window resets
    pub reset_at: DateTime<Utc>,
}

/// Unclassified outcome of a single execution attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawResult {
    pub ok: bool,
    pub http_status: Option<u16>,
    pub transport_error: Option<String>,
    pub exit_code: Option<i32>,
    pub stderr: Option<String>,
    /// Response body (HTTP) or stdout (process)
    pub body: Option<String>,
    /// `retry-after` hint in seconds
    pub retry_after_secs: Option<u64>,
    pub rate_limit: Option<RateLimitWindow>,
}

impl RawResult {
    /// Outcome of an HTTP exchange; `ok` follows the 2xx range
    pub fn http(status: u16, body: impl Into<String>) -> Self {
        Self {
            ok: (200..300).contains(&status),
            http_status: Some(status),
            body: Some(body.into()),
            ..Self::default()
        }
    }

    /// A request that never produced a status (DNS, connect, reset, timeout)
    pub fn transport(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            transport_error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Outcome of a child process
    pub fn process(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            ok: exit_code == 0,
            exit_code: Some(exit_code),
            body: Some(stdout.into()),
            stderr: Some(stderr.into()),
            ..Self::default()
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    pub fn with_rate_limit(mut self, window: RateLimitWindow) -> Self {
        self.rate_limit = Some(window);
        self
    }

    /// Body text, empty when absent
    pub fn body_text(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }

    /// Best raw diagnostic for operators (stderr, transport error or body)
    pub fn diagnostic(&self) -> String {
        if let Some(err) = &self.transport_error {
            return err.clone();
        }
        if let Some(stderr) = self.stderr.as_deref().filter(|s| !s.trim().is_empty()) {
            return stderr.trim().to_string();
        }
        match (self.http_status, self.body.as_deref()) {
            (Some(status), Some(body)) => format!("HTTP {}: {}", status, body.trim()),
            (Some(status), None) => format!("HTTP {}", status),
            (None, Some(body)) => body.trim().to_string(),
            (None, None) => match self.exit_code {
                Some(code) => format!("exit status {}", code),
                None => "no diagnostic available".to_string(),
            },
        }
    }
}

/// Classified failure of one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum FailureClass {
    /// 5xx, 408, transient transport or whitelisted process failure
    Retryable { reason: String },
    /// 429; wait until `reset_at` before the next attempt
    RateLimited { reset_at: DateTime<Utc> },
    /// Terminal 4xx (other than 401/403/429) or non-zero exit
    ClientError {
        status: Option<u16>,
        exit_code: Option<i32>,
    },
    /// 401/403; never retried, needs new credentials
    AuthError { status: u16 },
    /// Merge conflicts that cannot be resolved automatically
    GitConflict { files: Vec<String> },
    /// Push rejected by branch protection rules
    BranchProtected,
    /// Missing configuration or credentials, detected pre-flight
    Fatal { message: String },
}

impl FailureClass {
    /// Only transient classes may ever be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FailureClass::Retryable { .. } | FailureClass::RateLimited { .. }
        )
    }

    /// Short machine-friendly label, used in logs
    pub fn label(&self) -> &'static str {
        match self {
            FailureClass::Retryable { .. } => "retryable",
            FailureClass::RateLimited { .. } => "rate_limited",
            FailureClass::ClientError { .. } => "client_error",
            FailureClass::AuthError { .. } => "auth_error",
            FailureClass::GitConflict { .. } => "git_conflict",
            FailureClass::BranchProtected => "branch_protected",
            FailureClass::Fatal { .. } => "fatal",
        }
    }

    /// Concrete next action for a human reading the failure
    pub fn remediation(&self) -> String {
        match self {
            FailureClass::Retryable { .. } => {
                "the dependency kept failing transiently; re-run the job later".to_string()
            }
            FailureClass::RateLimited { reset_at } => format!(
                "quota exhausted; re-run after {}",
                reset_at.format("%Y-%m-%d %H:%M:%S UTC")
            ),
            FailureClass::ClientError { .. } => {
                "the request was rejected; check the target (repository, branch, number) and inputs"
                    .to_string()
            }
            FailureClass::AuthError { .. } => {
                "credentials rejected; rotate the token and check its scopes".to_string()
            }
            FailureClass::GitConflict { files } => format!(
                "merge conflicts in: {}; resolve manually and re-run",
                if files.is_empty() {
                    "<unknown files>".to_string()
                } else {
                    files.join(", ")
                }
            ),
            FailureClass::BranchProtected => {
                "the branch is protected; open a pull request instead of pushing directly"
                    .to_string()
            }
            FailureClass::Fatal { message } => {
                format!("{}; fix the job configuration and re-run", message)
            }
        }
    }
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureClass::Retryable { reason } => write!(f, "retryable ({})", reason),
            FailureClass::RateLimited { reset_at } => {
                write!(f, "rate limited until {}", reset_at.to_rfc3339())
            }
            FailureClass::ClientError {
                status: Some(status),
                ..
            } => write!(f, "client error (HTTP {})", status),
            FailureClass::ClientError {
                exit_code: Some(code),
                ..
            } => write!(f, "client error (exit {})", code),
            FailureClass::ClientError { .. } => write!(f, "client error"),
            FailureClass::AuthError { status } => write!(f, "authentication error (HTTP {})", status),
            FailureClass::GitConflict { files } => {
                write!(f, "merge conflict in {} file(s)", files.len())
            }
            FailureClass::BranchProtected => write!(f, "branch protected"),
            FailureClass::Fatal { message } => write!(f, "fatal: {}", message),
        }
    }
}
