//! Landing a commit on a target branch
//!
//! A direct push is tried first. When it fails:
//!
//! - merge conflicts are reported back with the conflicting files and
//!   nothing else happens (no branch, no pull request)
//! - a branch protection rejection becomes a fallback branch
//!   `<prefix>-<short-sha>-<unix-ts>` plus a pull request into the target
//! - anything else propagates after the invoker's own retries
//!
//! An open pull request whose head starts with `<prefix>-<short-sha>-` is
//! reused, so landing the same commit twice opens one pull request.

use bulwark_core::config::GitConfig;
use bulwark_core::{Dependency, FailureClass, OperationKind};
use bulwark_resilience::{
    InvokeError, Operation, ResilienceContext, ResilientInvoker, Success,
    GIT_TRANSIENT_MARKERS,
};
use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::command::{raw_outcome, GitExecutor};
use crate::pulls::{NewPullRequest, PullRequestApi, PullRequestSummary};

/// What to land and how to describe the fallback pull request
#[derive(Debug, Clone)]
pub struct LandRequest {
    /// Branch the commit at `HEAD` should end up on
    pub target: String,
    pub title: String,
    pub body: String,
}

impl LandRequest {
    pub fn new(target: impl Into<String>) -> Self {
        let target = target.into();
        Self {
            title: format!("Automated fix for {}", target),
            body: String::new(),
            target,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Outcome of one landing attempt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FallbackResult {
    pub pushed_directly: bool,
    pub fallback_branch: Option<String>,
    pub created_pr_number: Option<u64>,
    /// The pull request already existed and was reused
    pub pr_reused: bool,
    /// The push hit merge conflicts; nothing was pushed or opened
    pub conflicted: bool,
    /// Files git named as conflicting; may be empty even when `conflicted`
    pub conflicting_files: Vec<String>,
}

impl FallbackResult {
    fn direct() -> Self {
        Self {
            pushed_directly: true,
            ..Default::default()
        }
    }

    pub fn has_conflicts(&self) -> bool {
        self.conflicted
    }
}

#[derive(Debug, Error)]
pub enum LandError {
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },
}

/// Pushes with conflict detection and branch-protection fallback
pub struct GitFallbackCoordinator<G: GitExecutor, P: PullRequestApi> {
    git: G,
    pulls: P,
    invoker: ResilientInvoker,
    remote: String,
    prefix: String,
}

impl<G: GitExecutor, P: PullRequestApi> GitFallbackCoordinator<G, P> {
    pub fn new(git: G, pulls: P, invoker: ResilientInvoker) -> Self {
        Self::from_config(git, pulls, invoker, &GitConfig::default())
    }

    pub fn from_config(git: G, pulls: P, invoker: ResilientInvoker, config: &GitConfig) -> Self {
        Self {
            git,
            pulls,
            invoker,
            remote: config.remote.clone(),
            prefix: config.fallback_prefix.clone(),
        }
    }

    pub fn git(&self) -> &G {
        &self.git
    }

    pub fn pulls(&self) -> &P {
        &self.pulls
    }

    /// Land `HEAD` on `request.target`
    #[instrument(skip(self, ctx, request), fields(target = %request.target))]
    pub async fn land(
        &self,
        ctx: &mut ResilienceContext,
        request: &LandRequest,
    ) -> Result<FallbackResult, LandError> {
        let failure = match self.push(ctx, &request.target).await {
            Ok(_) => {
                info!("Pushed directly to {}", request.target);
                return Ok(FallbackResult::direct());
            }
            Err(InvokeError::Failed(failure)) => failure,
            Err(other) => return Err(other.into()),
        };

        if let FailureClass::GitConflict { files } = &failure.class {
            let mut files = files.clone();
            if files.is_empty() {
                files = self.unmerged_files(ctx).await;
            }
            warn!(
                "Push to {} hit merge conflicts in {} file(s); leaving it to a human",
                request.target,
                files.len()
            );
            return Ok(FallbackResult {
                pushed_directly: false,
                conflicted: true,
                conflicting_files: files,
                ..Default::default()
            });
        }

        if failure.class != FailureClass::BranchProtected {
            return Err(InvokeError::Failed(failure).into());
        }

        info!(
            "{} is protected; falling back to a pull request",
            request.target
        );
        self.open_fallback(ctx, request).await
    }

    async fn open_fallback(
        &self,
        ctx: &mut ResilienceContext,
        request: &LandRequest,
    ) -> Result<FallbackResult, LandError> {
        let sha = self.short_sha(ctx).await?;
        let branch_prefix = format!("{}-{}-", self.prefix, sha);

        if let Some(existing) = self
            .find_open_pr(ctx, &request.target, &branch_prefix)
            .await?
        {
            info!(
                "Reusing pull request #{} from {}",
                existing.number, existing.head.branch
            );
            self.push(ctx, &existing.head.branch).await?;
            return Ok(FallbackResult {
                pushed_directly: false,
                fallback_branch: Some(existing.head.branch),
                created_pr_number: Some(existing.number),
                pr_reused: true,
                conflicted: false,
                conflicting_files: Vec::new(),
            });
        }

        let branch = format!("{}{}", branch_prefix, Utc::now().timestamp());
        self.push(ctx, &branch).await?;

        let sanitizer = self.invoker.sanitizer();
        let new_pr = NewPullRequest {
            title: sanitizer.scrub(&request.title),
            head: branch.clone(),
            base: request.target.clone(),
            body: sanitizer.scrub(&fallback_body(&request.target, &request.body)),
        };

        let pulls = &self.pulls;
        let pr_request = &new_pr;
        let op = Operation::new(Dependency::GithubApi, OperationKind::Write, move || {
            pulls.create(pr_request)
        });
        let created = self.invoker.call(ctx, op).await?;
        let pr: PullRequestSummary = parse(&created, "pull request")?;

        info!("Opened pull request #{} from {}", pr.number, branch);
        Ok(FallbackResult {
            pushed_directly: false,
            fallback_branch: Some(branch),
            created_pr_number: Some(pr.number),
            pr_reused: false,
            conflicted: false,
            conflicting_files: Vec::new(),
        })
    }

    /// Push `HEAD` to `branch` on the configured remote
    async fn push(&self, ctx: &mut ResilienceContext, branch: &str) -> Result<Success, InvokeError> {
        let refspec = format!("HEAD:refs/heads/{}", branch);
        self.run_git(
            ctx,
            OperationKind::Write,
            vec!["push".to_string(), self.remote.clone(), refspec],
        )
        .await
    }

    async fn short_sha(&self, ctx: &mut ResilienceContext) -> Result<String, LandError> {
        let success = self
            .run_git(
                ctx,
                OperationKind::Read,
                vec!["rev-parse".into(), "--short".into(), "HEAD".into()],
            )
            .await?;

        let sha = success.result.body_text().trim().to_string();
        if sha.is_empty() || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(LandError::Malformed {
                what: "short sha",
                detail: format!("{:?}", sha),
            });
        }
        Ok(sha)
    }

    /// Paths git reports as unmerged; empty when git cannot tell
    async fn unmerged_files(&self, ctx: &mut ResilienceContext) -> Vec<String> {
        let args = vec![
            "diff".to_string(),
            "--name-only".to_string(),
            "--diff-filter=U".to_string(),
        ];
        match self.run_git(ctx, OperationKind::Read, args).await {
            Ok(success) => success
                .result
                .body_text()
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect(),
            Err(e) => {
                warn!("Could not list unmerged files: {}", e);
                Vec::new()
            }
        }
    }

    async fn find_open_pr(
        &self,
        ctx: &mut ResilienceContext,
        base: &str,
        head_prefix: &str,
    ) -> Result<Option<PullRequestSummary>, LandError> {
        let pulls = &self.pulls;
        let op = Operation::new(Dependency::GithubApi, OperationKind::Read, move || {
            pulls.list_open(base)
        });
        let listed = self.invoker.call(ctx, op).await?;
        let open: Vec<PullRequestSummary> = parse(&listed, "pull request list")?;

        Ok(open
            .into_iter()
            .find(|pr| pr.head.branch.starts_with(head_prefix)))
    }

    async fn run_git(
        &self,
        ctx: &mut ResilienceContext,
        kind: OperationKind,
        args: Vec<String>,
    ) -> Result<Success, InvokeError> {
        let git = &self.git;
        let op = Operation::new(Dependency::Git, kind, move || {
            let args = args.clone();
            async move {
                let argv: Vec<&str> = args.iter().map(String::as_str).collect();
                raw_outcome(git.exec(&argv).await)
            }
        })
        .transient_on(GIT_TRANSIENT_MARKERS);

        self.invoker.call(ctx, op).await
    }
}

fn fallback_body(target: &str, body: &str) -> String {
    let mut text = format!(
        "A direct push to `{}` was rejected by branch protection, so this change is proposed here instead.",
        target
    );
    if !body.trim().is_empty() {
        text.push_str("\n\n");
        text.push_str(body.trim());
    }
    text
}

fn parse<T: serde::de::DeserializeOwned>(
    success: &Success,
    what: &'static str,
) -> Result<T, LandError> {
    serde_json::from_str(success.result.body_text()).map_err(|e| LandError::Malformed {
        what,
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_body_keeps_caller_text() {
        let body = fallback_body("main", "Fixes the flaky test.\n");
        assert!(body.contains("`main`"));
        assert!(body.ends_with("Fixes the flaky test."));
        assert!(!fallback_body("main", "  ").contains("\n\n"));
    }

    #[test]
    fn test_land_request_defaults() {
        let request = LandRequest::new("release");
        assert_eq!(request.title, "Automated fix for release");
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_fallback_result_conflicts() {
        assert!(!FallbackResult::direct().has_conflicts());
        let unnamed = FallbackResult {
            conflicted: true,
            ..Default::default()
        };
        assert!(unnamed.has_conflicts());
        assert!(unnamed.conflicting_files.is_empty());
    }
}
