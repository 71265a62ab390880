//! # bulwark-git
//!
//! git integration for Bulwark.
//!
//! This crate provides:
//! - git command execution abstraction (real and mock)
//! - the pull request operations the fallback path needs
//! - [`GitFallbackCoordinator`], which lands a commit and falls back to a
//!   branch plus pull request when the target is protected

mod command;
mod fallback;
mod pulls;

pub use command::{
    raw_outcome, GitCommand, GitExecutor, GitOutput, MockGitExecutor, SPAWN_FAILURE_EXIT,
};
pub use fallback::{FallbackResult, GitFallbackCoordinator, LandError, LandRequest};
pub use pulls::{
    MockPullRequests, NewPullRequest, PullRequestApi, PullRequestHead, PullRequestSummary,
};
