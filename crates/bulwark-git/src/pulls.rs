//! Pull request access needed by the fallback path
//!
//! Calls return unclassified [`RawResult`]s so they can run through the
//! resilient invoker. Bodies follow the GitHub REST shapes.

use async_trait::async_trait;
use bulwark_core::RawResult;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Pull request to open
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewPullRequest {
    pub title: String,
    /// Source branch
    pub head: String,
    /// Target branch
    pub base: String,
    pub body: String,
}

/// Head of a listed pull request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestHead {
    #[serde(rename = "ref")]
    pub branch: String,
}

/// Subset of a pull request returned by list/create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestSummary {
    pub number: u64,
    pub head: PullRequestHead,
    #[serde(default)]
    pub html_url: String,
}

/// Pull request operations of a code host
#[async_trait]
pub trait PullRequestApi: Send + Sync {
    /// Open pull requests targeting `base`; body is a JSON array of summaries
    async fn list_open(&self, base: &str) -> RawResult;

    /// Open a pull request; body is the created summary
    async fn create(&self, request: &NewPullRequest) -> RawResult;
}

#[derive(Debug, Default)]
struct MockState {
    open: Vec<(String, PullRequestSummary)>,
    created: Vec<NewPullRequest>,
    next_number: u64,
    list_calls: usize,
}

/// In-memory pull request host for testing
#[derive(Debug, Clone)]
pub struct MockPullRequests {
    state: Arc<Mutex<MockState>>,
}

impl Default for MockPullRequests {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPullRequests {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState {
                next_number: 1,
                ..Default::default()
            })),
        }
    }

    /// Seed an already-open pull request from `head` into `base`
    pub fn with_open(self, base: &str, head: &str) -> Self {
        if let Ok(mut state) = self.state.lock() {
            let number = state.next_number;
            state.next_number += 1;
            state.open.push((base.to_string(), summary(number, head)));
        }
        self
    }

    /// Pull requests created through [`PullRequestApi::create`]
    pub fn created(&self) -> Vec<NewPullRequest> {
        self.state
            .lock()
            .map(|s| s.created.clone())
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().map(|s| s.list_calls).unwrap_or(0)
    }
}

fn summary(number: u64, head: &str) -> PullRequestSummary {
    PullRequestSummary {
        number,
        head: PullRequestHead {
            branch: head.to_string(),
        },
        html_url: format!("https://github.com/mock/repo/pull/{}", number),
    }
}

#[async_trait]
impl PullRequestApi for MockPullRequests {
    async fn list_open(&self, base: &str) -> RawResult {
        let Ok(mut state) = self.state.lock() else {
            return RawResult::transport("mock state poisoned");
        };
        state.list_calls += 1;
        let open: Vec<&PullRequestSummary> = state
            .open
            .iter()
            .filter(|(b, _)| b == base)
            .map(|(_, pr)| pr)
            .collect();
        match serde_json::to_string(&open) {
            Ok(body) => RawResult::http(200, body),
            Err(e) => RawResult::http(500, e.to_string()),
        }
    }

    async fn create(&self, request: &NewPullRequest) -> RawResult {
        let Ok(mut state) = self.state.lock() else {
            return RawResult::transport("mock state poisoned");
        };
        if state.open.iter().any(|(_, pr)| pr.head.branch == request.head) {
            return RawResult::http(
                422,
                r#"{"message":"Validation Failed","errors":[{"message":"A pull request already exists"}]}"#,
            );
        }

        let number = state.next_number;
        state.next_number += 1;
        let pr = summary(number, &request.head);
        state.open.push((request.base.clone(), pr.clone()));
        state.created.push(request.clone());

        match serde_json::to_string(&pr) {
            Ok(body) => RawResult::http(201, body),
            Err(e) => RawResult::http(500, e.to_string()),
        }
    }
}
