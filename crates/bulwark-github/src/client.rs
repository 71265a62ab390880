//! GitHub REST client
//!
//! Every request returns an unclassified [`RawResult`]; retry decisions
//! belong to the invoker.

use async_trait::async_trait;
use bulwark_core::config::GithubConfig;
use bulwark_core::{BulwarkError, Dependency, RawResult, Result, SecretSanitizer};
use bulwark_git::{NewPullRequest, PullRequestApi};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use tracing::debug;

use crate::headers::into_raw;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("bulwark/", env!("CARGO_PKG_VERSION"));

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

/// Client for one repository
#[derive(Clone)]
pub struct GitHubClient {
    http: Client,
    api_url: String,
    repository: String,
    token: String,
    sanitizer: SecretSanitizer,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    /// Create a client; the repository (`owner/name`) must be configured
    pub fn new(config: &GithubConfig, token: impl Into<String>) -> Result<Self> {
        let repository = config
            .repository
            .clone()
            .filter(|r| r.split_once('/').is_some_and(|(o, n)| !o.is_empty() && !n.is_empty()))
            .ok_or_else(|| {
                BulwarkError::Config(
                    "github.repository must be set as owner/name (or GITHUB_REPOSITORY)"
                        .to_string(),
                )
            })?;

        let http = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BulwarkError::GitHub(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            repository,
            token: token.into(),
            sanitizer: SecretSanitizer::new(),
        })
    }

    /// Scrub outgoing comment bodies with `sanitizer`
    pub fn with_sanitizer(mut self, sanitizer: SecretSanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/repos/{}/{}", self.api_url, self.repository, path);
        self.http
            .request(method, url)
            .bearer_auth(&self.token)
            .header("accept", "application/vnd.github+json")
            .header("x-github-api-version", API_VERSION)
    }

    fn list_open_request(&self, base: &str) -> RequestBuilder {
        self.request(Method::GET, "pulls").query(&[
            ("state", "open"),
            ("base", base),
            ("per_page", "100"),
        ])
    }

    fn comment_request(&self, issue: u64, body: &str) -> RequestBuilder {
        let scrubbed = self.sanitizer.scrub(body);
        self.request(Method::POST, &format!("issues/{}/comments", issue))
            .json(&CommentBody { body: &scrubbed })
    }

    async fn send(&self, request: RequestBuilder) -> RawResult {
        let raw = into_raw(request.send().await, Dependency::GithubApi).await;
        debug!(
            "GitHub responded {:?} (remaining quota: {:?})",
            raw.http_status,
            raw.rate_limit.as_ref().map(|w| w.remaining)
        );
        raw
    }

    /// Comment on an issue or pull request; the body is scrubbed first
    pub async fn post_issue_comment(&self, issue: u64, body: &str) -> RawResult {
        self.send(self.comment_request(issue, body)).await
    }
}

#[async_trait]
impl PullRequestApi for GitHubClient {
    async fn list_open(&self, base: &str) -> RawResult {
        self.send(self.list_open_request(base)).await
    }

    async fn create(&self, request: &NewPullRequest) -> RawResult {
        self.send(self.request(Method::POST, "pulls").json(request))
            .await
    }
}
