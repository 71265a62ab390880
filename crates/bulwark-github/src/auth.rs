//! Credential pre-flight
//!
//! Credentials are read once at startup. A command declares the
//! dependencies it will call; anything missing aborts the run before the
//! first outbound call.
//!
//! - github-api: `GITHUB_TOKEN`, falling back to `GH_TOKEN`
//! - ai-api: `ANTHROPIC_API_KEY`
//! - git: relies on the checkout's own credential setup

use bulwark_core::{BulwarkError, Dependency, Result, SecretSanitizer};
use std::env;
use std::fmt;

/// Token variables for the GitHub API, in priority order
pub const GITHUB_TOKEN_VARS: [&str; 2] = ["GITHUB_TOKEN", "GH_TOKEN"];

/// Key variable for the AI provider
pub const AI_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Credentials found in the environment
#[derive(Clone, Default)]
pub struct Credentials {
    github_token: Option<String>,
    ai_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("github_token", &self.github_token.as_ref().map(|_| "***"))
            .field("ai_key", &self.ai_key.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Credentials {
    /// Read credentials from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read credentials through `lookup`; blank values count as missing
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let github_token = GITHUB_TOKEN_VARS.iter().find_map(|key| {
            present(key).inspect(|_| tracing::debug!("Using {} for the GitHub API", key))
        });

        Self {
            github_token,
            ai_key: present(AI_KEY_VAR),
        }
    }

    /// Load from the environment and fail unless `required` are covered
    pub fn preflight(required: &[Dependency]) -> Result<Self> {
        Self::from_env().require(required)
    }

    /// Fail with [`BulwarkError::Fatal`] naming every missing variable
    pub fn require(self, required: &[Dependency]) -> Result<Self> {
        let mut missing = Vec::new();

        for dependency in required {
            match dependency {
                Dependency::GithubApi if self.github_token.is_none() => missing.push(format!(
                    "{} (or {}) for {}",
                    GITHUB_TOKEN_VARS[0], GITHUB_TOKEN_VARS[1], dependency
                )),
                Dependency::AiApi if self.ai_key.is_none() => {
                    missing.push(format!("{} for {}", AI_KEY_VAR, dependency))
                }
                _ => {}
            }
        }

        if missing.is_empty() {
            Ok(self)
        } else {
            missing.dedup();
            Err(BulwarkError::Fatal(format!(
                "credentials missing, set {}",
                missing.join("; ")
            )))
        }
    }

    pub fn github_token(&self) -> Option<&str> {
        self.github_token.as_deref()
    }

    pub fn ai_key(&self) -> Option<&str> {
        self.ai_key.as_deref()
    }

    /// Mask every loaded credential in `sanitizer` output
    pub fn register_with(&self, sanitizer: &mut SecretSanitizer) {
        for secret in [&self.github_token, &self.ai_key].into_iter().flatten() {
            sanitizer.add_literal(secret.clone());
        }
    }
}
