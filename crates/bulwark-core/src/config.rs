//! Configuration management for Bulwark
//!
//! Repository-level settings live in `.bulwark/config.toml`. A handful of
//! knobs can be overridden from the job environment, which is read once at
//! startup.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::{BulwarkError, Result};

/// Repository-level Bulwark configuration
///
/// Loaded from `.bulwark/config.toml` in the repo root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulwarkConfig {
    /// Retry budget and backoff
    #[serde(default)]
    pub retry: RetryConfig,

    /// Rate governor settings
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Circuit breaker settings
    #[serde(default)]
    pub circuit: CircuitConfig,

    /// Push and fallback branch settings
    #[serde(default)]
    pub git: GitConfig,

    /// GitHub API settings
    #[serde(default)]
    pub github: GithubConfig,

    /// AI provider settings
    #[serde(default)]
    pub ai: AiConfig,
}

/// Retry budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts per operation, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base delay of the exponential schedule
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

/// Rate governor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Longest a single governed wait may last
    #[serde(default = "default_wait_ceiling_secs")]
    pub wait_ceiling_secs: u64,

    /// Spacing between calls to a dependency that never reported quota
    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,

    /// Wait assumed for a 429 without any reset hint
    #[serde(default = "default_reset_secs")]
    pub default_reset_secs: u64,
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures before the circuit opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Initial open period
    #[serde(default = "default_cool_down_secs")]
    pub cool_down_secs: u64,

    /// Upper bound for the doubled open period on repeated trips
    #[serde(default = "default_cool_down_ceiling_secs")]
    pub cool_down_ceiling_secs: u64,
}

/// Push and fallback settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Prefix of fallback branches (`<prefix>-<short-sha>-<unix-ts>`)
    #[serde(default = "default_fallback_prefix")]
    pub fallback_prefix: String,
}

/// GitHub API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// `owner/name`; `GITHUB_REPOSITORY` overrides
    #[serde(default)]
    pub repository: Option<String>,
}

/// AI provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    #[serde(default = "default_ai_api_url")]
    pub api_url: String,

    #[serde(default = "default_ai_model")]
    pub model: String,

    #[serde(default = "default_ai_max_tokens")]
    pub max_tokens: usize,
}

// Default value providers
fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    5_000
}

fn default_wait_ceiling_secs() -> u64 {
    300
}

fn default_min_spacing_ms() -> u64 {
    1_000
}

fn default_reset_secs() -> u64 {
    60
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cool_down_secs() -> u64 {
    60
}

fn default_cool_down_ceiling_secs() -> u64 {
    900
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_fallback_prefix() -> String {
    "autofix".to_string()
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_ai_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_ai_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

fn default_ai_max_tokens() -> usize {
    8000
}

impl BulwarkConfig {
    /// Load configuration from `.bulwark/config.toml` or use defaults
    pub fn load_or_default(repo_root: &Path) -> Result<Self> {
        let config_path = repo_root.join(".bulwark/config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)
                .map_err(|e| BulwarkError::Config(format!("Failed to parse config file: {}", e)))
        } else {
            Ok(Self::default())
        }
    }

    /// Load from disk, then apply environment overrides
    pub fn load(repo_root: &Path) -> Result<Self> {
        let mut config = Self::load_or_default(repo_root)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `BULWARK_*` and `GITHUB_REPOSITORY` overrides
    ///
    /// `lookup` is the environment accessor, injectable for tests.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BULWARK_MAX_ATTEMPTS") {
            let attempts: u32 = parse_override("BULWARK_MAX_ATTEMPTS", &value)?;
            if attempts == 0 {
                return Err(BulwarkError::Config(
                    "BULWARK_MAX_ATTEMPTS must be at least 1".to_string(),
                ));
            }
            self.retry.max_attempts = attempts;
        }
        if let Some(value) = lookup("BULWARK_BASE_DELAY_MS") {
            self.retry.base_delay_ms = parse_override("BULWARK_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = lookup("BULWARK_RATE_WAIT_CEILING_SECS") {
            self.rate_limit.wait_ceiling_secs =
                parse_override("BULWARK_RATE_WAIT_CEILING_SECS", &value)?;
        }
        if let Some(value) = lookup("GITHUB_REPOSITORY").filter(|v| !v.trim().is_empty()) {
            self.github.repository = Some(value.trim().to_string());
        }
        Ok(())
    }

    /// Write default configuration to `.bulwark/config.toml`
    pub fn write_default(repo_root: &Path) -> Result<()> {
        let config_dir = repo_root.join(".bulwark");
        std::fs::create_dir_all(&config_dir)?;

        let content = toml::to_string_pretty(&Self::default())
            .map_err(|e| BulwarkError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(config_dir.join("config.toml"), content)?;
        Ok(())
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BulwarkError::Config(format!("{} has an invalid value: {:?}", key, value)))
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl RateLimitConfig {
    pub fn wait_ceiling(&self) -> Duration {
        Duration::from_secs(self.wait_ceiling_secs)
    }

    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    pub fn default_reset(&self) -> Duration {
        Duration::from_secs(self.default_reset_secs)
    }
}

impl CircuitConfig {
    pub fn cool_down(&self) -> Duration {
        Duration::from_secs(self.cool_down_secs)
    }

    pub fn cool_down_ceiling(&self) -> Duration {
        Duration::from_secs(self.cool_down_ceiling_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            wait_ceiling_secs: default_wait_ceiling_secs(),
            min_spacing_ms: default_min_spacing_ms(),
            default_reset_secs: default_reset_secs(),
        }
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cool_down_secs: default_cool_down_secs(),
            cool_down_ceiling_secs: default_cool_down_ceiling_secs(),
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            remote: default_remote(),
            fallback_prefix: default_fallback_prefix(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            repository: None,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_url: default_ai_api_url(),
            model: default_ai_model(),
            max_tokens: default_ai_max_tokens(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = BulwarkConfig::default();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay(), Duration::from_secs(5));
        assert_eq!(config.rate_limit.wait_ceiling(), Duration::from_secs(300));
        assert_eq!(config.rate_limit.min_spacing(), Duration::from_secs(1));
        assert_eq!(config.circuit.failure_threshold, 5);
        assert_eq!(config.circuit.cool_down(), Duration::from_secs(60));
        assert_eq!(config.git.fallback_prefix, "autofix");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let config = BulwarkConfig::load_or_default(temp.path()).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".bulwark")).unwrap();
        std::fs::write(
            temp.path().join(".bulwark/config.toml"),
            "[retry]\nmax_attempts = 5\n\n[git]\nremote = \"upstream\"\n",
        )
        .unwrap();

        let config = BulwarkConfig::load_or_default(temp.path()).unwrap();
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 5_000);
        assert_eq!(config.git.remote, "upstream");
        assert_eq!(config.git.fallback_prefix, "autofix");
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join(".bulwark")).unwrap();
        std::fs::write(temp.path().join(".bulwark/config.toml"), "[retry\n").unwrap();

        let err = BulwarkConfig::load_or_default(temp.path()).unwrap_err();
        assert!(matches!(err, BulwarkError::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_write_default_round_trips() {
        let temp = TempDir::new().unwrap();
        BulwarkConfig::write_default(temp.path()).unwrap();
        let config = BulwarkConfig::load_or_default(temp.path()).unwrap();
        assert_eq!(config.circuit.cool_down_ceiling_secs, 900);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = BulwarkConfig::default();
        config
            .apply_env_overrides(env(&[
                ("BULWARK_MAX_ATTEMPTS", "4"),
                ("BULWARK_BASE_DELAY_MS", "250"),
                ("BULWARK_RATE_WAIT_CEILING_SECS", "30"),
                ("GITHUB_REPOSITORY", "octo/widgets"),
            ]))
            .unwrap();

        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.retry.base_delay(), Duration::from_millis(250));
        assert_eq!(config.rate_limit.wait_ceiling(), Duration::from_secs(30));
        assert_eq!(config.github.repository.as_deref(), Some("octo/widgets"));
    }

    #[test]
    fn test_bad_env_override_rejected() {
        let mut config = BulwarkConfig::default();
        let err = config
            .apply_env_overrides(env(&[("BULWARK_MAX_ATTEMPTS", "three")]))
            .unwrap_err();
        assert!(err.to_string().contains("BULWARK_MAX_ATTEMPTS"));

        let err = config
            .apply_env_overrides(env(&[("BULWARK_MAX_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(matches!(err, BulwarkError::Config(_)));
    }
}
