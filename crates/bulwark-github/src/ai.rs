//! AI provider messages client
//!
//! Stateless: every call sends one user message and returns the raw
//! outcome. [`extract_reply`] turns a successful outcome into text.

use bulwark_core::config::AiConfig;
use bulwark_core::{BulwarkError, Dependency, RawResult, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::headers::into_raw;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Message in a request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiMessage {
    pub role: String,
    pub content: String,
}

/// Request body
#[derive(Debug, Clone, Serialize)]
pub struct AiRequest {
    pub model: String,
    pub max_tokens: usize,
    pub messages: Vec<AiMessage>,
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: usize,
    pub output_tokens: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct AiResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

/// Text reply of a successful call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AiReply {
    pub text: String,
    pub usage: Option<Usage>,
}

/// Client for the AI provider messages API
#[derive(Clone)]
pub struct AiClient {
    http: Client,
    api_url: String,
    model: String,
    max_tokens: usize,
    api_key: String,
}

impl std::fmt::Debug for AiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiClient")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl AiClient {
    pub fn new(config: &AiConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| BulwarkError::Api(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            api_key: api_key.into(),
        })
    }

    /// Set max tokens for responses
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn request_body(&self, prompt: &str) -> AiRequest {
        AiRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: vec![AiMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        }
    }

    fn build(&self, prompt: &str) -> reqwest::RequestBuilder {
        self.http
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&self.request_body(prompt))
    }

    /// Send `prompt` as a single user message
    pub async fn complete(&self, prompt: &str) -> RawResult {
        tracing::debug!(
            "Sending {} chars to {} (max_tokens {})",
            prompt.len(),
            self.model,
            self.max_tokens
        );
        into_raw(self.build(prompt).send().await, Dependency::AiApi).await
    }
}

/// Concatenated text blocks of a successful response
pub fn extract_reply(raw: &RawResult) -> Result<AiReply> {
    let response: AiResponse = serde_json::from_str(raw.body_text())?;

    let text = response
        .content
        .iter()
        .filter(|block| block.kind == "text")
        .map(|block| block.text.as_str())
        .collect::<Vec<_>>()
        .join("");

    if text.is_empty() {
        return Err(BulwarkError::Api("No text content in response".to_string()));
    }

    if let Some(usage) = &response.usage {
        tracing::info!(
            "AI reply complete ({} chars, {} input tokens, {} output tokens)",
            text.len(),
            usage.input_tokens,
            usage.output_tokens
        );
    }

    Ok(AiReply {
        text,
        usage: response.usage,
    })
}
