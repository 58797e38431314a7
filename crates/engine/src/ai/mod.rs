// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Model caller: the only component allowed to block on the AI.

pub mod parse;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-sonnet-4-5";
const DEFAULT_MAX_TOKENS: u32 = 8192;

#[derive(Debug, Error)]
pub enum AiError {
    /// Model overloaded past the bounded retry budget; promoted to a
    /// session-level recovery by the orchestrator.
    #[error("model overloaded after {attempts} attempts")]
    Overloaded { attempts: u32 },

    #[error("model call failed: {0}")]
    Http(String),

    #[error("model response missing content")]
    EmptyResponse,
}

/// One model request.
#[derive(Debug, Clone)]
pub struct AiRequest {
    pub api_key: String,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

impl AiRequest {
    pub fn new(api_key: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            system: None,
            prompt: prompt.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Text plus the token counts the budget gate settles against.
#[derive(Debug, Clone)]
pub struct AiResponse {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[async_trait]
pub trait AiClient: Send + Sync + 'static {
    async fn complete(&self, request: AiRequest) -> Result<AiResponse, AiError>;
}

#[derive(Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

/// Anthropic Messages API client with exponential backoff + jitter on
/// overload responses.
pub struct AnthropicClient {
    http: reqwest::Client,
    model: String,
    max_attempts: u32,
}

impl AnthropicClient {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            http: reqwest::Client::new(),
            model: DEFAULT_MODEL.to_string(),
            max_attempts,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn backoff(attempt: u32) -> Duration {
        let base_ms = 1_000u64.saturating_mul(1u64 << attempt.min(6));
        let jitter_ms = rand::thread_rng().gen_range(0..=base_ms / 2);
        Duration::from_millis(base_ms + jitter_ms)
    }
}

#[async_trait]
impl AiClient for AnthropicClient {
    async fn complete(&self, request: AiRequest) -> Result<AiResponse, AiError> {
        let body = MessagesBody {
            model: &self.model,
            max_tokens: request.max_tokens,
            system: request.system.as_deref(),
            messages: vec![Message { role: "user", content: &request.prompt }],
        };

        for attempt in 0..self.max_attempts {
            let response = self
                .http
                .post(ANTHROPIC_API_URL)
                .header("x-api-key", &request.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&body)
                .send()
                .await;

            let response = match response {
                Ok(r) => r,
                Err(e) => return Err(AiError::Http(e.to_string())),
            };

            let status = response.status();
            if status.as_u16() == 429 || status.as_u16() == 529 || status.is_server_error() {
                let wait = Self::backoff(attempt);
                tracing::warn!(
                    status = status.as_u16(),
                    attempt,
                    wait_ms = wait.as_millis() as u64,
                    "model overloaded, backing off"
                );
                tokio::time::sleep(wait).await;
                continue;
            }
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                return Err(AiError::Http(format!("{status}: {detail}")));
            }

            let parsed: MessagesResponse = response
                .json()
                .await
                .map_err(|e| AiError::Http(e.to_string()))?;
            let text = parsed
                .content
                .first()
                .map(|c| c.text.clone())
                .filter(|t| !t.is_empty())
                .ok_or(AiError::EmptyResponse)?;
            return Ok(AiResponse {
                text,
                input_tokens: parsed.usage.input_tokens,
                output_tokens: parsed.usage.output_tokens,
            });
        }

        Err(AiError::Overloaded { attempts: self.max_attempts })
    }
}
