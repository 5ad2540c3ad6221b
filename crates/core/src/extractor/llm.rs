//! LLM client abstraction and the Gemini implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::GeminiConfig;
use crate::resilience::{retry_with_policy, BreakerError, CircuitBreaker, KeyPool, RetryPolicy, Transient};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("LLM returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("LLM response carried no generated text")]
    EmptyResponse,

    #[error("all credentials exhausted, last error: {0}")]
    AllKeysExhausted(String),

    #[error("circuit breaker '{0}' is open")]
    CircuitOpen(String),
}

impl Transient for LlmError {
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(_) => true,
            LlmError::Api { status, .. } => *status >= 500 || *status == 429,
            LlmError::AllKeysExhausted(_) => true,
            _ => false,
        }
    }
}

/// Text generation seam, mocked in tests.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError>;

    /// Cheap credential probe.
    async fn test_connection(&self) -> bool;
}

/// Gemini `generateContent` client with key failover.
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    keys: Arc<KeyPool>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
}

impl GeminiClient {
    pub fn new(
        config: &GeminiConfig,
        keys: Arc<KeyPool>,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs as u64))
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            keys,
            breaker,
            retry: RetryPolicy::default(),
        })
    }

    /// Pull the generated text out of a `generateContent` response body.
    fn extract_text(body: &serde_json::Value) -> Result<String, LlmError> {
        let text = body
            .get("candidates")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("content"))
            .and_then(|c| c.get("parts"))
            .and_then(|p| p.get(0))
            .and_then(|p| p.get("text"))
            .and_then(|t| t.as_str());
        match text {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => Err(LlmError::EmptyResponse),
        }
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, LlmError> {
        let attempts = self.keys.len().max(1);
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });
        let mut last_error = "no keys configured".to_string();

        for attempt in 0..attempts {
            let Some((key_index, key)) = self.keys.acquire().await else {
                break;
            };
            let url = format!(
                "{}/models/{}:generateContent?key={}",
                self.base_url, self.model, key
            );

            let response = match self.http.post(&url).json(&payload).send().await {
                Ok(r) => r,
                Err(e) => {
                    warn!(attempt, error = %e, "LLM request failed");
                    last_error = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            if status.as_u16() == 429 {
                warn!(attempt, key_index, "LLM key rate limited");
                self.keys.mark_unavailable(key_index, None);
                last_error = "HTTP 429 rate limited".to_string();
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                warn!(attempt, status = status.as_u16(), "LLM error response");
                last_error = format!("HTTP {}: {}", status.as_u16(), body);
                continue;
            }

            let body: serde_json::Value = match response.json().await {
                Ok(b) => b,
                Err(e) => {
                    last_error = format!("invalid response body: {}", e);
                    continue;
                }
            };
            if let Some(err) = body.get("error") {
                last_error = format!("API error: {}", err);
                error!(error = %last_error, "LLM rejected request");
                continue;
            }
            return Self::extract_text(&body);
        }

        Err(LlmError::AllKeysExhausted(last_error))
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.breaker
            .execute(|| {
                retry_with_policy(&self.retry, "llm_generate", || self.generate_once(prompt))
            })
            .await
            .map_err(|e| match e {
                BreakerError::Open { name } => LlmError::CircuitOpen(name),
                BreakerError::Operation(e) => e,
            })
    }

    async fn test_connection(&self) -> bool {
        match self.generate("Reply with the single word: ok").await {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "LLM connection test failed");
                false
            }
        }
    }
}
