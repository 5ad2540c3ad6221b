//! Mock LLM client for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::extractor::{LlmClient, LlmError};

/// Mock implementation of [`LlmClient`].
///
/// Returns a fixed response, or scripted responses consumed in order, and
/// records every prompt for assertions.
pub struct MockLlmClient {
    response: Arc<RwLock<Option<String>>>,
    scripted: Arc<RwLock<VecDeque<Result<String, LlmError>>>>,
    prompts: Arc<RwLock<Vec<String>>>,
    calls: AtomicUsize,
    always_fail: bool,
}

impl Default for MockLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self {
            response: Arc::new(RwLock::new(None)),
            scripted: Arc::new(RwLock::new(VecDeque::new())),
            prompts: Arc::new(RwLock::new(Vec::new())),
            calls: AtomicUsize::new(0),
            always_fail: false,
        }
    }

    /// Every call answers with the same text.
    pub fn with_response(response: &str) -> Self {
        Self {
            response: Arc::new(RwLock::new(Some(response.to_string()))),
            ..Self::new()
        }
    }

    /// Every call fails with a transport error.
    pub fn failing() -> Self {
        let mut client = Self::new();
        client.always_fail = true;
        client
    }

    /// Queue a response (or error) consumed by the next call. Scripted
    /// entries take precedence over the fixed response.
    pub async fn push_response(&self, response: Result<String, LlmError>) {
        self.scripted.write().await.push_back(response);
    }

    pub async fn set_response(&self, response: &str) {
        *self.response.write().await = Some(response.to_string());
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in order.
    pub async fn recorded_prompts(&self) -> Vec<String> {
        self.prompts.read().await.clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.write().await.push(prompt.to_string());

        if self.always_fail {
            return Err(LlmError::Transport("mock transport failure".into()));
        }
        if let Some(scripted) = self.scripted.write().await.pop_front() {
            return scripted;
        }
        match self.response.read().await.clone() {
            Some(response) => Ok(response),
            None => Err(LlmError::EmptyResponse),
        }
    }

    async fn test_connection(&self) -> bool {
        !self.always_fail
    }
}
