//! Generation backend abstraction.
//!
//! Production code talks to a backend through [`LlmClient`]; tests use
//! [`FakeLlmClient`] with scripted responses and recorded prompts, so no
//! network is required anywhere in the test suite.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Per-call generation options.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: None,
        }
    }
}

/// Narrow interface to the generation collaborator.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Produce a completion for `prompt`. Fails with
    /// [`Error::Generation`] on provider or network failure.
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String>;
}

/// Build the configured backend.
pub fn client_from_config(config: &LlmConfig) -> Result<Arc<dyn LlmClient>> {
    match config.provider {
        LlmProvider::Ollama => Ok(Arc::new(OllamaClient::from_config(config)?)),
        LlmProvider::OpenAi => Ok(Arc::new(OpenAiClient::from_config(config)?)),
    }
}

// ============================================================================
// Fake LLM Client (Testing)
// ============================================================================

#[derive(Debug, Clone)]
enum FakeReply {
    Text(String),
    Failure(String),
}

/// Scripted generation backend for deterministic tests.
///
/// Responses are consumed in FIFO order; once the script is exhausted the
/// fallback reply applies. Every prompt is recorded for assertions.
pub struct FakeLlmClient {
    script: Mutex<VecDeque<FakeReply>>,
    fallback: FakeReply,
    prompts: Mutex<Vec<String>>,
}

impl FakeLlmClient {
    /// Fake that answers "ok" once the script runs out.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: FakeReply::Text("ok".to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Fake whose every unscripted call fails with a generation error.
    pub fn failing(message: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: FakeReply::Failure(message.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_response(&self, text: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(FakeReply::Text(text.to_string()));
    }

    pub fn push_failure(&self, message: &str) {
        self.script
            .lock()
            .unwrap()
            .push_back(FakeReply::Failure(message.to_string()));
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

impl Default for FakeLlmClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for FakeLlmClient {
    async fn generate(&self, prompt: &str, _options: &GenerateOptions) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            FakeReply::Text(text) => Ok(text),
            FakeReply::Failure(message) => Err(Error::Generation(message)),
        }
    }
}
