//! Ollama generation backend.
//!
//! Talks to a local Ollama server over its `/api/generate` endpoint with
//! streaming disabled.

use super::{GenerateOptions, LlmClient};
use crate::config::LlmConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(base_url: &str, model: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::Configuration(format!("cannot build http client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        Self::new(
            &config.ollama_base_url,
            &config.ollama_model,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(&self, prompt: &str, options: &GenerateOptions) -> Result<String> {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": options.temperature },
        });
        if let Some(max_tokens) = options.max_tokens {
            body["options"]["num_predict"] = serde_json::json!(max_tokens);
        }

        debug!(model = %self.model, prompt_chars = prompt.len(), "ollama generate");

        let response = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Generation(format!("ollama request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Generation(format!(
                "ollama returned {}",
                response.status()
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| Error::Generation(format!("invalid ollama response: {}", e)))?;

        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .trim()
            .to_string();

        if text.is_empty() {
            return Err(Error::Generation("ollama returned an empty response".into()));
        }
        Ok(text)
    }
}
