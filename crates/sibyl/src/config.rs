//! Configuration for the orchestration core.
//!
//! Loads settings from a toml file or uses defaults. Every constant the
//! core consumes at construction time lives here: memory capacity, cache
//! TTL and size, retry/backoff schedule, breaker thresholds, and the
//! relevance cutoff for hybrid fallback.

use crate::error::{Error, Result};
use crate::memory::DEFAULT_MEMORY_TURNS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Default config file path
pub const CONFIG_PATH: &str = "/etc/sibyl/config.toml";

/// Which generation backend to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Local Ollama server (default, free)
    Ollama,
    /// Remote OpenAI-compatible API
    OpenAi,
}

/// Generation backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: LlmProvider,

    /// Ollama server URL
    #[serde(default = "default_ollama_base_url")]
    pub ollama_base_url: String,

    /// Ollama model name
    #[serde(default = "default_ollama_model")]
    pub ollama_model: String,

    /// OpenAI-compatible endpoint base URL
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,

    /// OpenAI model name
    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    /// Environment variable holding the API key (remote backends only)
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature for answers
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP request timeout in seconds (outer bound; per-attempt deadlines
    /// are enforced separately by the call guard)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> LlmProvider {
    LlmProvider::Ollama
}

fn default_ollama_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_ollama_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            ollama_base_url: default_ollama_base_url(),
            ollama_model: default_ollama_model(),
            openai_base_url: default_openai_base_url(),
            openai_model: default_openai_model(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// How many raw turns the memory retains (FIFO eviction beyond this)
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// How many of the stored turns are rendered into prompts
    #[serde(default = "default_prompt_window_turns")]
    pub prompt_window_turns: usize,
}

fn default_max_turns() -> usize {
    DEFAULT_MEMORY_TURNS
}

fn default_prompt_window_turns() -> usize {
    6
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            prompt_window_turns: default_prompt_window_turns(),
        }
    }
}

/// TTL cache configuration (shared by the route and retrieval caches)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Default time-to-live per entry in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Maximum live entries before LRU eviction
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_ttl() -> u64 {
    3600
}

fn default_cache_max_entries() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_max_entries(),
        }
    }
}

/// Retry schedule configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, including the first call
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff base: delay before attempt n+1 is `base * 2^n`
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Backoff cap
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Apply random jitter to backoff delays
    #[serde(default)]
    pub jitter: bool,

    /// Per-attempt deadline in seconds
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_attempt_timeout() -> u64 {
    30
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: false,
            attempt_timeout_secs: default_attempt_timeout(),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitConfig {
    /// Consecutive failures before the breaker opens
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the breaker stays open before admitting a trial call
    #[serde(default = "default_open_duration")]
    pub open_duration_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_open_duration() -> u64 {
    60
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            open_duration_secs: default_open_duration(),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Number of passages requested per query
    #[serde(default = "default_retrieval_k")]
    pub k: usize,

    /// Minimum passage score to count as relevant. At the default of 0.0
    /// the hybrid fallback triggers only on an empty result.
    #[serde(default)]
    pub relevance_threshold: f32,
}

fn default_retrieval_k() -> usize {
    4
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: default_retrieval_k(),
            relevance_threshold: 0.0,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SibylConfig {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit: CircuitConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl SibylConfig {
    /// Load configuration from a toml file, falling back to defaults when
    /// the file does not exist. Always validated.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let raw = fs::read_to_string(path)
                .map_err(|e| Error::Configuration(format!("cannot read {}: {}", path.display(), e)))?;
            let config: SibylConfig = toml::from_str(&raw)
                .map_err(|e| Error::Configuration(format!("cannot parse {}: {}", path.display(), e)))?;
            info!(path = %path.display(), "loaded configuration");
            config
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            SibylConfig::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Check every constant for sanity. Invalid configuration is fatal at
    /// startup, before any external call is made.
    pub fn validate(&self) -> Result<()> {
        if self.memory.max_turns == 0 {
            return Err(Error::Configuration("memory.max_turns must be >= 1".into()));
        }
        if self.memory.prompt_window_turns > self.memory.max_turns {
            return Err(Error::Configuration(format!(
                "memory.prompt_window_turns ({}) exceeds memory.max_turns ({})",
                self.memory.prompt_window_turns, self.memory.max_turns
            )));
        }
        if self.cache.ttl_secs == 0 {
            return Err(Error::Configuration("cache.ttl_secs must be > 0".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(Error::Configuration("cache.max_entries must be >= 1".into()));
        }
        if self.retry.max_attempts == 0 || self.retry.max_attempts > 10 {
            return Err(Error::Configuration(format!(
                "retry.max_attempts must be 1..=10, got {}",
                self.retry.max_attempts
            )));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::Configuration(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.retry.attempt_timeout_secs == 0 {
            return Err(Error::Configuration("retry.attempt_timeout_secs must be > 0".into()));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(Error::Configuration("circuit.failure_threshold must be >= 1".into()));
        }
        if self.retrieval.k == 0 || self.retrieval.k > 20 {
            return Err(Error::Configuration(format!(
                "retrieval.k must be 1..=20, got {}",
                self.retrieval.k
            )));
        }
        if !self.retrieval.relevance_threshold.is_finite()
            || !(0.0..=1.0).contains(&self.retrieval.relevance_threshold)
        {
            return Err(Error::Configuration(format!(
                "retrieval.relevance_threshold must be within 0.0..=1.0, got {}",
                self.retrieval.relevance_threshold
            )));
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(Error::Configuration(format!(
                "llm.temperature must be within 0.0..=2.0, got {}",
                self.llm.temperature
            )));
        }
        Ok(())
    }
}
