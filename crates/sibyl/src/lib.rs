//! Sibyl - conversational question answering core
//!
//! Routes each incoming question to a casual-chat or knowledge path,
//! keeps a bounded conversation memory, retrieves supporting passages
//! for knowledge questions, and generates answers with explicit source
//! attribution. External calls go through retry and circuit-breaker
//! guards; classification and retrieval results are cached with a TTL.
//!
//! The crate is a library core: the generation backend and the vector
//! index are consumed through the [`llm::LlmClient`] and
//! [`retrieval::Retriever`] traits, so the whole pipeline runs against
//! in-process fakes in tests.

pub mod cache;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod metrics;
pub mod orchestrator;
pub mod prompts;
pub mod resilience;
pub mod retrieval;
pub mod router;
pub mod validation;

pub use config::SibylConfig;
pub use error::{Error, Result};
pub use llm::LlmClient;
pub use memory::{ConversationMemory, Role, Turn};
pub use metrics::Metrics;
pub use orchestrator::{AnswerOrchestrator, AnswerResult};
pub use retrieval::{RetrievedPassage, Retriever};
pub use router::{RouteDecision, RouteStrategy};
