//! Error taxonomy for the orchestration core.
//!
//! Transient errors (classification, retrieval, generation, timeouts) are
//! eligible for retry and count toward circuit breaker thresholds.
//! Everything else propagates immediately.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Invalid constants at construction time. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Rejected user input (empty, too long, suspicious content).
    #[error("validation error: {0}")]
    Validation(String),

    /// The classification call to the generation backend failed.
    #[error("classification failed: {0}")]
    Classification(String),

    /// The retrieval collaborator failed.
    #[error("retrieval failed: {0}")]
    Retrieval(String),

    /// The generation collaborator failed.
    #[error("generation failed: {0}")]
    Generation(String),

    /// The breaker for this call site is open; the call was rejected
    /// without invoking the dependency.
    #[error("circuit open for '{site}', failing fast")]
    CircuitOpen { site: &'static str },

    /// A single attempt exceeded its deadline.
    #[error("'{site}' attempt timed out after {timeout_ms}ms")]
    Timeout { site: &'static str, timeout_ms: u64 },

    /// All retry attempts for a call site were consumed.
    #[error("'{site}' failed after {attempts} attempts: {last}")]
    RetryExhausted {
        site: &'static str,
        attempts: u32,
        #[source]
        last: Box<Error>,
    },
}

impl Error {
    /// Whether the resilience wrapper may retry this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Classification(_)
                | Error::Retrieval(_)
                | Error::Generation(_)
                | Error::Timeout { .. }
        )
    }

    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Validation(_) => "validation",
            Error::Classification(_) => "classification",
            Error::Retrieval(_) => "retrieval",
            Error::Generation(_) => "generation",
            Error::CircuitOpen { .. } => "circuit_open",
            Error::Timeout { .. } => "timeout",
            Error::RetryExhausted { .. } => "retry_exhausted",
        }
    }
}
