//! Circuit breaker state machine for external call sites.
//!
//! One breaker per protected call site. Closed counts consecutive
//! failures; open rejects everything until the cooldown elapses; half-open
//! admits exactly one trial call whose outcome decides the next state.

use crate::config::CircuitConfig;
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are rejected without touching the dependency
    Open,
    /// One trial call is probing whether the dependency recovered
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    state: CircuitState,
    /// Consecutive failures while closed
    failure_count: u32,
    /// Successes accumulated in half-open
    success_count: u32,
    failure_threshold: u32,
    /// Successes required to close from half-open. The trial-call contract
    /// wants exactly one.
    success_threshold: u32,
    opened_at: Option<Instant>,
    open_duration: Duration,
    /// Start of the in-flight trial call (half-open only). A probe older
    /// than `open_duration` counts as abandoned (the caller dropped the
    /// future without reporting an outcome) and may be reclaimed.
    probe_started: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            failure_threshold,
            success_threshold: 1,
            opened_at: None,
            open_duration,
            probe_started: None,
        }
    }

    pub fn from_config(config: &CircuitConfig) -> Self {
        Self::new(
            config.failure_threshold,
            Duration::from_secs(config.open_duration_secs),
        )
    }

    /// Ask whether a call may proceed right now.
    ///
    /// Open breakers transition to half-open once the cooldown has
    /// elapsed; half-open admits a single probe at a time. A probe whose
    /// outcome was never reported is reclaimed after `open_duration`, so a
    /// cancelled trial call cannot wedge the breaker.
    pub fn acquire(&mut self) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = self
                    .opened_at
                    .map(|at| at.elapsed() >= self.open_duration)
                    .unwrap_or(true);
                if elapsed {
                    self.half_open();
                    self.probe_started = Some(Instant::now());
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => match self.probe_started {
                Some(at) if at.elapsed() < self.open_duration => false,
                _ => {
                    self.probe_started = Some(Instant::now());
                    true
                }
            },
        }
    }

    /// Record a failed call.
    pub fn record_failure(&mut self) {
        self.probe_started = None;
        match self.state {
            CircuitState::Closed => {
                self.failure_count += 1;
                if self.failure_count >= self.failure_threshold {
                    self.open();
                }
            }
            CircuitState::HalfOpen => {
                // trial call failed, back to open with a fresh timer
                self.open();
            }
            CircuitState::Open => {}
        }
    }

    /// Record a successful call.
    pub fn record_success(&mut self) {
        self.probe_started = None;
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.success_threshold {
                    self.close();
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    fn open(&mut self) {
        self.state = CircuitState::Open;
        self.opened_at = Some(Instant::now());
        self.failure_count = 0;
        self.success_count = 0;
    }

    fn half_open(&mut self) {
        self.state = CircuitState::HalfOpen;
        self.success_count = 0;
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.opened_at = None;
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(60))
    }
}
