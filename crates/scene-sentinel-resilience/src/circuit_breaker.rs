//! Circuit Breaker Pattern Implementation
//!
//! Prevents a persistently failing scene from continuing to trigger full L3
//! escalations. Three states:
//! - CLOSED: normal operation
//! - OPEN: failing, reject all candidates until the timeout elapses
//! - HALF_OPEN: a single probe is underway to test recovery
//!
//! Unlike a request-wrapping breaker, this one does not execute operations
//! itself — the gating layer calls `allow` before a validation run starts and
//! `record_success`/`record_failure` once the run's final outcome is known.
//! Time is passed in explicitly rather than read from the system clock, so
//! the breaker can be driven by a virtual clock in tests.

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use tracing::{info, warn};

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Optional circuit breaker name, used only in log lines
    pub name: Option<String>,
    /// Consecutive failures in CLOSED before opening
    pub failure_threshold: u32,
    /// Consecutive successes in HALF_OPEN before closing
    pub success_threshold: u32,
    /// Time to wait after opening before allowing a HALF_OPEN probe
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            name: None,
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(300),
        }
    }
}

/// Circuit breaker states. `Open` carries the instant it was opened so the
/// timeout can be evaluated against caller-supplied time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Snapshot of breaker counters, useful for logging and assertions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
}

enum Inner {
    Closed { failure_count: u32 },
    Open { opened_at: Instant },
    HalfOpen { success_count: u32 },
}

/// A single scene's circuit breaker. Not internally synchronized — callers
/// (the gating layer) own it behind their own lock.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Inner,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Inner::Closed { failure_count: 0 },
        }
    }

    fn name(&self) -> &str {
        self.config.name.as_deref().unwrap_or("scene-validator")
    }

    /// Should a new candidate be allowed to start a validation run? Mutates
    /// state when an OPEN breaker's timeout has elapsed (CLOSED -> HALF_OPEN
    /// is not a state this method produces; that transition only happens via
    /// `record_success`/`record_failure`).
    pub fn allow(&mut self, now: Instant) -> bool {
        match self.inner {
            Inner::Closed { .. } => true,
            Inner::HalfOpen { .. } => true,
            Inner::Open { opened_at } => {
                if now.saturating_duration_since(opened_at) >= self.config.timeout {
                    info!(circuit = self.name(), "circuit breaker entering half-open probe");
                    self.inner = Inner::HalfOpen { success_count: 0 };
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Report that a validation run ended in SUCCESS.
    pub fn record_success(&mut self, _now: Instant) {
        match &mut self.inner {
            Inner::Closed { failure_count } => {
                *failure_count = 0;
            }
            Inner::HalfOpen { success_count } => {
                *success_count += 1;
                if *success_count >= self.config.success_threshold {
                    info!(
                        circuit = self.name(),
                        successes = *success_count,
                        "circuit breaker closed after half-open recovery"
                    );
                    self.inner = Inner::Closed { failure_count: 0 };
                }
            }
            Inner::Open { .. } => {
                // allow() always transitions out of Open before a run starts;
                // a success report against a still-Open breaker is a caller bug
                // but is otherwise harmless to ignore.
            }
        }
    }

    /// Report that a validation run ended in FAILURE (final L3 miss, or a
    /// terminal transport/scheduler error).
    pub fn record_failure(&mut self, now: Instant) {
        match &mut self.inner {
            Inner::Closed { failure_count } => {
                *failure_count += 1;
                if *failure_count >= self.config.failure_threshold {
                    warn!(
                        circuit = self.name(),
                        failures = *failure_count,
                        "circuit breaker opened"
                    );
                    self.inner = Inner::Open { opened_at: now };
                }
            }
            Inner::HalfOpen { .. } => {
                warn!(circuit = self.name(), "half-open probe failed, reopening");
                self.inner = Inner::Open { opened_at: now };
            }
            Inner::Open { .. } => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        match self.inner {
            Inner::Closed { .. } => CircuitState::Closed,
            Inner::Open { .. } => CircuitState::Open,
            Inner::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let (failure_count, success_count) = match self.inner {
            Inner::Closed { failure_count } => (failure_count, 0),
            Inner::Open { .. } => (0, 0),
            Inner::HalfOpen { success_count } => (0, success_count),
        };
        CircuitBreakerStats {
            state: self.state(),
            failure_count,
            success_count,
        }
    }

    /// Force back to CLOSED, discarding counters. Used in tests and for
    /// manual operator intervention.
    pub fn force_closed(&mut self) {
        self.inner = Inner::Closed { failure_count: 0 };
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &stats.state)
            .field("failure_count", &stats.failure_count)
            .field("success_count", &stats.success_count)
            .finish()
    }
}
