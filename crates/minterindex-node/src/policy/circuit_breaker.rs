//! Circuit breaker guarding the node endpoint.
//!
//! The client asks [`CircuitBreaker::admit`] before every request and reports
//! back with [`CircuitBreaker::observe`]. A call counts against the node only
//! when the node did not answer at all; an error envelope still proves the
//! node is up.
//!
//! - `Closed` → `Open`: `failure_threshold` consecutive unanswered calls
//! - `Open` → `HalfOpen`: the open deadline has passed
//! - `HalfOpen` → `Closed`: `success_threshold` answered calls
//! - `HalfOpen` → `Open`: any unanswered call

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    /// Calls are rejected without touching the network.
    Open,
    /// Calls are let through to probe the node.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub open_duration_ms: u64,
    pub success_threshold: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_duration_ms: 5_000,
            success_threshold: 1,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn open_duration(&self) -> Duration {
        Duration::from_millis(self.open_duration_ms)
    }
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed { unanswered: u32 },
    Open { until: Instant },
    HalfOpen { answered: u32 },
}

impl Phase {
    /// Move an expired `Open` on to `HalfOpen`.
    fn expire(&mut self, now: Instant) {
        if let Phase::Open { until } = *self {
            if now >= until {
                *self = Phase::HalfOpen { answered: 0 };
                tracing::info!("node circuit half-open, probing");
            }
        }
    }

    fn state(&self) -> CircuitState {
        match self {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}

/// Thread-safe circuit breaker, shared by clones.
#[derive(Clone)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    phase: Arc<Mutex<Phase>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            phase: Arc::new(Mutex::new(Phase::Closed { unanswered: 0 })),
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut phase = self.phase.lock().unwrap();
        phase.expire(Instant::now());
        phase.state()
    }

    /// `Ok` if a request may go out, otherwise how long the circuit stays open.
    pub fn admit(&self) -> Result<(), Duration> {
        let now = Instant::now();
        let mut phase = self.phase.lock().unwrap();
        phase.expire(now);
        match *phase {
            Phase::Open { until } => Err(until.saturating_duration_since(now)),
            _ => Ok(()),
        }
    }

    /// Time left before an open circuit lets a probe through. `None` unless open.
    pub fn remaining_open(&self) -> Option<Duration> {
        self.admit().err()
    }

    /// Report whether the node answered the last admitted call.
    pub fn observe(&self, answered: bool) {
        let now = Instant::now();
        let mut phase = self.phase.lock().unwrap();
        phase.expire(now);
        let next = match (*phase, answered) {
            (Phase::Closed { .. }, true) => Phase::Closed { unanswered: 0 },
            (Phase::Closed { unanswered }, false) => {
                let unanswered = unanswered + 1;
                if unanswered >= self.config.failure_threshold {
                    tracing::warn!(
                        failures = unanswered,
                        open_ms = self.config.open_duration_ms,
                        "node circuit open"
                    );
                    Phase::Open { until: now + self.config.open_duration() }
                } else {
                    Phase::Closed { unanswered }
                }
            }
            (Phase::HalfOpen { answered }, true) => {
                let answered = answered + 1;
                if answered >= self.config.success_threshold {
                    tracing::info!("node circuit closed");
                    Phase::Closed { unanswered: 0 }
                } else {
                    Phase::HalfOpen { answered }
                }
            }
            (Phase::HalfOpen { .. }, false) => {
                tracing::warn!("node probe failed, circuit open again");
                Phase::Open { until: now + self.config.open_duration() }
            }
            // A call admitted before the circuit opened; its outcome is stale.
            (open @ Phase::Open { .. }, _) => open,
        };
        *phase = next;
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("state", &self.state())
            .finish()
    }
}
