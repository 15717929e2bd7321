use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::EngineError;

/// `CLOSED` lets requests through and counts failures; `OPEN` rejects
/// everything until `recovery_timeout` elapses; `HALF_OPEN` lets a single
/// trial request through to decide whether to close again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
    recovery_timeout: Duration,
}

/// Per-database failure breaker guarding the SQL generator/executor calls.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    threshold: u32,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, recovery_timeout: Duration) -> Self {
        CircuitBreaker {
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
                recovery_timeout,
            }),
            threshold,
        }
    }

    /// Test seam mirroring direct field overrides in the upstream test
    /// suite (`orchestrator.circuit_breaker._recovery_timeout = 0.1`).
    pub fn set_recovery_timeout(&self, timeout: Duration) {
        self.inner.lock().unwrap().recovery_timeout = timeout;
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Called before attempting a pipeline run. Returns an error if the
    /// breaker is open and the recovery timeout hasn't elapsed; otherwise
    /// transitions `Open` -> `HalfOpen` once the timeout has elapsed and
    /// lets the trial request through.
    pub fn check(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map(|at| at.elapsed())
                    .unwrap_or(Duration::MAX);
                if elapsed >= inner.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    Ok(())
                } else {
                    Err(EngineError::CircuitBreakerOpen(
                        "circuit breaker is open".to_string(),
                    ))
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                }
            }
            CircuitState::Open => {}
        }
    }
}
