use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::super::domain::AnalysisResult;
use super::{AnalysisError, AnalysisPort, AnalysisRequest};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Wraps an inference-backed analysis service with a circuit breaker.
///
/// Only transport failures trip the breaker: timeouts are owned by the
/// orchestrator and rejected input says nothing about service health.
pub struct CircuitBreakerPort {
    name: String,
    inner: Arc<dyn AnalysisPort>,
    config: BreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreakerPort {
    pub fn new(name: impl Into<String>, inner: Arc<dyn AnalysisPort>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            inner,
            config,
            state: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        let mut guard = self.state.lock().expect("breaker mutex poisoned");
        self.refresh(&mut guard);
        guard.state
    }

    fn refresh(&self, guard: &mut BreakerState) {
        if guard.state == CircuitState::Open {
            let elapsed = guard
                .opened_at
                .map(|opened| opened.elapsed())
                .unwrap_or_default();
            if elapsed >= self.config.cooldown {
                guard.state = CircuitState::HalfOpen;
                guard.probe_in_flight = false;
                info!(service = %self.name, "circuit breaker half-open, admitting probe");
            }
        }
    }

    fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut guard = self.state.lock().expect("breaker mutex poisoned");
        self.refresh(&mut guard);
        let probe = match guard.state {
            CircuitState::Closed => false,
            CircuitState::Open => return None,
            CircuitState::HalfOpen if guard.probe_in_flight => return None,
            CircuitState::HalfOpen => {
                guard.probe_in_flight = true;
                true
            }
        };
        Some(CallPermit {
            breaker: self,
            probe,
            settled: false,
        })
    }

    fn on_success(&self) {
        let mut guard = self.state.lock().expect("breaker mutex poisoned");
        if guard.state != CircuitState::Closed {
            info!(service = %self.name, "circuit breaker closed after successful probe");
        }
        guard.state = CircuitState::Closed;
        guard.consecutive_failures = 0;
        guard.opened_at = None;
        guard.probe_in_flight = false;
    }

    fn on_transport_failure(&self) {
        let mut guard = self.state.lock().expect("breaker mutex poisoned");
        guard.consecutive_failures += 1;
        let reopen = match guard.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => guard.consecutive_failures >= self.config.failure_threshold,
            CircuitState::Open => false,
        };
        if reopen {
            guard.state = CircuitState::Open;
            guard.opened_at = Some(Instant::now());
            guard.probe_in_flight = false;
            warn!(
                service = %self.name,
                failures = guard.consecutive_failures,
                threshold = self.config.failure_threshold,
                "circuit breaker opened"
            );
        }
    }

    fn release_probe(&self) {
        let mut guard = self.state.lock().expect("breaker mutex poisoned");
        guard.probe_in_flight = false;
    }
}

/// Admission for one call through the breaker.
///
/// A half-open probe whose future is dropped before settling (caller deadline
/// or cancellation) hands the probe slot back so the next call can try again.
struct CallPermit<'a> {
    breaker: &'a CircuitBreakerPort,
    probe: bool,
    settled: bool,
}

impl CallPermit<'_> {
    fn settle(mut self, outcome: &Result<AnalysisResult, AnalysisError>) {
        self.settled = true;
        match outcome {
            Ok(_) => self.breaker.on_success(),
            Err(err) if err.is_retryable() => self.breaker.on_transport_failure(),
            Err(_) if self.probe => self.breaker.release_probe(),
            Err(_) => {}
        }
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            debug!(service = %self.breaker.name, "half-open probe abandoned before completion");
            self.breaker.release_probe();
        }
    }
}

#[async_trait]
impl AnalysisPort for CircuitBreakerPort {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let agent = request.kind;
        let Some(permit) = self.try_acquire() else {
            return Err(AnalysisError::Transport {
                agent,
                message: format!("circuit open for {}", self.name),
            });
        };

        let outcome = self.inner.analyze(request).await;
        permit.settle(&outcome);
        outcome
    }
}
