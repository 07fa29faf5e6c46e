use crate::config::TelemetryConfig;
use crate::workflows::credit::domain::FailureKind;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(
                    f,
                    "invalid log level/filter '{}': unable to build EnvFilter",
                    value
                )
            }
            TelemetryError::Subscriber(err) => write!(f, "telemetry error: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryError::EnvFilter {
                value: config.log_level.clone(),
                source,
            })?
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

/// In-process counters for evaluations and analysis calls.
///
/// Shared through an `Arc` by whoever runs evaluations; nothing here is global.
#[derive(Debug, Default)]
pub struct Telemetry {
    evaluations_started: AtomicU64,
    evaluations_completed: AtomicU64,
    evaluations_degraded: AtomicU64,
    evaluations_failed: AtomicU64,
    evaluations_cancelled: AtomicU64,
    agent_calls: AtomicU64,
    agent_successes: AtomicU64,
    agent_timeouts: AtomicU64,
    agent_transport_failures: AtomicU64,
    agent_rejections: AtomicU64,
    agent_retries: AtomicU64,
    agent_latency_ms: AtomicU64,
    tokens_used: AtomicU64,
    processing_time_ms: AtomicU64,
    evaluations_timed: AtomicU64,
}

impl Telemetry {
    pub fn evaluation_started(&self) {
        self.evaluations_started.fetch_add(1, Ordering::Relaxed);
    }

    /// `degraded` marks a completion that proceeded without every component.
    pub fn evaluation_completed(&self, degraded: bool) {
        self.evaluations_completed.fetch_add(1, Ordering::Relaxed);
        if degraded {
            self.evaluations_degraded.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn evaluation_failed(&self) {
        self.evaluations_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn evaluation_cancelled(&self) {
        self.evaluations_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn agent_call(&self, elapsed_ms: u64, failure: Option<FailureKind>) {
        self.agent_calls.fetch_add(1, Ordering::Relaxed);
        self.agent_latency_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        let counter = match failure {
            None => &self.agent_successes,
            Some(FailureKind::Timeout) => &self.agent_timeouts,
            Some(FailureKind::Transport) => &self.agent_transport_failures,
            Some(FailureKind::RejectedInput) => &self.agent_rejections,
            Some(_) => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn agent_retry(&self) {
        self.agent_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tokens_used(&self, tokens: u64) {
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    /// Wall time of one evaluation from start to its concluding transition.
    pub fn evaluation_processed(&self, elapsed_ms: u64) {
        self.processing_time_ms.fetch_add(elapsed_ms, Ordering::Relaxed);
        self.evaluations_timed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        let agent_calls = load(&self.agent_calls);
        let agent_successes = load(&self.agent_successes);
        let (agent_success_rate, average_agent_latency_ms) = if agent_calls == 0 {
            (1.0, 0.0)
        } else {
            (
                agent_successes as f64 / agent_calls as f64,
                load(&self.agent_latency_ms) as f64 / agent_calls as f64,
            )
        };
        let evaluations_timed = load(&self.evaluations_timed);
        let average_processing_time_ms = if evaluations_timed == 0 {
            0.0
        } else {
            load(&self.processing_time_ms) as f64 / evaluations_timed as f64
        };

        TelemetrySnapshot {
            evaluations_started: load(&self.evaluations_started),
            evaluations_completed: load(&self.evaluations_completed),
            evaluations_degraded: load(&self.evaluations_degraded),
            evaluations_failed: load(&self.evaluations_failed),
            evaluations_cancelled: load(&self.evaluations_cancelled),
            agent_calls,
            agent_successes,
            agent_timeouts: load(&self.agent_timeouts),
            agent_transport_failures: load(&self.agent_transport_failures),
            agent_rejections: load(&self.agent_rejections),
            agent_retries: load(&self.agent_retries),
            agent_success_rate,
            average_agent_latency_ms,
            total_tokens_used: load(&self.tokens_used),
            average_processing_time_ms,
        }
    }

    pub fn reset(&self) {
        for counter in [
            &self.evaluations_started,
            &self.evaluations_completed,
            &self.evaluations_degraded,
            &self.evaluations_failed,
            &self.evaluations_cancelled,
            &self.agent_calls,
            &self.agent_successes,
            &self.agent_timeouts,
            &self.agent_transport_failures,
            &self.agent_rejections,
            &self.agent_retries,
            &self.agent_latency_ms,
            &self.tokens_used,
            &self.processing_time_ms,
            &self.evaluations_timed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub evaluations_started: u64,
    pub evaluations_completed: u64,
    pub evaluations_degraded: u64,
    pub evaluations_failed: u64,
    pub evaluations_cancelled: u64,
    pub agent_calls: u64,
    pub agent_successes: u64,
    pub agent_timeouts: u64,
    pub agent_transport_failures: u64,
    pub agent_rejections: u64,
    pub agent_retries: u64,
    pub agent_success_rate: f64,
    pub average_agent_latency_ms: f64,
    pub total_tokens_used: u64,
    pub average_processing_time_ms: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reports_rates_and_reset_clears() {
        let telemetry = Telemetry::default();
        telemetry.evaluation_started();
        telemetry.agent_call(100, None);
        telemetry.agent_call(300, Some(FailureKind::Timeout));
        telemetry.agent_retry();
        telemetry.evaluation_completed(true);

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.agent_calls, 2);
        assert_eq!(snapshot.agent_timeouts, 1);
        assert_eq!(snapshot.evaluations_degraded, 1);
        assert!((snapshot.agent_success_rate - 0.5).abs() < f64::EPSILON);
        assert!((snapshot.average_agent_latency_ms - 200.0).abs() < f64::EPSILON);

        telemetry.reset();
        let cleared = telemetry.snapshot();
        assert_eq!(cleared.agent_calls, 0);
        assert_eq!(cleared.evaluations_started, 0);
        assert_eq!(cleared.agent_success_rate, 1.0);
    }

    #[test]
    fn tokens_and_processing_time_accumulate() {
        let telemetry = Telemetry::default();
        assert_eq!(telemetry.snapshot().average_processing_time_ms, 0.0);

        telemetry.tokens_used(1_200);
        telemetry.tokens_used(800);
        telemetry.evaluation_processed(40);
        telemetry.evaluation_processed(60);

        let snapshot = telemetry.snapshot();
        assert_eq!(snapshot.total_tokens_used, 2_000);
        assert!((snapshot.average_processing_time_ms - 50.0).abs() < f64::EPSILON);

        telemetry.reset();
        assert_eq!(telemetry.snapshot().total_tokens_used, 0);
    }
}
