//! Drives one evaluation from validation through fan-out analysis to scoring.

mod validation;

pub use validation::ValidationError;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::telemetry::Telemetry;

use super::analysis::{AnalysisError, AnalysisPort, AnalysisRequest};
use super::domain::{
    AgentKind, AnalysisResult, AuditAction, AuditEvent, CompanyData, EvaluationFailure,
    EvaluationId, EvaluationState, EvaluationStatus, FailureKind, TransitionError,
};
use super::records::{EvaluationRecord, RecordPublisher};
use super::scoring::{ConsistencyOutcome, ScoringEngine};
use super::store::{EvaluationStateStore, StoreError};

static EVALUATION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_evaluation_id() -> EvaluationId {
    let id = EVALUATION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    EvaluationId(format!("eval-{id:06}"))
}

/// Minimum number of analyses that must succeed before scoring.
const MIN_SUCCESSES: usize = 2;

/// Runtime limits for evaluations and the scenarios built on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationSettings {
    /// Deadline for one analysis call including its retries.
    pub agent_timeout: Duration,
    pub transport_retries: u32,
    pub max_field_bytes: usize,
    /// Terminal evaluations kept in memory before the oldest are evicted.
    pub retained_evaluations: usize,
    pub retained_scenarios: usize,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            agent_timeout: Duration::from_secs(30),
            transport_retries: 1,
            max_field_bytes: 64 * 1024,
            retained_evaluations: 10_000,
            retained_scenarios: 10_000,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("evaluation {0} not found")]
    NotFound(EvaluationId),
    #[error("evaluation {0} already finished")]
    AlreadyTerminal(EvaluationId),
    #[error("evaluation {0} already exists")]
    Conflict(EvaluationId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl From<StoreError> for OrchestratorError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::Terminal(id) => Self::AlreadyTerminal(id),
            StoreError::Conflict(id) => Self::Conflict(id),
        }
    }
}

struct InFlight {
    cancel: CancellationToken,
    status: watch::Receiver<EvaluationStatus>,
}

struct AgentFailure {
    error: AnalysisError,
    attempts: u32,
}

type AgentOutcome = Result<AnalysisResult, AgentFailure>;

/// Owns the lifecycle of every evaluation it starts.
#[derive(Clone)]
pub struct WorkflowOrchestrator {
    store: Arc<EvaluationStateStore>,
    port: Arc<dyn AnalysisPort>,
    scoring: Arc<ScoringEngine>,
    telemetry: Arc<Telemetry>,
    records: Arc<dyn RecordPublisher>,
    settings: EvaluationSettings,
    inflight: Arc<Mutex<HashMap<EvaluationId, InFlight>>>,
}

impl WorkflowOrchestrator {
    pub fn new(
        store: Arc<EvaluationStateStore>,
        port: Arc<dyn AnalysisPort>,
        scoring: Arc<ScoringEngine>,
        telemetry: Arc<Telemetry>,
        records: Arc<dyn RecordPublisher>,
        settings: EvaluationSettings,
    ) -> Self {
        Self {
            store,
            port,
            scoring,
            telemetry,
            records,
            settings,
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Validate the input and launch the analyses in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, company: CompanyData) -> Result<EvaluationId, OrchestratorError> {
        let id = next_evaluation_id();
        let started = Instant::now();
        let company = Arc::new(company);
        self.store.insert(
            company.clone(),
            EvaluationState::new(id.clone(), &company, Utc::now()),
        )?;
        self.telemetry.evaluation_started();
        self.store
            .modify(&id, |state| state.transition(EvaluationStatus::Validating))??;

        let issues = validation::validate(&company, self.settings.max_field_bytes);
        if !issues.is_empty() {
            let state = self.store.modify(&id, |state| {
                state.errors.extend(issues.iter().map(|issue| EvaluationFailure {
                    agent: None,
                    kind: FailureKind::Validation,
                    message: issue.clone(),
                    attempts: 0,
                }));
                state.audit_event(AuditAction::ValidationFailed, None, 0, issues.join("; "));
                state.transition(EvaluationStatus::Failed)?;
                Ok::<_, TransitionError>(state.clone())
            })??;
            warn!(evaluation_id = %id, issues = issues.len(), "evaluation rejected by validation");
            self.telemetry.evaluation_failed();
            self.publish(&state);
            return Err(ValidationError {
                evaluation_id: id,
                issues,
            }
            .into());
        }

        self.store
            .modify(&id, |state| state.transition(EvaluationStatus::Analyzing))??;

        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(EvaluationStatus::Analyzing);
        self.inflight.lock().expect("in-flight mutex poisoned").insert(
            id.clone(),
            InFlight {
                cancel: cancel.clone(),
                status: status_rx,
            },
        );

        info!(evaluation_id = %id, company_id = %company.company_id, "evaluation started");
        let run = self.clone();
        let run_id = id.clone();
        tokio::spawn(async move { run.run(run_id, company, started, cancel, status_tx).await });
        Ok(id)
    }

    pub fn status(&self, id: &EvaluationId) -> Result<EvaluationState, OrchestratorError> {
        Ok(self.store.snapshot(id)?)
    }

    pub fn company(&self, id: &EvaluationId) -> Result<Arc<CompanyData>, OrchestratorError> {
        Ok(self.store.company(id)?)
    }

    /// Stop an in-flight evaluation, discarding any component results.
    pub fn cancel(&self, id: &EvaluationId) -> Result<EvaluationState, OrchestratorError> {
        let state = self.store.modify(id, |state| {
            state.results = [None, None, None];
            state.errors.push(EvaluationFailure {
                agent: None,
                kind: FailureKind::Cancelled,
                message: "evaluation cancelled by caller".to_string(),
                attempts: 0,
            });
            state.audit_event(
                AuditAction::Cancelled,
                None,
                0,
                "cancelled by caller; component results discarded",
            );
            state.transition(EvaluationStatus::Failed)?;
            Ok::<_, TransitionError>(state.clone())
        })??;

        if let Some(inflight) = self
            .inflight
            .lock()
            .expect("in-flight mutex poisoned")
            .get(id)
        {
            inflight.cancel.cancel();
        }

        info!(evaluation_id = %id, "evaluation cancelled");
        self.telemetry.evaluation_cancelled();
        self.publish(&state);
        Ok(state)
    }

    /// Ordered history of one evaluation's phases and analysis outcomes.
    pub fn audit_trail(&self, id: &EvaluationId) -> Result<Vec<AuditEvent>, OrchestratorError> {
        Ok(self.store.snapshot(id)?.audit)
    }

    pub fn recent_audit(&self, limit: usize) -> Vec<AuditEvent> {
        self.store.recent_audit(limit)
    }

    /// Wait until the evaluation reaches `Completed` or `Failed`.
    pub async fn await_terminal(
        &self,
        id: &EvaluationId,
    ) -> Result<EvaluationState, OrchestratorError> {
        let receiver = self
            .inflight
            .lock()
            .expect("in-flight mutex poisoned")
            .get(id)
            .map(|inflight| inflight.status.clone());
        if let Some(mut receiver) = receiver {
            // a closed channel means the run already ended
            let _ = receiver.wait_for(|status| status.is_terminal()).await;
        }
        self.status(id)
    }

    async fn run(
        self,
        id: EvaluationId,
        company: Arc<CompanyData>,
        started: Instant,
        cancel: CancellationToken,
        status_tx: watch::Sender<EvaluationStatus>,
    ) {
        let deadline = Instant::now() + self.settings.agent_timeout;
        let handles = AgentKind::ALL.map(|agent| {
            let request = AnalysisRequest {
                kind: agent,
                company_id: company.company_id.clone(),
                company_name: company.company_name.clone(),
                evidence: company.evidence(agent),
                deadline,
            };
            let task = AgentTask {
                evaluation_id: id.clone(),
                port: self.port.clone(),
                store: self.store.clone(),
                telemetry: self.telemetry.clone(),
                cancel: cancel.clone(),
                retries: self.settings.transport_retries,
                budget_ms: self.settings.agent_timeout.as_millis() as u64,
            };
            tokio::spawn(task.execute(request))
        });

        let mut outcomes = Vec::with_capacity(handles.len());
        for (agent, handle) in AgentKind::ALL.into_iter().zip(handles) {
            let outcome = handle.await.unwrap_or_else(|join_error| {
                Err(AgentFailure {
                    error: AnalysisError::Transport {
                        agent,
                        message: format!("analysis task aborted: {join_error}"),
                    },
                    attempts: 1,
                })
            });
            outcomes.push((agent, outcome));
        }

        let degraded = outcomes.iter().any(|(_, outcome)| outcome.is_err());
        let concluded = self.store.modify(&id, |state| {
            self.conclude(state, outcomes)?;
            Ok::<_, TransitionError>(state.clone())
        });

        let final_status = match concluded {
            Ok(Ok(state)) => {
                self.telemetry.evaluation_processed(started.elapsed().as_millis() as u64);
                match state.status {
                    EvaluationStatus::Completed => {
                        info!(
                            evaluation_id = %id,
                            final_score = state.score.as_ref().map(|score| score.final_score),
                            warnings = state.warnings.len(),
                            "evaluation completed"
                        );
                        self.telemetry.evaluation_completed(degraded);
                    }
                    _ => {
                        warn!(evaluation_id = %id, errors = state.errors.len(), "evaluation failed");
                        self.telemetry.evaluation_failed();
                    }
                }
                self.publish(&state);
                state.status
            }
            Ok(Err(err)) => {
                error!(evaluation_id = %id, error = %err, "evaluation left in an inconsistent state");
                self.store
                    .snapshot(&id)
                    .map(|state| state.status)
                    .unwrap_or(EvaluationStatus::Failed)
            }
            // cancelled while the analyses were running
            Err(_) => {
                debug!(evaluation_id = %id, "discarding analyses of a finished evaluation");
                EvaluationStatus::Failed
            }
        };

        let _ = status_tx.send(final_status);
        self.inflight
            .lock()
            .expect("in-flight mutex poisoned")
            .remove(&id);
    }

    /// Apply the partial-failure policy and score the evaluation.
    fn conclude(
        &self,
        state: &mut EvaluationState,
        outcomes: Vec<(AgentKind, AgentOutcome)>,
    ) -> Result<(), TransitionError> {
        let mut results: [Option<AnalysisResult>; 3] = [None, None, None];
        let mut failed = Vec::new();
        for (agent, outcome) in outcomes {
            match outcome {
                Ok(result) => results[agent.slot()] = Some(result),
                Err(failure) => {
                    state.errors.push(EvaluationFailure {
                        agent: Some(agent),
                        kind: failure.error.kind(),
                        message: failure.error.to_string(),
                        attempts: failure.attempts,
                    });
                    failed.push(agent);
                }
            }
        }

        let successes = results.iter().filter(|slot| slot.is_some()).count();
        if successes < MIN_SUCCESSES {
            state.errors.push(EvaluationFailure {
                agent: None,
                kind: FailureKind::InsufficientSuccesses,
                message: format!(
                    "only {successes} of {} analyses succeeded, {MIN_SUCCESSES} required",
                    AgentKind::ALL.len()
                ),
                attempts: 0,
            });
            return state.transition(EvaluationStatus::Failed);
        }

        for agent in &failed {
            state.warnings.push(format!(
                "{agent} analysis unavailable; score computed from the remaining analyses with reduced confidence"
            ));
        }
        state.transition(EvaluationStatus::Scoring)?;

        let neutral = self.scoring.neutral_baseline();
        let [financial, reputational, behavioral] = AgentKind::ALL.map(|agent| {
            results[agent.slot()].clone().unwrap_or_else(|| {
                AnalysisResult::unavailable(agent, neutral, format!("{agent} analysis failed"))
            })
        });
        for result in results.into_iter().flatten() {
            state.record_result(result);
        }

        let score = self
            .scoring
            .consolidate(&financial, &reputational, &behavioral);
        match self.scoring.validate_consistency(&score) {
            ConsistencyOutcome::Consistent => {}
            ConsistencyOutcome::LowConfidence { components } => {
                let threshold = self.scoring.config().confidence_threshold;
                for agent in components.iter().filter(|agent| !failed.contains(*agent)) {
                    state.warnings.push(format!(
                        "{agent} analysis confidence {:.2} is below the {threshold:.2} threshold",
                        score.component(*agent).confidence
                    ));
                }
            }
            ConsistencyOutcome::InsufficientData { components } => {
                state.low_confidence = true;
                let names: Vec<&str> = components.iter().map(|agent| agent.label()).collect();
                state.warnings.push(format!(
                    "insufficient data: {} analyses are missing or below the confidence threshold",
                    names.join(", ")
                ));
            }
        }

        state.score = Some(score);
        state.transition(EvaluationStatus::Completed)
    }

    fn publish(&self, state: &EvaluationState) {
        if let Err(err) = self.records.publish_evaluation(EvaluationRecord::from(state)) {
            warn!(evaluation_id = %state.evaluation_id, error = %err, "evaluation record not exported");
        }
    }
}

/// One analysis call with its deadline, retry, and cancellation handling.
struct AgentTask {
    evaluation_id: EvaluationId,
    port: Arc<dyn AnalysisPort>,
    store: Arc<EvaluationStateStore>,
    telemetry: Arc<Telemetry>,
    cancel: CancellationToken,
    retries: u32,
    budget_ms: u64,
}

impl AgentTask {
    async fn execute(self, request: AnalysisRequest) -> AgentOutcome {
        let agent = request.kind;
        let deadline = request.deadline;
        let mut attempts = 0;

        loop {
            attempts += 1;
            let started = Instant::now();
            let outcome = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(AnalysisError::Cancelled { agent }),
                result = tokio::time::timeout_at(deadline, self.port.analyze(request.clone())) => {
                    result.unwrap_or(Err(AnalysisError::Timeout {
                        agent,
                        budget_ms: self.budget_ms,
                    }))
                }
            };
            self.telemetry.agent_call(
                started.elapsed().as_millis() as u64,
                outcome.as_ref().err().map(AnalysisError::kind),
            );

            match outcome {
                Ok(result) => {
                    debug!(
                        evaluation_id = %self.evaluation_id,
                        %agent,
                        attempt = attempts,
                        score = result.score,
                        "analysis finished"
                    );
                    if let Some(tokens) = result.tokens_used {
                        self.telemetry.tokens_used(tokens);
                    }
                    // rejected once the evaluation is terminal
                    let _ = self.store.modify(&self.evaluation_id, |state| {
                        state.audit_event(
                            AuditAction::AgentSucceeded,
                            Some(agent),
                            attempts,
                            format!(
                                "score {} at confidence {:.2} in {}ms",
                                result.score, result.confidence, result.elapsed_ms
                            ),
                        );
                        state.record_result(result.clone());
                    });
                    return Ok(result);
                }
                Err(error) if error.is_retryable() && attempts <= self.retries => {
                    warn!(
                        evaluation_id = %self.evaluation_id,
                        %agent,
                        attempt = attempts,
                        error = %error,
                        "retrying analysis after transport failure"
                    );
                    self.telemetry.agent_retry();
                }
                Err(error) => {
                    warn!(
                        evaluation_id = %self.evaluation_id,
                        %agent,
                        attempt = attempts,
                        error = %error,
                        "analysis failed"
                    );
                    let _ = self.store.modify(&self.evaluation_id, |state| {
                        state.audit_event(
                            AuditAction::AgentFailed,
                            Some(agent),
                            attempts,
                            error.to_string(),
                        );
                    });
                    return Err(AgentFailure { error, attempts });
                }
            }
        }
    }
}
