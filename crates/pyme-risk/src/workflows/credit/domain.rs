use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scoring::ConsolidatedScore;

/// Identifier assigned to each evaluation run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationId(pub String);

impl fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned to each what-if scenario.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(pub String);

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The three analysis tasks run for every evaluation, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Financial,
    Reputational,
    Behavioral,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [
        AgentKind::Financial,
        AgentKind::Reputational,
        AgentKind::Behavioral,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AgentKind::Financial => "financial",
            AgentKind::Reputational => "reputational",
            AgentKind::Behavioral => "behavioral",
        }
    }

    pub(crate) fn slot(&self) -> usize {
        match self {
            AgentKind::Financial => 0,
            AgentKind::Reputational => 1,
            AgentKind::Behavioral => 2,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Financial statements plus the figures extracted from them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinancialEvidence {
    pub statements: String,
    pub monthly_sales: f64,
    pub monthly_expenses: f64,
    pub total_assets: f64,
    pub total_liabilities: f64,
    pub current_assets: f64,
    pub current_liabilities: f64,
    pub sales_growth_rate: f64,
}

/// Online reputation signals gathered from social media and reviews.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReputationalEvidence {
    pub social_media: String,
    pub sentiment_score: f64,
    pub average_rating: f64,
    pub review_count: u32,
    pub negative_mentions: u32,
}

/// Commercial references and payment behavior.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehavioralEvidence {
    pub commercial_references: String,
    pub payment_history: String,
    pub on_time_payment_ratio: f64,
    pub average_days_late: f64,
    pub verified_references: u32,
    pub defaults_last_year: u32,
}

/// Company input for one evaluation. Never mutated after the evaluation starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyData {
    pub company_id: String,
    pub company_name: String,
    #[serde(default)]
    pub financial: FinancialEvidence,
    #[serde(default)]
    pub reputational: ReputationalEvidence,
    #[serde(default)]
    pub behavioral: BehavioralEvidence,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl CompanyData {
    pub fn evidence(&self, kind: AgentKind) -> EvidenceBundle {
        match kind {
            AgentKind::Financial => EvidenceBundle::Financial(self.financial.clone()),
            AgentKind::Reputational => EvidenceBundle::Reputational(self.reputational.clone()),
            AgentKind::Behavioral => EvidenceBundle::Behavioral(self.behavioral.clone()),
        }
    }
}

/// Input handed to a single analysis task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EvidenceBundle {
    Financial(FinancialEvidence),
    Reputational(ReputationalEvidence),
    Behavioral(BehavioralEvidence),
}

impl EvidenceBundle {
    pub fn kind(&self) -> AgentKind {
        match self {
            EvidenceBundle::Financial(_) => AgentKind::Financial,
            EvidenceBundle::Reputational(_) => AgentKind::Reputational,
            EvidenceBundle::Behavioral(_) => AgentKind::Behavioral,
        }
    }

    /// Bytes of free text carried by the bundle.
    pub fn text_len(&self) -> usize {
        match self {
            EvidenceBundle::Financial(evidence) => evidence.statements.len(),
            EvidenceBundle::Reputational(evidence) => evidence.social_media.len(),
            EvidenceBundle::Behavioral(evidence) => {
                evidence.commercial_references.len() + evidence.payment_history.len()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPattern {
    Punctual,
    MinorDelays,
    Delinquent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReliabilityLevel {
    High,
    Medium,
    Low,
}

/// Analyzer-specific structured findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnalysisPayload {
    Financial {
        solvency: String,
        liquidity: String,
        profitability: String,
        sales_trend: String,
        summary: String,
    },
    Reputational {
        sentiment: Sentiment,
        sentiment_score: f64,
        positive_themes: Vec<String>,
        negative_themes: Vec<String>,
        summary: String,
    },
    Behavioral {
        payment_pattern: PaymentPattern,
        reference_reliability: ReliabilityLevel,
        summary: String,
    },
    /// Stand-in for an analysis that failed or never ran.
    Unavailable { reason: String },
}

/// Output of one analysis task for one evaluation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub agent: AgentKind,
    pub score: u16,
    pub payload: AnalysisPayload,
    pub confidence: f64,
    pub elapsed_ms: u64,
    /// Inference tokens consumed, when the analyzer reports usage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisResult {
    /// Neutral zero-confidence result used in place of a failed analysis.
    pub fn unavailable(agent: AgentKind, neutral_score: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            agent,
            score: neutral_score,
            payload: AnalysisPayload::Unavailable {
                reason: reason.clone(),
            },
            confidence: 0.0,
            elapsed_ms: 0,
            tokens_used: None,
            error: Some(reason),
        }
    }

    pub fn is_available(&self) -> bool {
        !matches!(self.payload, AnalysisPayload::Unavailable { .. })
    }
}

/// Lifecycle of a single evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Pending,
    Validating,
    Analyzing,
    Scoring,
    Completed,
    Failed,
}

impl EvaluationStatus {
    pub fn label(&self) -> &'static str {
        match self {
            EvaluationStatus::Pending => "Pending",
            EvaluationStatus::Validating => "Validating",
            EvaluationStatus::Analyzing => "Analyzing",
            EvaluationStatus::Scoring => "Scoring",
            EvaluationStatus::Completed => "Completed",
            EvaluationStatus::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EvaluationStatus::Completed | EvaluationStatus::Failed)
    }

    pub fn can_transition_to(&self, next: EvaluationStatus) -> bool {
        use EvaluationStatus::*;
        match (self, next) {
            (current, Failed) => !current.is_terminal(),
            (Pending, Validating) | (Validating, Analyzing) | (Analyzing, Scoring) => true,
            (Scoring, Completed) => true,
            _ => false,
        }
    }
}

/// Classification of everything that can go wrong in an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Timeout,
    Transport,
    RejectedInput,
    Cancelled,
    InsufficientSuccesses,
}

/// Failure captured as data on the evaluation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationFailure {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentKind>,
    pub kind: FailureKind,
    pub message: String,
    #[serde(default)]
    pub attempts: u32,
}

#[derive(Debug, thiserror::Error)]
#[error("evaluation {evaluation_id} cannot move from {from:?} to {to:?}")]
pub struct TransitionError {
    pub evaluation_id: EvaluationId,
    pub from: EvaluationStatus,
    pub to: EvaluationStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    PhaseEntered,
    ValidationFailed,
    AgentSucceeded,
    AgentFailed,
    Cancelled,
}

/// One timestamped step in an evaluation's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub evaluation_id: EvaluationId,
    pub at: DateTime<Utc>,
    pub action: AuditAction,
    /// Phase entered, for `PhaseEntered` events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<EvaluationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentKind>,
    #[serde(default)]
    pub attempts: u32,
    pub detail: String,
}

/// Per-agent completion flag exposed while an evaluation is in flight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentProgress {
    pub agent: AgentKind,
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Everything known about one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationState {
    pub evaluation_id: EvaluationId,
    pub company_id: String,
    pub company_name: String,
    pub status: EvaluationStatus,
    pub results: [Option<AnalysisResult>; 3],
    pub score: Option<ConsolidatedScore>,
    pub low_confidence: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<EvaluationFailure>,
    #[serde(default)]
    pub audit: Vec<AuditEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EvaluationState {
    pub fn new(evaluation_id: EvaluationId, company: &CompanyData, now: DateTime<Utc>) -> Self {
        let created = AuditEvent {
            evaluation_id: evaluation_id.clone(),
            at: now,
            action: AuditAction::PhaseEntered,
            phase: Some(EvaluationStatus::Pending),
            agent: None,
            attempts: 0,
            detail: "evaluation created".to_string(),
        };
        Self {
            evaluation_id,
            company_id: company.company_id.clone(),
            company_name: company.company_name.clone(),
            status: EvaluationStatus::Pending,
            results: [None, None, None],
            score: None,
            low_confidence: false,
            warnings: Vec::new(),
            errors: Vec::new(),
            audit: vec![created],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn transition(&mut self, next: EvaluationStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                evaluation_id: self.evaluation_id.clone(),
                from: self.status,
                to: next,
            });
        }
        let from = self.status;
        self.status = next;
        self.updated_at = Utc::now();
        self.audit.push(AuditEvent {
            evaluation_id: self.evaluation_id.clone(),
            at: self.updated_at,
            action: AuditAction::PhaseEntered,
            phase: Some(next),
            agent: None,
            attempts: 0,
            detail: format!("{} -> {}", from.label(), next.label()),
        });
        Ok(())
    }

    /// Append a non-transition event to the audit trail.
    pub fn audit_event(
        &mut self,
        action: AuditAction,
        agent: Option<AgentKind>,
        attempts: u32,
        detail: impl Into<String>,
    ) {
        self.audit.push(AuditEvent {
            evaluation_id: self.evaluation_id.clone(),
            at: Utc::now(),
            action,
            phase: None,
            agent,
            attempts,
            detail: detail.into(),
        });
    }

    pub fn result(&self, agent: AgentKind) -> Option<&AnalysisResult> {
        self.results[agent.slot()].as_ref()
    }

    pub fn record_result(&mut self, result: AnalysisResult) {
        let slot = result.agent.slot();
        self.results[slot] = Some(result);
        self.updated_at = Utc::now();
    }

    pub fn progress(&self) -> Vec<AgentProgress> {
        AgentKind::ALL
            .iter()
            .map(|agent| {
                let result = self.result(*agent);
                AgentProgress {
                    agent: *agent,
                    completed: result.is_some(),
                    confidence: result.map(|value| value.confidence),
                }
            })
            .collect()
    }

    pub fn status_view(&self) -> EvaluationStatusView {
        EvaluationStatusView {
            evaluation_id: self.evaluation_id.clone(),
            company_id: self.company_id.clone(),
            status: self.status.label(),
            agents: self.progress(),
            final_score: self.score.as_ref().map(|score| score.final_score),
            risk_tier: self.score.as_ref().map(|score| score.risk_tier.label()),
            score: self.score.clone(),
            low_confidence: self.low_confidence,
            warnings: self.warnings.clone(),
            errors: self.errors.clone(),
            updated_at: self.updated_at,
        }
    }
}

/// Compact status representation served to polling callers.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationStatusView {
    pub evaluation_id: EvaluationId,
    pub company_id: String,
    pub status: &'static str,
    pub agents: Vec<AgentProgress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_tier: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ConsolidatedScore>,
    pub low_confidence: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<EvaluationFailure>,
    pub updated_at: DateTime<Utc>,
}
