//! Credit risk evaluation for small and medium businesses.
//!
//! An evaluation validates the company input, runs the financial, reputational
//! and behavioral analyses concurrently, and consolidates whatever succeeded
//! into one explainable score. Scenarios replay the consolidation over
//! hypothetical inputs without touching the original evaluation.

pub mod analysis;
pub mod domain;
pub mod orchestrator;
pub mod records;
pub mod router;
pub mod scenario;
pub mod scoring;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use analysis::{
    AnalysisError, AnalysisPort, AnalysisRequest, BreakerConfig, CircuitBreakerPort,
    CircuitState, HeuristicAnalyzer, ProviderSelector, TaskComplexity,
};
pub use domain::{
    AgentKind, AnalysisPayload, AnalysisResult, BehavioralEvidence, CompanyData,
    EvaluationFailure, EvaluationId, EvaluationState, EvaluationStatus, EvaluationStatusView,
    EvidenceBundle, FailureKind, FinancialEvidence, ReputationalEvidence, ScenarioId,
};
pub use orchestrator::{
    EvaluationSettings, OrchestratorError, ValidationError, WorkflowOrchestrator,
};
pub use records::{
    DiscardRecords, EvaluationRecord, RecordError, RecordPublisher, SimulationRecord,
};
pub use router::credit_router;
pub use scenario::{
    ComparisonResult, ModifiableVariable, Scenario, ScenarioEngine, ScenarioError,
    SimulationResult, ViabilityOutcome,
};
pub use scoring::{
    ConfigurationError, ConsolidatedScore, CreditRecommendation, RiskBands, RiskTier,
    ScoringConfig, ScoringEngine, ScoringWeights,
};
pub use service::{CreditRiskService, CreditServiceError};
pub use store::{EvaluationStateStore, ScenarioRegistry, StoreError};
