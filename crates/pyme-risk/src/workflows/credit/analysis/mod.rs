//! Boundary to the analysis agents plus the adapters layered around them.

mod breaker;
mod heuristic;
mod provider;

pub use breaker::{BreakerConfig, CircuitBreakerPort, CircuitState};
pub use heuristic::{ComponentAssessment, HeuristicAnalyzer};
pub use provider::{ProviderSelector, TaskComplexity};

use async_trait::async_trait;
use tokio::time::Instant;

use super::domain::{AgentKind, AnalysisResult, EvidenceBundle, FailureKind};

/// Typed request handed to an analysis capability.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub kind: AgentKind,
    pub company_id: String,
    pub company_name: String,
    pub evidence: EvidenceBundle,
    pub deadline: Instant,
}

/// Capability contract every analysis task satisfies.
#[async_trait]
pub trait AnalysisPort: Send + Sync {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError>;
}

/// Failure of a single analysis call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("{agent} analysis timed out after {budget_ms}ms")]
    Timeout { agent: AgentKind, budget_ms: u64 },
    #[error("{agent} analysis transport failure: {message}")]
    Transport { agent: AgentKind, message: String },
    #[error("{agent} analysis rejected its input: {reason}")]
    RejectedInput { agent: AgentKind, reason: String },
    #[error("{agent} analysis cancelled")]
    Cancelled { agent: AgentKind },
}

impl AnalysisError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AnalysisError::Timeout { .. } => FailureKind::Timeout,
            AnalysisError::Transport { .. } => FailureKind::Transport,
            AnalysisError::RejectedInput { .. } => FailureKind::RejectedInput,
            AnalysisError::Cancelled { .. } => FailureKind::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalysisError::Transport { .. })
    }
}

