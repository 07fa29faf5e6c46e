use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{EvaluationFailure, EvaluationId, EvaluationState, ScenarioId};
use super::scenario::SimulationResult;
use super::scoring::ConsolidatedScore;

/// Result record for one terminal evaluation, keyed by evaluation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub evaluation_id: EvaluationId,
    pub company_id: String,
    pub company_name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<ConsolidatedScore>,
    pub low_confidence: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<EvaluationFailure>,
    pub completed_at: DateTime<Utc>,
}

impl From<&EvaluationState> for EvaluationRecord {
    fn from(state: &EvaluationState) -> Self {
        Self {
            evaluation_id: state.evaluation_id.clone(),
            company_id: state.company_id.clone(),
            company_name: state.company_name.clone(),
            status: state.status.label().to_string(),
            score: state.score.clone(),
            low_confidence: state.low_confidence,
            warnings: state.warnings.clone(),
            errors: state.errors.clone(),
            completed_at: state.updated_at,
        }
    }
}

/// Simulation record keyed by scenario id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationRecord {
    pub scenario_id: ScenarioId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation_id: Option<EvaluationId>,
    pub original_score: u16,
    pub simulated_score: u16,
    pub viability_score: f64,
    pub result: SimulationResult,
}

impl From<&SimulationResult> for SimulationRecord {
    fn from(result: &SimulationResult) -> Self {
        Self {
            scenario_id: result.scenario_id.clone(),
            evaluation_id: result.evaluation_id.clone(),
            original_score: result.original.final_score,
            simulated_score: result.simulated.final_score,
            viability_score: result.viability.viability_score,
            result: result.clone(),
        }
    }
}

/// Outbound hook for storing evaluation and simulation artifacts externally.
pub trait RecordPublisher: Send + Sync {
    fn publish_evaluation(&self, record: EvaluationRecord) -> Result<(), RecordError>;
    fn publish_simulation(&self, record: SimulationRecord) -> Result<(), RecordError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("record sink unavailable: {0}")]
    Unavailable(String),
    #[error("record {0} rejected by sink")]
    Rejected(String),
}

/// Publisher that drops every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardRecords;

impl RecordPublisher for DiscardRecords {
    fn publish_evaluation(&self, _record: EvaluationRecord) -> Result<(), RecordError> {
        Ok(())
    }

    fn publish_simulation(&self, _record: SimulationRecord) -> Result<(), RecordError> {
        Ok(())
    }
}
