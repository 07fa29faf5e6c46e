use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::telemetry::{Telemetry, TelemetrySnapshot};

use super::analysis::AnalysisPort;
use super::domain::{AuditEvent, CompanyData, EvaluationId, EvaluationState, EvaluationStatus, ScenarioId};
use super::orchestrator::{EvaluationSettings, OrchestratorError, WorkflowOrchestrator};
use super::records::{RecordPublisher, SimulationRecord};
use super::scenario::{
    ComparisonResult, ModifiableVariable, Scenario, ScenarioEngine, ScenarioError,
    SimulationResult,
};
use super::scoring::ScoringEngine;
use super::store::{EvaluationStateStore, ScenarioRegistry};

/// Service composing the orchestrator, scenario engine, and record export.
pub struct CreditRiskService<P> {
    orchestrator: WorkflowOrchestrator,
    scenarios: ScenarioEngine,
    registry: Arc<ScenarioRegistry>,
    records: Arc<P>,
    telemetry: Arc<Telemetry>,
}

impl<P> CreditRiskService<P>
where
    P: RecordPublisher + 'static,
{
    pub fn new(
        port: Arc<dyn AnalysisPort>,
        records: Arc<P>,
        scoring: Arc<ScoringEngine>,
        settings: EvaluationSettings,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let orchestrator = WorkflowOrchestrator::new(
            Arc::new(EvaluationStateStore::with_retention(
                settings.retained_evaluations,
            )),
            port,
            scoring.clone(),
            telemetry.clone(),
            records.clone(),
            settings,
        );

        Self {
            orchestrator,
            scenarios: ScenarioEngine::new(scoring),
            registry: Arc::new(ScenarioRegistry::with_retention(settings.retained_scenarios)),
            records,
            telemetry,
        }
    }

    pub fn start_evaluation(
        &self,
        company: CompanyData,
    ) -> Result<EvaluationState, CreditServiceError> {
        let id = self.orchestrator.start(company)?;
        Ok(self.orchestrator.status(&id)?)
    }

    pub fn evaluation(&self, id: &EvaluationId) -> Result<EvaluationState, CreditServiceError> {
        Ok(self.orchestrator.status(id)?)
    }

    pub fn audit_trail(&self, id: &EvaluationId) -> Result<Vec<AuditEvent>, CreditServiceError> {
        Ok(self.orchestrator.audit_trail(id)?)
    }

    /// Latest audit events across all retained evaluations.
    pub fn recent_audit_events(&self, limit: usize) -> Vec<AuditEvent> {
        self.orchestrator.recent_audit(limit)
    }

    pub async fn await_evaluation(
        &self,
        id: &EvaluationId,
    ) -> Result<EvaluationState, CreditServiceError> {
        Ok(self.orchestrator.await_terminal(id).await?)
    }

    pub fn cancel_evaluation(
        &self,
        id: &EvaluationId,
    ) -> Result<EvaluationState, CreditServiceError> {
        Ok(self.orchestrator.cancel(id)?)
    }

    pub fn modifiable_variables(
        &self,
        id: &EvaluationId,
    ) -> Result<Vec<ModifiableVariable>, CreditServiceError> {
        let company = self.orchestrator.company(id)?;
        Ok(self.scenarios.list_modifiable_variables(&company))
    }

    /// Register a scenario against an evaluation's input.
    ///
    /// Completed evaluations lend their score as the baseline; otherwise the
    /// baseline is recomputed from the input when simulating.
    pub fn create_scenario(
        &self,
        id: &EvaluationId,
        changes: BTreeMap<String, f64>,
    ) -> Result<Arc<Scenario>, CreditServiceError> {
        let company = self.orchestrator.company(id)?;
        let state = self.orchestrator.status(id)?;
        let baseline = match state.status {
            EvaluationStatus::Completed => state.score,
            _ => None,
        };

        let scenario =
            self.scenarios
                .create_scenario(Some(id.clone()), company, baseline, changes);
        info!(
            scenario_id = %scenario.scenario_id,
            evaluation_id = %id,
            overrides = scenario.overrides.len(),
            "scenario created"
        );
        Ok(self.registry.insert(scenario))
    }

    pub fn simulate(
        &self,
        scenario_id: &ScenarioId,
    ) -> Result<Arc<SimulationResult>, CreditServiceError> {
        let scenario = self
            .registry
            .get(scenario_id)
            .ok_or_else(|| ScenarioError::NotFound(scenario_id.clone()))?;
        let result = self.scenarios.simulate(&scenario)?;

        if let Err(err) = self
            .records
            .publish_simulation(SimulationRecord::from(&result))
        {
            warn!(scenario_id = %scenario_id, error = %err, "simulation record not exported");
        }
        Ok(self.registry.record_simulation(result))
    }

    /// Compare scenarios, simulating any that have not been simulated yet.
    pub fn compare(
        &self,
        scenario_ids: &[ScenarioId],
    ) -> Result<ComparisonResult, CreditServiceError> {
        let mut results = Vec::with_capacity(scenario_ids.len());
        for scenario_id in scenario_ids {
            let result = match self.registry.simulation(scenario_id) {
                Some(result) => result,
                None => self.simulate(scenario_id)?,
            };
            results.push((*result).clone());
        }
        Ok(self.scenarios.compare(&results)?)
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }
}

/// Error raised by the credit risk service.
#[derive(Debug, thiserror::Error)]
pub enum CreditServiceError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error(transparent)]
    Scenario(#[from] ScenarioError),
}
