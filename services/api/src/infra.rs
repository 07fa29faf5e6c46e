use metrics_exporter_prometheus::PrometheusHandle;
use pyme_risk::config::CreditConfig;
use pyme_risk::error::AppError;
use pyme_risk::telemetry::Telemetry;
use pyme_risk::workflows::credit::{
    CircuitBreakerPort, CreditRiskService, EvaluationId, EvaluationRecord, HeuristicAnalyzer,
    ProviderSelector, RecordError, RecordPublisher, ScenarioId, ScoringEngine, SimulationRecord,
};
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Keeps the latest exported record per evaluation and scenario.
#[derive(Default, Clone)]
pub(crate) struct InMemoryRecordArchive {
    evaluations: Arc<Mutex<HashMap<EvaluationId, EvaluationRecord>>>,
    simulations: Arc<Mutex<HashMap<ScenarioId, SimulationRecord>>>,
}

impl RecordPublisher for InMemoryRecordArchive {
    fn publish_evaluation(&self, record: EvaluationRecord) -> Result<(), RecordError> {
        let mut guard = self.evaluations.lock().expect("archive mutex poisoned");
        guard.insert(record.evaluation_id.clone(), record);
        Ok(())
    }

    fn publish_simulation(&self, record: SimulationRecord) -> Result<(), RecordError> {
        let mut guard = self.simulations.lock().expect("archive mutex poisoned");
        guard.insert(record.scenario_id.clone(), record);
        Ok(())
    }
}

impl InMemoryRecordArchive {
    pub(crate) fn evaluation(&self, id: &EvaluationId) -> Option<EvaluationRecord> {
        self.evaluations
            .lock()
            .expect("archive mutex poisoned")
            .get(id)
            .cloned()
    }

    pub(crate) fn simulation_count(&self) -> usize {
        self.simulations
            .lock()
            .expect("archive mutex poisoned")
            .len()
    }
}

/// Assemble the credit service backed by the built-in heuristic analyzer.
pub(crate) fn build_credit_service(
    config: &CreditConfig,
    archive: Arc<InMemoryRecordArchive>,
) -> Result<Arc<CreditRiskService<InMemoryRecordArchive>>, AppError> {
    let scoring = Arc::new(ScoringEngine::new(config.scoring.clone())?);
    let analyzer = Arc::new(CircuitBreakerPort::new(
        "heuristic",
        Arc::new(HeuristicAnalyzer),
        config.breaker,
    ));
    let port = Arc::new(ProviderSelector::single(analyzer));

    Ok(Arc::new(CreditRiskService::new(
        port,
        archive,
        scoring,
        config.evaluation,
        Arc::new(Telemetry::default()),
    )))
}
