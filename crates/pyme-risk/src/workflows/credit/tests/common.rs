use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use axum::response::Response;
use serde_json::Value;

use crate::telemetry::Telemetry;
use crate::workflows::credit::analysis::{AnalysisError, AnalysisPort, AnalysisRequest};
use crate::workflows::credit::domain::{
    AgentKind, AnalysisPayload, AnalysisResult, BehavioralEvidence, CompanyData,
    FinancialEvidence, PaymentPattern, ReliabilityLevel, ReputationalEvidence, Sentiment,
};
use crate::workflows::credit::orchestrator::{EvaluationSettings, WorkflowOrchestrator};
use crate::workflows::credit::records::{
    EvaluationRecord, RecordError, RecordPublisher, SimulationRecord,
};
use crate::workflows::credit::scoring::{ScoringConfig, ScoringEngine};
use crate::workflows::credit::service::CreditRiskService;
use crate::workflows::credit::store::EvaluationStateStore;

pub(super) fn company(suffix: &str) -> CompanyData {
    CompanyData {
        company_id: format!("pyme-{suffix}"),
        company_name: format!("Distribuidora {suffix}"),
        financial: FinancialEvidence {
            statements: "Estado de resultados 2024: ventas estables".to_string(),
            monthly_sales: 42_000.0,
            monthly_expenses: 30_000.0,
            total_assets: 310_000.0,
            total_liabilities: 140_000.0,
            current_assets: 90_000.0,
            current_liabilities: 45_000.0,
            sales_growth_rate: 0.08,
        },
        reputational: ReputationalEvidence {
            social_media: "clientes destacan la puntualidad de las entregas".to_string(),
            sentiment_score: 0.55,
            average_rating: 4.4,
            review_count: 120,
            negative_mentions: 6,
        },
        behavioral: BehavioralEvidence {
            commercial_references: "Proveedor A, Proveedor B, Banco C".to_string(),
            payment_history: "24 meses sin moras".to_string(),
            on_time_payment_ratio: 0.96,
            average_days_late: 2.0,
            verified_references: 3,
            defaults_last_year: 0,
        },
        metadata: BTreeMap::from([("sector".to_string(), "comercio".to_string())]),
    }
}

pub(super) fn scoring_engine() -> Arc<ScoringEngine> {
    Arc::new(ScoringEngine::new(ScoringConfig::default()).expect("default scoring config"))
}

pub(super) fn fast_settings() -> EvaluationSettings {
    EvaluationSettings {
        agent_timeout: Duration::from_millis(200),
        transport_retries: 1,
        max_field_bytes: 4 * 1024,
        ..EvaluationSettings::default()
    }
}

/// Usage reported by every scripted analysis call.
pub(super) const TOKENS_PER_CALL: u64 = 420;

pub(super) fn result(agent: AgentKind, score: u16, confidence: f64) -> AnalysisResult {
    let payload = match agent {
        AgentKind::Financial => AnalysisPayload::Financial {
            solvency: "strong equity-to-assets".to_string(),
            liquidity: "adequate current ratio".to_string(),
            profitability: "strong operating margin".to_string(),
            sales_trend: "growing sales (+8%)".to_string(),
            summary: "scripted".to_string(),
        },
        AgentKind::Reputational => AnalysisPayload::Reputational {
            sentiment: Sentiment::Positive,
            sentiment_score: 0.55,
            positive_themes: vec!["puntualidad".to_string()],
            negative_themes: Vec::new(),
            summary: "scripted".to_string(),
        },
        AgentKind::Behavioral => AnalysisPayload::Behavioral {
            payment_pattern: PaymentPattern::Punctual,
            reference_reliability: ReliabilityLevel::High,
            summary: "scripted".to_string(),
        },
    };
    AnalysisResult {
        agent,
        score,
        payload,
        confidence,
        elapsed_ms: 1,
        tokens_used: Some(TOKENS_PER_CALL),
        error: None,
    }
}

/// Scripted behavior of one analysis slot.
#[derive(Debug, Clone)]
pub(super) enum Behavior {
    Succeed { score: u16, confidence: f64 },
    /// Transport failure on the first `failures` calls, success afterwards.
    Flaky {
        failures: u32,
        score: u16,
        confidence: f64,
    },
    Hang,
    Reject,
}

pub(super) struct ScriptedPort {
    behaviors: [Behavior; 3],
    calls: [AtomicU32; 3],
}

impl ScriptedPort {
    pub(super) fn new(financial: Behavior, reputational: Behavior, behavioral: Behavior) -> Self {
        Self {
            behaviors: [financial, reputational, behavioral],
            calls: Default::default(),
        }
    }

    pub(super) fn healthy() -> Self {
        Self::new(
            Behavior::Succeed {
                score: 900,
                confidence: 1.0,
            },
            Behavior::Succeed {
                score: 800,
                confidence: 1.0,
            },
            Behavior::Succeed {
                score: 850,
                confidence: 1.0,
            },
        )
    }

    pub(super) fn calls(&self, agent: AgentKind) -> u32 {
        self.calls[agent.slot()].load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AnalysisPort for ScriptedPort {
    async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalysisError> {
        let agent = request.kind;
        let call = self.calls[agent.slot()].fetch_add(1, Ordering::SeqCst) + 1;
        match &self.behaviors[agent.slot()] {
            Behavior::Succeed { score, confidence } => Ok(result(agent, *score, *confidence)),
            Behavior::Flaky {
                failures,
                score,
                confidence,
            } => {
                if call <= *failures {
                    Err(AnalysisError::Transport {
                        agent,
                        message: "connection reset".to_string(),
                    })
                } else {
                    Ok(result(agent, *score, *confidence))
                }
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(result(agent, 500, 1.0))
            }
            Behavior::Reject => Err(AnalysisError::RejectedInput {
                agent,
                reason: "prompt injection detected".to_string(),
            }),
        }
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryRecords {
    evaluations: Arc<Mutex<Vec<EvaluationRecord>>>,
    simulations: Arc<Mutex<Vec<SimulationRecord>>>,
}

impl MemoryRecords {
    pub(super) fn evaluations(&self) -> Vec<EvaluationRecord> {
        self.evaluations.lock().expect("record mutex poisoned").clone()
    }

    pub(super) fn simulations(&self) -> Vec<SimulationRecord> {
        self.simulations.lock().expect("record mutex poisoned").clone()
    }
}

impl RecordPublisher for MemoryRecords {
    fn publish_evaluation(&self, record: EvaluationRecord) -> Result<(), RecordError> {
        self.evaluations
            .lock()
            .expect("record mutex poisoned")
            .push(record);
        Ok(())
    }

    fn publish_simulation(&self, record: SimulationRecord) -> Result<(), RecordError> {
        self.simulations
            .lock()
            .expect("record mutex poisoned")
            .push(record);
        Ok(())
    }
}

pub(super) struct UnavailableRecords;

impl RecordPublisher for UnavailableRecords {
    fn publish_evaluation(&self, _record: EvaluationRecord) -> Result<(), RecordError> {
        Err(RecordError::Unavailable("archive offline".to_string()))
    }

    fn publish_simulation(&self, _record: SimulationRecord) -> Result<(), RecordError> {
        Err(RecordError::Unavailable("archive offline".to_string()))
    }
}

pub(super) struct Harness {
    pub(super) orchestrator: WorkflowOrchestrator,
    pub(super) port: Arc<ScriptedPort>,
    pub(super) records: MemoryRecords,
    pub(super) telemetry: Arc<Telemetry>,
}

pub(super) fn harness(port: ScriptedPort) -> Harness {
    let port = Arc::new(port);
    let records = MemoryRecords::default();
    let telemetry = Arc::new(Telemetry::default());
    let orchestrator = WorkflowOrchestrator::new(
        Arc::new(EvaluationStateStore::default()),
        port.clone(),
        scoring_engine(),
        telemetry.clone(),
        Arc::new(records.clone()),
        fast_settings(),
    );
    Harness {
        orchestrator,
        port,
        records,
        telemetry,
    }
}

pub(super) fn build_service(
    port: ScriptedPort,
) -> (Arc<CreditRiskService<MemoryRecords>>, Arc<MemoryRecords>) {
    let records = Arc::new(MemoryRecords::default());
    let service = CreditRiskService::new(
        Arc::new(port),
        records.clone(),
        scoring_engine(),
        fast_settings(),
        Arc::new(Telemetry::default()),
    );
    (Arc::new(service), records)
}

pub(super) async fn json_body(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    let value = serde_json::from_slice(&bytes).expect("json body");
    (status, value)
}
