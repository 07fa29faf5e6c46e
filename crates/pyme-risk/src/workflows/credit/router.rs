use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{CompanyData, EvaluationId, ScenarioId};
use super::orchestrator::OrchestratorError;
use super::records::RecordPublisher;
use super::scenario::ScenarioError;
use super::service::{CreditRiskService, CreditServiceError};

/// Router builder exposing evaluation, scenario, and telemetry endpoints.
pub fn credit_router<P>(service: Arc<CreditRiskService<P>>) -> Router
where
    P: RecordPublisher + 'static,
{
    Router::new()
        .route("/api/v1/evaluations", post(start_handler::<P>))
        .route("/api/v1/evaluations/:evaluation_id", get(status_handler::<P>))
        .route(
            "/api/v1/evaluations/:evaluation_id/cancel",
            post(cancel_handler::<P>),
        )
        .route(
            "/api/v1/evaluations/:evaluation_id/variables",
            get(variables_handler::<P>),
        )
        .route(
            "/api/v1/evaluations/:evaluation_id/scenarios",
            post(create_scenario_handler::<P>),
        )
        .route(
            "/api/v1/scenarios/:scenario_id/simulate",
            post(simulate_handler::<P>),
        )
        .route("/api/v1/scenarios/compare", post(compare_handler::<P>))
        .route(
            "/api/v1/evaluations/:evaluation_id/audit",
            get(audit_trail_handler::<P>),
        )
        .route("/api/v1/audit", get(recent_audit_handler::<P>))
        .route("/api/v1/telemetry", get(telemetry_handler::<P>))
        .with_state(service)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ScenarioRequest {
    #[serde(default)]
    changes: BTreeMap<String, f64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CompareRequest {
    scenario_ids: Vec<ScenarioId>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentAuditQuery {
    limit: Option<usize>,
}

const DEFAULT_AUDIT_LIMIT: usize = 100;

pub(crate) async fn start_handler<P>(
    State(service): State<Arc<CreditRiskService<P>>>,
    axum::Json(company): axum::Json<CompanyData>,
) -> Response
where
    P: RecordPublisher + 'static,
{
    match service.start_evaluation(company) {
        Ok(state) => (StatusCode::ACCEPTED, axum::Json(state.status_view())).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn status_handler<P>(
    State(service): State<Arc<CreditRiskService<P>>>,
    Path(evaluation_id): Path<String>,
) -> Response
where
    P: RecordPublisher + 'static,
{
    match service.evaluation(&EvaluationId(evaluation_id)) {
        Ok(state) => (StatusCode::OK, axum::Json(state.status_view())).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn cancel_handler<P>(
    State(service): State<Arc<CreditRiskService<P>>>,
    Path(evaluation_id): Path<String>,
) -> Response
where
    P: RecordPublisher + 'static,
{
    match service.cancel_evaluation(&EvaluationId(evaluation_id)) {
        Ok(state) => (StatusCode::OK, axum::Json(state.status_view())).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn audit_trail_handler<P>(
    State(service): State<Arc<CreditRiskService<P>>>,
    Path(evaluation_id): Path<String>,
) -> Response
where
    P: RecordPublisher + 'static,
{
    let id = EvaluationId(evaluation_id);
    match service.audit_trail(&id) {
        Ok(events) => {
            let payload = json!({
                "evaluation_id": id,
                "events": events,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(other) => error_response(other),
    }
}

pub(crate) async fn recent_audit_handler<P>(
    State(service): State<Arc<CreditRiskService<P>>>,
    Query(query): Query<RecentAuditQuery>,
) -> Response
where
    P: RecordPublisher + 'static,
{
    let limit = query.limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
    let events = service.recent_audit_events(limit);
    (StatusCode::OK, axum::Json(json!({ "events": events }))).into_response()
}

pub(crate) async fn variables_handler<P>(
    State(service): State<Arc<CreditRiskService<P>>>,
    Path(evaluation_id): Path<String>,
) -> Response
where
    P: RecordPublisher + 'static,
{
    let id = EvaluationId(evaluation_id);
    match service.modifiable_variables(&id) {
        Ok(variables) => {
            let payload = json!({
                "evaluation_id": id,
                "variables": variables,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(other) => error_response(other),
    }
}

pub(crate) async fn create_scenario_handler<P>(
    State(service): State<Arc<CreditRiskService<P>>>,
    Path(evaluation_id): Path<String>,
    axum::Json(request): axum::Json<ScenarioRequest>,
) -> Response
where
    P: RecordPublisher + 'static,
{
    match service.create_scenario(&EvaluationId(evaluation_id), request.changes) {
        Ok(scenario) => {
            let payload = json!({
                "scenario_id": scenario.scenario_id,
                "evaluation_id": scenario.evaluation_id,
                "overrides": scenario.overrides,
                "has_baseline": scenario.baseline.is_some(),
                "created_at": scenario.created_at,
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(other) => error_response(other),
    }
}

pub(crate) async fn simulate_handler<P>(
    State(service): State<Arc<CreditRiskService<P>>>,
    Path(scenario_id): Path<String>,
) -> Response
where
    P: RecordPublisher + 'static,
{
    match service.simulate(&ScenarioId(scenario_id)) {
        Ok(result) => (StatusCode::OK, axum::Json(&*result)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn compare_handler<P>(
    State(service): State<Arc<CreditRiskService<P>>>,
    axum::Json(request): axum::Json<CompareRequest>,
) -> Response
where
    P: RecordPublisher + 'static,
{
    match service.compare(&request.scenario_ids) {
        Ok(comparison) => (StatusCode::OK, axum::Json(comparison)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn telemetry_handler<P>(
    State(service): State<Arc<CreditRiskService<P>>>,
) -> Response
where
    P: RecordPublisher + 'static,
{
    (StatusCode::OK, axum::Json(service.telemetry())).into_response()
}

fn error_response(error: CreditServiceError) -> Response {
    let (status, payload) = match &error {
        CreditServiceError::Orchestrator(OrchestratorError::Validation(validation)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": error.to_string(),
                "evaluation_id": validation.evaluation_id,
                "issues": validation.issues,
            }),
        ),
        CreditServiceError::Orchestrator(OrchestratorError::NotFound(_))
        | CreditServiceError::Scenario(ScenarioError::NotFound(_)) => (
            StatusCode::NOT_FOUND,
            json!({ "error": error.to_string() }),
        ),
        CreditServiceError::Orchestrator(OrchestratorError::AlreadyTerminal(_))
        | CreditServiceError::Orchestrator(OrchestratorError::Conflict(_)) => (
            StatusCode::CONFLICT,
            json!({ "error": error.to_string() }),
        ),
        CreditServiceError::Scenario(ScenarioError::Invalid { outcome, .. }) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({
                "error": error.to_string(),
                "viability": outcome,
            }),
        ),
        CreditServiceError::Scenario(ScenarioError::EmptyComparison) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": error.to_string() }),
        ),
        CreditServiceError::Orchestrator(OrchestratorError::Transition(_)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": error.to_string() }),
        ),
    };
    (status, axum::Json(payload)).into_response()
}
