use super::common::*;

use std::collections::BTreeMap;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::workflows::credit::credit_router;
use crate::workflows::credit::domain::EvaluationId;
use crate::workflows::credit::router::{cancel_handler, status_handler};

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("serializable")))
        .expect("request builds")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request builds")
}

#[tokio::test]
async fn start_route_accepts_company_payloads() {
    let (service, _) = build_service(ScriptedPort::healthy());
    let router = credit_router(service);

    let response = router
        .oneshot(post_json(
            "/api/v1/evaluations",
            serde_json::to_value(company("r01")).expect("company serializes"),
        ))
        .await
        .expect("route executes");

    let (status, payload) = json_body(response).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(payload
        .get("evaluation_id")
        .and_then(Value::as_str)
        .is_some_and(|id| id.starts_with("eval-")));
    assert_eq!(payload.get("company_id"), Some(&json!("pyme-r01")));
}

#[tokio::test]
async fn start_route_rejects_invalid_input() {
    let (service, _) = build_service(ScriptedPort::healthy());
    let router = credit_router(service);

    let response = router
        .oneshot(post_json(
            "/api/v1/evaluations",
            json!({ "company_id": "", "company_name": "Sin Nombre" }),
        ))
        .await
        .expect("route executes");

    let (status, payload) = json_body(response).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let issues = payload
        .get("issues")
        .and_then(Value::as_array)
        .expect("issues listed");
    assert_eq!(issues.len(), 1);
    assert!(issues[0].as_str().unwrap_or_default().contains("company_id"));
}

#[tokio::test]
async fn status_handler_reports_completed_evaluation() {
    let (service, records) = build_service(ScriptedPort::healthy());
    let state = service
        .start_evaluation(company("r02"))
        .expect("evaluation starts");
    service
        .await_evaluation(&state.evaluation_id)
        .await
        .expect("evaluation exists");

    let response = status_handler::<MemoryRecords>(
        State(service.clone()),
        Path(state.evaluation_id.0.clone()),
    )
    .await;

    let (status, payload) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload.get("status"), Some(&json!("Completed")));
    assert_eq!(payload.get("final_score"), Some(&json!(870)));
    assert_eq!(payload.get("risk_tier"), Some(&json!("Low risk")));
    assert_eq!(records.evaluations().len(), 1);
}

#[tokio::test]
async fn unknown_ids_return_not_found() {
    let (service, _) = build_service(ScriptedPort::healthy());

    let response =
        status_handler::<MemoryRecords>(State(service.clone()), Path("eval-nope".to_string()))
            .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = credit_router(service)
        .oneshot(post_json("/api/v1/scenarios/scn-nope/simulate", json!({})))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancelling_a_finished_evaluation_conflicts() {
    let (service, _) = build_service(ScriptedPort::healthy());
    let state = service
        .start_evaluation(company("r03"))
        .expect("evaluation starts");
    service
        .await_evaluation(&state.evaluation_id)
        .await
        .expect("evaluation exists");

    let response =
        cancel_handler::<MemoryRecords>(State(service), Path(state.evaluation_id.0.clone()))
            .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn scenario_routes_simulate_and_compare() {
    let (service, records) = build_service(ScriptedPort::healthy());
    let state = service
        .start_evaluation(company("r04"))
        .expect("evaluation starts");
    let evaluation_id = state.evaluation_id.0.clone();
    service
        .await_evaluation(&state.evaluation_id)
        .await
        .expect("evaluation exists");
    let router = credit_router(service);

    let response = router
        .clone()
        .oneshot(get(&format!("/api/v1/evaluations/{evaluation_id}/variables")))
        .await
        .expect("route executes");
    let (status, payload) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert!(
        payload
            .get("variables")
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or_default()
            >= 10
    );

    let mut scenario_ids = Vec::new();
    for changes in [
        json!({ "monthly_sales": 60_000.0 }),
        json!({ "defaults_last_year": 2.0, "average_days_late": 45.0 }),
    ] {
        let response = router
            .clone()
            .oneshot(post_json(
                &format!("/api/v1/evaluations/{evaluation_id}/scenarios"),
                json!({ "changes": changes }),
            ))
            .await
            .expect("route executes");
        let (status, payload) = json_body(response).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(payload.get("has_baseline"), Some(&json!(true)));
        scenario_ids.push(
            payload
                .get("scenario_id")
                .and_then(Value::as_str)
                .expect("scenario id")
                .to_string(),
        );
    }

    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/scenarios/{}/simulate", scenario_ids[0]),
            json!({}),
        ))
        .await
        .expect("route executes");
    let (status, payload) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        payload.pointer("/original/final_score"),
        Some(&json!(870)),
        "baseline comes from the evaluation"
    );
    assert!(
        payload
            .pointer("/simulated/final_score")
            .and_then(Value::as_u64)
            .expect("simulated score")
            >= 870
    );

    let response = router
        .oneshot(post_json(
            "/api/v1/scenarios/compare",
            json!({ "scenario_ids": scenario_ids }),
        ))
        .await
        .expect("route executes");
    let (status, payload) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload.get("best"), Some(&json!(scenario_ids[0])));
    assert_eq!(payload.get("worst"), Some(&json!(scenario_ids[1])));
    assert_eq!(records.simulations().len(), 2);
}

#[tokio::test]
async fn non_viable_scenario_returns_viability_outcome() {
    let (service, _) = build_service(ScriptedPort::healthy());
    let state = service
        .start_evaluation(company("r05"))
        .expect("evaluation starts");
    service
        .await_evaluation(&state.evaluation_id)
        .await
        .expect("evaluation exists");
    let scenario = service
        .create_scenario(
            &EvaluationId(state.evaluation_id.0.clone()),
            BTreeMap::from([("monthly_sales".to_string(), -500.0)]),
        )
        .expect("scenario created without validation");

    let response = credit_router(service)
        .oneshot(post_json(
            &format!("/api/v1/scenarios/{}/simulate", scenario.scenario_id),
            json!({}),
        ))
        .await
        .expect("route executes");
    let (status, payload) = json_body(response).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(payload.pointer("/viability/viable"), Some(&json!(false)));
    assert_eq!(
        payload.pointer("/viability/issues/0/variable"),
        Some(&json!("monthly_sales"))
    );
}

#[tokio::test]
async fn empty_comparison_is_unprocessable() {
    let (service, _) = build_service(ScriptedPort::healthy());
    let response = credit_router(service)
        .oneshot(post_json(
            "/api/v1/scenarios/compare",
            json!({ "scenario_ids": [] }),
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn telemetry_route_reports_counters() {
    let (service, _) = build_service(ScriptedPort::healthy());
    let state = service
        .start_evaluation(company("r06"))
        .expect("evaluation starts");
    service
        .await_evaluation(&state.evaluation_id)
        .await
        .expect("evaluation exists");

    let response = credit_router(service)
        .oneshot(get("/api/v1/telemetry"))
        .await
        .expect("route executes");
    let (status, payload) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload.get("evaluations_completed"), Some(&json!(1)));
    assert_eq!(payload.get("agent_calls"), Some(&json!(3)));
}

#[tokio::test]
async fn audit_routes_list_evaluation_history() {
    let (service, _) = build_service(ScriptedPort::healthy());
    let state = service
        .start_evaluation(company("r07"))
        .expect("evaluation starts");
    let evaluation_id = state.evaluation_id.0.clone();
    service
        .await_evaluation(&state.evaluation_id)
        .await
        .expect("evaluation exists");
    let router = credit_router(service);

    let response = router
        .clone()
        .oneshot(get(&format!("/api/v1/evaluations/{evaluation_id}/audit")))
        .await
        .expect("route executes");
    let (status, payload) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payload.get("evaluation_id"), Some(&json!(evaluation_id)));
    let events = payload
        .get("events")
        .and_then(Value::as_array)
        .expect("events listed");
    assert_eq!(events[0].get("phase"), Some(&json!("pending")));
    assert_eq!(
        events.last().and_then(|event| event.get("phase")),
        Some(&json!("completed"))
    );
    assert_eq!(
        events
            .iter()
            .filter(|event| event.get("action") == Some(&json!("agent_succeeded")))
            .count(),
        3
    );

    let response = router
        .clone()
        .oneshot(get("/api/v1/evaluations/eval-nope/audit"))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = router
        .clone()
        .oneshot(get("/api/v1/audit?limit=2"))
        .await
        .expect("route executes");
    let (status, payload) = json_body(response).await;
    assert_eq!(status, StatusCode::OK);
    let events = payload
        .get("events")
        .and_then(Value::as_array)
        .expect("events listed");
    assert_eq!(events.len(), 2);

    let response = router
        .oneshot(get("/api/v1/telemetry"))
        .await
        .expect("route executes");
    let (_, payload) = json_body(response).await;
    assert_eq!(
        payload.get("total_tokens_used"),
        Some(&json!(3 * TOKENS_PER_CALL))
    );
}
