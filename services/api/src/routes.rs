use crate::infra::{AppState, InMemoryRecordArchive};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use pyme_risk::workflows::credit::{credit_router, CreditRiskService};
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_credit_routes(
    service: Arc<CreditRiskService<InMemoryRecordArchive>>,
) -> axum::Router {
    credit_router(service)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::build_credit_service;
    use axum::body::Body;
    use axum::http::Request;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use pyme_risk::config::CreditConfig;
    use pyme_risk::workflows::credit::EvaluationId;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    fn app() -> (axum::Router, Arc<AtomicBool>, InMemoryRecordArchive) {
        let archive = InMemoryRecordArchive::default();
        let service = build_credit_service(&CreditConfig::default(), Arc::new(archive.clone()))
            .expect("default credit config");
        let readiness = Arc::new(AtomicBool::new(false));
        let state = AppState {
            readiness: readiness.clone(),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        };
        let router = with_credit_routes(service).layer(Extension(state));
        (router, readiness, archive)
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        serde_json::from_slice(&bytes).expect("json body")
    }

    #[tokio::test]
    async fn readiness_tracks_startup_flag() {
        let (router, readiness, _) = app();

        let response = router
            .clone()
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        readiness.store(true, Ordering::Release);
        let response = router
            .oneshot(Request::get("/ready").body(Body::empty()).expect("request"))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({ "status": "ready" }));
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body, json!({ "status": "ok" }));
    }

    #[tokio::test]
    async fn evaluation_submitted_over_http_is_archived() {
        let (router, _, archive) = app();
        let company = json!({
            "company_id": "pyme-http-1",
            "company_name": "Ferreteria El Tornillo",
            "financial": {
                "statements": "estado de resultados anual",
                "monthly_sales": 52000.0,
                "monthly_expenses": 39000.0,
                "total_assets": 240000.0,
                "total_liabilities": 90000.0,
                "current_assets": 70000.0,
                "current_liabilities": 30000.0,
                "sales_growth_rate": 0.05
            },
            "reputational": {
                "social_media": "buena atencion",
                "sentiment_score": 0.4,
                "average_rating": 4.2,
                "review_count": 64,
                "negative_mentions": 5
            },
            "behavioral": {
                "commercial_references": "dos proveedores",
                "payment_history": "pagos puntuales",
                "on_time_payment_ratio": 0.9,
                "average_days_late": 4.0,
                "verified_references": 2,
                "defaults_last_year": 0
            }
        });

        let response = router
            .clone()
            .oneshot(
                Request::post("/api/v1/evaluations")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(company.to_string()))
                    .expect("request"),
            )
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let payload = body_json(response).await;
        let evaluation_id = payload
            .get("evaluation_id")
            .and_then(Value::as_str)
            .expect("evaluation id")
            .to_string();

        let mut status = String::new();
        for _ in 0..100 {
            let response = router
                .clone()
                .oneshot(
                    Request::get(format!("/api/v1/evaluations/{evaluation_id}"))
                        .body(Body::empty())
                        .expect("request"),
                )
                .await
                .expect("route executes");
            let payload = body_json(response).await;
            status = payload
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            if status == "Completed" || status == "Failed" {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(status, "Completed");

        let record = archive
            .evaluation(&EvaluationId(evaluation_id))
            .expect("record archived");
        assert_eq!(record.company_id, "pyme-http-1");
        assert!(record.score.is_some());
        assert_eq!(archive.simulation_count(), 0);
    }
}
