use crate::cli::ServeArgs;
use crate::infra::{build_credit_service, AppState, InMemoryRecordArchive};
use crate::routes::with_credit_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use pyme_risk::config::AppConfig;
use pyme_risk::error::AppError;
use pyme_risk::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    // Invalid weights or bands stop startup here.
    let archive = Arc::new(InMemoryRecordArchive::default());
    let credit_service = build_credit_service(&config.credit, archive)?;

    let app = with_credit_routes(credit_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        agent_timeout_ms = config.credit.evaluation.agent_timeout.as_millis() as u64,
        "pyme credit risk service ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
