use crate::cli::ServeArgs;
use crate::infra::{build_rule_store, AppState};
use crate::routes::with_compliance_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use call_compliance::compliance::{CallComplianceService, TracingNotificationSink};
use call_compliance::config::AppConfig;
use call_compliance::error::AppError;
use call_compliance::telemetry;
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
    if let Some(rules) = args.rules.take() {
        config.rules.path = Some(rules);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(build_rule_store(
        config.rules.path.as_deref(),
        config.engine.rule_cache_ttl,
    )?);
    let service = Arc::new(CallComplianceService::new(
        store,
        Arc::new(TracingNotificationSink),
        config.engine,
    ));

    let app = with_compliance_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        fault_policy = %config.engine.fault_policy,
        cache_ttl_secs = config.engine.rule_cache_ttl.as_secs(),
        "call compliance engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
