use crate::cli::ServeArgs;
use crate::infra::{build_orchestrator, load_store, AppState};
use crate::routes::with_migration_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use publisher_migration::config::AppConfig;
use publisher_migration::error::AppError;
use publisher_migration::telemetry;
use publisher_migration::workflows::publishers::status::spawn_retention_sweep;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }
    if let Some(csv) = args.legacy_csv.take() {
        config.migration.legacy_csv = Some(csv);
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = load_store(config.migration.legacy_csv.as_deref())?;
    let orchestrator = build_orchestrator(store, &config);
    let _sweep = spawn_retention_sweep(orchestrator.tracker().clone(), RETENTION_SWEEP_INTERVAL);

    let app = with_migration_routes(orchestrator)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "publisher migration service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
