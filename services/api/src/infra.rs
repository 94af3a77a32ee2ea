use metrics_exporter_prometheus::PrometheusHandle;
use publisher_migration::config::AppConfig;
use publisher_migration::error::AppError;
use publisher_migration::workflows::publishers::{
    InMemoryMigrationStore, InMemorySnapshotStore, LegacyExportImporter, MigrationOrchestrator,
    Notifier, OrchestratorSettings, StatusTracker,
};
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

pub(crate) type Orchestrator = MigrationOrchestrator<InMemoryMigrationStore>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Seed a process-local store from a legacy export, or start empty.
pub(crate) fn load_store(csv: Option<&Path>) -> Result<Arc<InMemoryMigrationStore>, AppError> {
    let rows = match csv {
        Some(path) => LegacyExportImporter::from_path(path)?,
        None => Vec::new(),
    };
    Ok(Arc::new(InMemoryMigrationStore::with_legacy(rows)))
}

pub(crate) fn build_orchestrator(
    store: Arc<InMemoryMigrationStore>,
    config: &AppConfig,
) -> Arc<Orchestrator> {
    Arc::new(MigrationOrchestrator::new(
        store,
        Arc::new(StatusTracker::default()),
        Arc::new(Notifier::from_settings(&config.notifications)),
        Arc::new(InMemorySnapshotStore::default()),
        OrchestratorSettings::from_config(&config.migration),
    ))
}

pub(crate) fn parse_batch(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err("batch size must be at least 1".to_string()),
        Ok(size) => Ok(size),
        Err(err) => Err(format!("failed to parse '{raw}' as a batch size ({err})")),
    }
}
