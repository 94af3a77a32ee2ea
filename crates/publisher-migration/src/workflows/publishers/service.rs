use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use super::migrator::{
    MigrationError, MigrationOptions, MigrationStats, PhaseObserver, PhaseSummary,
    PublisherMigrator,
};
use super::notifier::{CompletionSummary, NotificationEvent, Notifier};
use super::repository::MigrationStore;
use super::rollback::{
    EmergencyRollbackReport, RollbackError, RollbackExecution, RollbackPlan,
    RollbackSafetyReport, RollbackService, SnapshotId, SnapshotKind, SnapshotStore,
};
use super::status::{
    MigrationPhase, MigrationSession, OverallStatus, PhaseStatus, SessionId, SessionKind,
    StatusError, StatusTracker,
};
use super::validator::{MigrationValidator, ValidationError, ValidationReport};
use crate::config::MigrationConfig;

/// Phrase an operator must echo back before an emergency purge runs.
pub const EMERGENCY_CONFIRMATION: &str = "PURGE MIGRATION DATA";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MigrationRequest {
    pub dry_run: bool,
    /// Falls back to the configured batch size.
    pub batch_size: Option<usize>,
    pub validate_first: bool,
    /// Capture a pre-migration snapshot; ignored for dry runs.
    pub snapshot: bool,
}

impl Default for MigrationRequest {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: None,
            validate_first: false,
            snapshot: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRunOutcome {
    pub session_id: SessionId,
    pub stats: MigrationStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<SnapshotId>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub default_batch_size: usize,
    pub batch_delay: StdDuration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            default_batch_size: 50,
            batch_delay: StdDuration::ZERO,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &MigrationConfig) -> Self {
        Self {
            default_batch_size: config.batch_size,
            batch_delay: config.batch_delay,
        }
    }
}

/// Error raised by the migration orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum MigrationServiceError {
    #[error("validation found {} blocking errors; live migration refused", .report.error_count)]
    ValidationBlocked {
        session_id: SessionId,
        report: Box<ValidationReport>,
    },
    #[error("emergency rollback requires the confirmation phrase")]
    ConfirmationRequired,
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Rollback(#[from] RollbackError),
    #[error(transparent)]
    Status(#[from] StatusError),
}

/// Composes the validator, migrator, rollback service, status tracker, and notifier.
pub struct MigrationOrchestrator<S> {
    store: Arc<S>,
    tracker: Arc<StatusTracker>,
    notifier: Arc<Notifier>,
    rollback: RollbackService<S>,
    settings: OrchestratorSettings,
}

impl<S> MigrationOrchestrator<S>
where
    S: MigrationStore + 'static,
{
    pub fn new(
        store: Arc<S>,
        tracker: Arc<StatusTracker>,
        notifier: Arc<Notifier>,
        snapshots: Arc<dyn SnapshotStore>,
        settings: OrchestratorSettings,
    ) -> Self {
        let rollback = RollbackService::new(store.clone(), snapshots);
        Self {
            store,
            tracker,
            notifier,
            rollback,
            settings,
        }
    }

    pub fn tracker(&self) -> &Arc<StatusTracker> {
        &self.tracker
    }

    pub fn rollback_service(&self) -> &RollbackService<S> {
        &self.rollback
    }

    /// Validate, snapshot, and migrate in one tracked session.
    pub async fn run(
        &self,
        request: MigrationRequest,
    ) -> Result<MigrationRunOutcome, MigrationServiceError> {
        let take_snapshot = request.snapshot && !request.dry_run;
        let total_steps = MigrationPhase::MIGRATOR.len() as u32
            + u32::from(request.validate_first)
            + u32::from(take_snapshot);
        let kind = SessionKind::PublisherMigration;
        let session_id = self.tracker.start_session(kind, total_steps)?;
        info!(
            session_id = %session_id,
            dry_run = request.dry_run,
            validate_first = request.validate_first,
            snapshot = take_snapshot,
            "migration run requested"
        );
        self.notifier
            .try_notify(&NotificationEvent::SessionStarted {
                session_id: session_id.clone(),
                kind,
                dry_run: request.dry_run,
            })
            .await;

        let validation = if request.validate_first {
            let report = self
                .guard(
                    &session_id,
                    Some(MigrationPhase::Validation),
                    self.validate_phase(&session_id),
                )
                .await?;
            if report.error_count > 0 && !request.dry_run {
                let message = format!(
                    "validation found {} blocking errors; live migration refused",
                    report.error_count
                );
                self.fail_session(&session_id, Some(MigrationPhase::Validation), message)
                    .await;
                return Err(MigrationServiceError::ValidationBlocked {
                    session_id,
                    report: Box::new(report),
                });
            }
            Some(report)
        } else {
            None
        };

        let snapshot_id = if take_snapshot {
            let snapshot = self.guard(&session_id, Some(MigrationPhase::Snapshot), async {
                self.track(
                    &session_id,
                    MigrationPhase::Snapshot,
                    PhaseStatus::Running,
                    "capturing snapshot",
                    0,
                    None,
                );
                let id = self.rollback.create_snapshot(
                    &session_id,
                    SnapshotKind::PreMigration,
                    "Before publisher migration",
                )?;
                self.track(
                    &session_id,
                    MigrationPhase::Snapshot,
                    PhaseStatus::Completed,
                    "snapshot captured",
                    100,
                    Some(json!({ "snapshotId": id })),
                );
                Ok::<_, MigrationServiceError>(id)
            });
            Some(snapshot.await?)
        } else {
            None
        };

        let options = MigrationOptions {
            dry_run: request.dry_run,
            batch_size: request
                .batch_size
                .filter(|size| *size > 0)
                .unwrap_or(self.settings.default_batch_size),
            batch_delay: self.settings.batch_delay,
            as_of: None,
        };
        let observer = TrackerObserver::new(
            self.tracker.clone(),
            self.notifier.clone(),
            session_id.clone(),
        );
        let migrator = PublisherMigrator::new(self.store.clone());
        let stats = match migrator.migrate_observed(&options, &observer).await {
            Ok(stats) => stats,
            Err(err) => {
                self.fail_session(&session_id, observer.current_phase(), err.to_string())
                    .await;
                return Err(err.into());
            }
        };

        self.tracker.complete_session(
            &session_id,
            serde_json::to_value(&stats).ok(),
            None,
        )?;
        self.notifier
            .try_notify(&NotificationEvent::SessionCompleted {
                session_id: session_id.clone(),
                kind,
                summary: CompletionSummary {
                    dry_run: stats.dry_run,
                    duration_ms: stats.duration_ms,
                    publishers_created: stats.shadow_publishers_created,
                    offerings_created: stats.offerings_created,
                    relationships_created: stats.relationships_created,
                    errors: stats.errors.len(),
                },
            })
            .await;

        Ok(MigrationRunOutcome {
            session_id,
            stats,
            validation,
            snapshot_id,
        })
    }

    /// Stand-alone validation run, tracked as its own session.
    pub async fn validate(&self) -> Result<ValidationReport, MigrationServiceError> {
        let session_id = self.tracker.start_session(SessionKind::Validation, 1)?;
        let report = self
            .guard(
                &session_id,
                Some(MigrationPhase::Validation),
                self.validate_phase(&session_id),
            )
            .await?;
        self.tracker.complete_session(
            &session_id,
            serde_json::to_value(&report).ok(),
            None,
        )?;
        Ok(report)
    }

    pub fn status(&self) -> Result<OverallStatus, MigrationServiceError> {
        Ok(self.tracker.overall_status()?)
    }

    pub fn session(
        &self,
        session_id: &SessionId,
    ) -> Result<MigrationSession, MigrationServiceError> {
        Ok(self.tracker.session(session_id)?)
    }

    /// Manual snapshot outside a migration run.
    pub fn create_snapshot(
        &self,
        session_id: Option<SessionId>,
        description: Option<String>,
    ) -> Result<SnapshotId, MigrationServiceError> {
        let session_id = session_id.unwrap_or_else(SessionId::generate);
        let description = description.unwrap_or_else(|| "Manual snapshot".to_string());
        Ok(self
            .rollback
            .create_snapshot(&session_id, SnapshotKind::Manual, description)?)
    }

    pub fn rollback_plan(
        &self,
        snapshot_id: &SnapshotId,
    ) -> Result<RollbackPlan, MigrationServiceError> {
        Ok(self.rollback.create_rollback_plan(snapshot_id)?)
    }

    pub fn rollback_safety(
        &self,
        snapshot_id: &SnapshotId,
    ) -> Result<RollbackSafetyReport, MigrationServiceError> {
        Ok(self.rollback.validate_rollback_safety(snapshot_id)?)
    }

    /// Plan and execute a rollback to `snapshot_id` under a `Rollback` session.
    pub async fn execute_rollback(
        &self,
        snapshot_id: &SnapshotId,
        force: bool,
    ) -> Result<RollbackExecution, MigrationServiceError> {
        let session_id = self.tracker.start_session(SessionKind::Rollback, 1)?;
        self.notifier
            .try_notify(&NotificationEvent::SessionStarted {
                session_id: session_id.clone(),
                kind: SessionKind::Rollback,
                dry_run: false,
            })
            .await;

        let execution = self
            .guard(&session_id, Some(MigrationPhase::Rollback), async {
                self.track(
                    &session_id,
                    MigrationPhase::Rollback,
                    PhaseStatus::Running,
                    "planning rollback",
                    0,
                    None,
                );
                let plan = self.rollback.create_rollback_plan(snapshot_id)?;
                let execution = self.rollback.execute_rollback(&plan, force)?;
                self.track(
                    &session_id,
                    MigrationPhase::Rollback,
                    PhaseStatus::Completed,
                    format!("{} records rolled back", execution.total_succeeded),
                    100,
                    None,
                );
                Ok::<_, MigrationServiceError>(execution)
            })
            .await?;

        self.tracker.complete_session(
            &session_id,
            serde_json::to_value(&execution).ok(),
            None,
        )?;
        Ok(execution)
    }

    pub async fn emergency_rollback(
        &self,
        confirmation: &str,
    ) -> Result<EmergencyRollbackReport, MigrationServiceError> {
        if confirmation != EMERGENCY_CONFIRMATION {
            return Err(MigrationServiceError::ConfirmationRequired);
        }

        let session_id = self.tracker.start_session(SessionKind::Rollback, 1)?;
        let report = self
            .guard(&session_id, Some(MigrationPhase::Rollback), async {
                Ok::<_, MigrationServiceError>(self.rollback.emergency_rollback()?)
            })
            .await?;
        self.track(
            &session_id,
            MigrationPhase::Rollback,
            PhaseStatus::Completed,
            "emergency rollback finished",
            100,
            None,
        );
        self.tracker.complete_session(
            &session_id,
            serde_json::to_value(&report).ok(),
            None,
        )?;
        // Always page on an emergency purge.
        self.notifier
            .try_notify(&NotificationEvent::Error {
                session_id,
                kind: SessionKind::Rollback,
                phase: Some(MigrationPhase::Rollback),
                message: format!(
                    "emergency rollback removed {} publishers, {} offerings, {} relationships",
                    report.publishers_deleted,
                    report.offerings_deleted,
                    report.relationships_deleted
                ),
            })
            .await;
        Ok(report)
    }

    async fn validate_phase(
        &self,
        session_id: &SessionId,
    ) -> Result<ValidationReport, MigrationServiceError> {
        self.track(
            session_id,
            MigrationPhase::Validation,
            PhaseStatus::Running,
            "validating legacy data",
            0,
            None,
        );
        let report = MigrationValidator::new(self.store.clone()).validate_all()?;
        self.track(
            session_id,
            MigrationPhase::Validation,
            PhaseStatus::Completed,
            format!(
                "{} errors, {} warnings, {} info",
                report.error_count, report.warning_count, report.info_count
            ),
            100,
            Some(json!({
                "errorCount": report.error_count,
                "readyForMigration": report.ready_for_migration,
            })),
        );
        Ok(report)
    }

    /// Await `work`; on failure close the session as errored before propagating.
    async fn guard<T, F>(
        &self,
        session_id: &SessionId,
        phase: Option<MigrationPhase>,
        work: F,
    ) -> Result<T, MigrationServiceError>
    where
        F: std::future::Future<Output = Result<T, MigrationServiceError>>,
    {
        match work.await {
            Ok(value) => Ok(value),
            Err(err) => {
                self.fail_session(session_id, phase, err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn fail_session(
        &self,
        session_id: &SessionId,
        phase: Option<MigrationPhase>,
        message: String,
    ) {
        if let Some(phase) = phase {
            self.track(session_id, phase, PhaseStatus::Error, message.clone(), 0, None);
        }
        if let Err(err) = self
            .tracker
            .complete_session(session_id, None, Some(message.clone()))
        {
            warn!(session_id = %session_id, error = %err, "unable to close failed session");
        }
        let kind = self
            .tracker
            .session(session_id)
            .map(|session| session.kind)
            .unwrap_or(SessionKind::PublisherMigration);
        self.notifier
            .try_notify(&NotificationEvent::Error {
                session_id: session_id.clone(),
                kind,
                phase,
                message,
            })
            .await;
    }

    fn track(
        &self,
        session_id: &SessionId,
        phase: MigrationPhase,
        status: PhaseStatus,
        message: impl Into<String>,
        progress: u8,
        data: Option<serde_json::Value>,
    ) {
        if let Err(err) = self
            .tracker
            .update_phase(session_id, phase, status, message, progress, data)
        {
            warn!(
                session_id = %session_id,
                phase = phase.label(),
                error = %err,
                "status update failed"
            );
        }
    }
}

/// Feeds migrator phase events into the tracker and fires milestone notifications.
struct TrackerObserver {
    tracker: Arc<StatusTracker>,
    notifier: Arc<Notifier>,
    session_id: SessionId,
    state: Mutex<ObserverState>,
}

#[derive(Default)]
struct ObserverState {
    current: Option<MigrationPhase>,
    fired: BTreeSet<u8>,
    phase_started_at: Option<Instant>,
}

impl TrackerObserver {
    fn new(tracker: Arc<StatusTracker>, notifier: Arc<Notifier>, session_id: SessionId) -> Self {
        Self {
            tracker,
            notifier,
            session_id,
            state: Mutex::new(ObserverState::default()),
        }
    }

    fn current_phase(&self) -> Option<MigrationPhase> {
        self.state.lock().ok().and_then(|state| state.current)
    }

    /// Thresholds reached by `progress` that have not fired yet. Marks them fired.
    fn crossed(&self, progress: u8) -> Vec<u8> {
        let Ok(mut state) = self.state.lock() else {
            return Vec::new();
        };
        let crossed: Vec<u8> = self
            .notifier
            .milestone_thresholds()
            .iter()
            .copied()
            .filter(|threshold| progress >= *threshold && !state.fired.contains(threshold))
            .collect();
        state.fired.extend(crossed.iter().copied());
        crossed
    }
}

#[async_trait]
impl PhaseObserver for TrackerObserver {
    async fn phase_started(&self, phase: MigrationPhase) {
        if let Ok(mut state) = self.state.lock() {
            state.current = Some(phase);
            state.phase_started_at = Some(Instant::now());
        }
        if let Err(err) = self.tracker.update_phase(
            &self.session_id,
            phase,
            PhaseStatus::Running,
            phase.label(),
            0,
            None,
        ) {
            warn!(session_id = %self.session_id, error = %err, "status update failed");
        }
    }

    async fn phase_finished(&self, phase: MigrationPhase, summary: PhaseSummary) {
        let elapsed_ms = self
            .state
            .lock()
            .ok()
            .and_then(|state| state.phase_started_at)
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or_default();
        let message = format!(
            "{} processed, {} created, {} errors",
            summary.processed, summary.created, summary.errors
        );
        let session = match self.tracker.update_phase(
            &self.session_id,
            phase,
            PhaseStatus::Completed,
            message,
            100,
            Some(json!({
                "processed": summary.processed,
                "created": summary.created,
                "errors": summary.errors,
                "durationMs": elapsed_ms,
            })),
        ) {
            Ok(session) => session,
            Err(err) => {
                warn!(session_id = %self.session_id, error = %err, "status update failed");
                return;
            }
        };

        for progress in self.crossed(session.progress_percent()) {
            self.notifier
                .try_notify(&NotificationEvent::Milestone {
                    session_id: self.session_id.clone(),
                    kind: session.kind,
                    progress,
                    phase,
                })
                .await;
        }
    }
}
