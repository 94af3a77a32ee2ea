use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

/// Sessions older than this are dropped by the retention sweep.
pub const SESSION_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(format!("mig-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    PublisherMigration,
    Validation,
    Rollback,
    Invitations,
}

impl SessionKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PublisherMigration => "Publisher migration",
            Self::Validation => "Validation",
            Self::Rollback => "Rollback",
            Self::Invitations => "Invitations",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPhase {
    Validation,
    Snapshot,
    Analysis,
    LightValidation,
    ShadowPublishers,
    Offerings,
    Relationships,
    Performance,
    Rollback,
    Invitations,
}

impl MigrationPhase {
    /// Phases the migrator itself runs, in order.
    pub const MIGRATOR: [Self; 6] = [
        Self::Analysis,
        Self::LightValidation,
        Self::ShadowPublishers,
        Self::Offerings,
        Self::Relationships,
        Self::Performance,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Validation => "Pre-migration validation",
            Self::Snapshot => "Rollback snapshot",
            Self::Analysis => "Analyze legacy contacts",
            Self::LightValidation => "Validate mappings",
            Self::ShadowPublishers => "Create shadow publishers",
            Self::Offerings => "Create draft offerings",
            Self::Relationships => "Create relationships",
            Self::Performance => "Migrate performance data",
            Self::Rollback => "Rollback",
            Self::Invitations => "Send invitations",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    Running,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Error,
}

impl SessionStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEntry {
    pub phase: MigrationPhase,
    pub status: PhaseStatus,
    pub message: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationSession {
    pub id: SessionId,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub total_steps: u32,
    pub completed_steps: u32,
    pub current_phase: Option<MigrationPhase>,
    pub phases: Vec<PhaseEntry>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MigrationSession {
    pub fn progress_percent(&self) -> u8 {
        if self.total_steps == 0 {
            return if self.status == SessionStatus::Completed {
                100
            } else {
                0
            };
        }
        let pct = (u64::from(self.completed_steps) * 100) / u64::from(self.total_steps);
        pct.min(100) as u8
    }

    pub fn phase(&self, phase: MigrationPhase) -> Option<&PhaseEntry> {
        self.phases.iter().find(|entry| entry.phase == phase)
    }
}

/// Persistence seam for sessions. Upserts replace the whole session keyed by id.
pub trait SessionStore: Send + Sync {
    fn upsert(&self, session: MigrationSession) -> Result<(), StatusError>;
    fn get(&self, id: &SessionId) -> Result<Option<MigrationSession>, StatusError>;
    fn list(&self) -> Result<Vec<MigrationSession>, StatusError>;
    fn remove(&self, id: &SessionId) -> Result<(), StatusError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<SessionId, MigrationSession>>>,
}

impl InMemorySessionStore {
    fn guard(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<SessionId, MigrationSession>>, StatusError> {
        self.sessions
            .lock()
            .map_err(|_| StatusError::Store("session mutex poisoned".to_string()))
    }
}

impl SessionStore for InMemorySessionStore {
    fn upsert(&self, session: MigrationSession) -> Result<(), StatusError> {
        self.guard()?.insert(session.id.clone(), session);
        Ok(())
    }

    fn get(&self, id: &SessionId) -> Result<Option<MigrationSession>, StatusError> {
        Ok(self.guard()?.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<MigrationSession>, StatusError> {
        let mut sessions: Vec<_> = self.guard()?.values().cloned().collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        Ok(sessions)
    }

    fn remove(&self, id: &SessionId) -> Result<(), StatusError> {
        self.guard()?.remove(id);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StatusError {
    #[error("session {0} not found")]
    SessionNotFound(SessionId),
    #[error("session {0} already finished")]
    SessionFinished(SessionId),
    #[error("session store unavailable: {0}")]
    Store(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct RunningSessionView {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub status: SessionStatus,
    pub current_phase: Option<MigrationPhase>,
    pub progress: u8,
    pub phases: Vec<PhaseEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionErrorView {
    pub session_id: SessionId,
    pub kind: SessionKind,
    pub phase: Option<MigrationPhase>,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OverallStatus {
    pub running: Vec<RunningSessionView>,
    pub recent_errors: Vec<SessionErrorView>,
    pub retained_sessions: usize,
}

/// Advisory ledger of migration sessions and their phases. Never the source of truth for
/// what was migrated; a restart loses it.
pub struct StatusTracker {
    store: Arc<dyn SessionStore>,
}

impl Default for StatusTracker {
    fn default() -> Self {
        Self::new(Arc::new(InMemorySessionStore::default()))
    }
}

impl StatusTracker {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    pub fn start_session(
        &self,
        kind: SessionKind,
        total_steps: u32,
    ) -> Result<SessionId, StatusError> {
        let now = Utc::now();
        let id = SessionId::generate();
        self.store.upsert(MigrationSession {
            id: id.clone(),
            kind,
            status: SessionStatus::Pending,
            total_steps,
            completed_steps: 0,
            current_phase: None,
            phases: Vec::new(),
            started_at: now,
            updated_at: now,
            completed_at: None,
            results: None,
            error: None,
        })?;
        info!(session_id = %id, kind = kind.label(), total_steps, "migration session started");
        Ok(id)
    }

    pub fn update_phase(
        &self,
        session_id: &SessionId,
        phase: MigrationPhase,
        status: PhaseStatus,
        message: impl Into<String>,
        progress: u8,
        data: Option<Value>,
    ) -> Result<MigrationSession, StatusError> {
        let mut session = self.load_open(session_id)?;
        let now = Utc::now();

        session.phases.retain(|entry| entry.phase != phase);
        session.phases.push(PhaseEntry {
            phase,
            status,
            message: message.into(),
            progress: progress.min(100),
            data,
            updated_at: now,
        });
        session.current_phase = Some(phase);
        session.status = SessionStatus::Running;
        session.completed_steps = session
            .phases
            .iter()
            .filter(|entry| entry.status == PhaseStatus::Completed)
            .count() as u32;
        session.updated_at = now;

        debug!(session_id = %session_id, phase = phase.label(), ?status, progress, "phase updated");
        self.store.upsert(session.clone())?;
        Ok(session)
    }

    pub fn complete_session(
        &self,
        session_id: &SessionId,
        results: Option<Value>,
        error: Option<String>,
    ) -> Result<MigrationSession, StatusError> {
        let mut session = self.load_open(session_id)?;
        let now = Utc::now();

        session.status = if error.is_some() {
            SessionStatus::Error
        } else {
            SessionStatus::Completed
        };
        session.results = results;
        session.error = error;
        session.completed_at = Some(now);
        session.updated_at = now;

        info!(session_id = %session_id, status = ?session.status, "migration session finished");
        self.store.upsert(session.clone())?;
        Ok(session)
    }

    pub fn session(&self, session_id: &SessionId) -> Result<MigrationSession, StatusError> {
        self.store
            .get(session_id)?
            .ok_or_else(|| StatusError::SessionNotFound(session_id.clone()))
    }

    pub fn overall_status(&self) -> Result<OverallStatus, StatusError> {
        let sessions = self.store.list()?;

        let running = sessions
            .iter()
            .filter(|session| !session.status.is_terminal())
            .map(|session| RunningSessionView {
                session_id: session.id.clone(),
                kind: session.kind,
                status: session.status,
                current_phase: session.current_phase,
                progress: session.progress_percent(),
                phases: session.phases.clone(),
            })
            .collect();

        let recent_errors = sessions
            .iter()
            .filter(|session| session.status == SessionStatus::Error)
            .filter_map(|session| {
                session.error.as_ref().map(|message| SessionErrorView {
                    session_id: session.id.clone(),
                    kind: session.kind,
                    phase: session.current_phase,
                    message: message.clone(),
                    at: session.completed_at.unwrap_or(session.updated_at),
                })
            })
            .collect();

        Ok(OverallStatus {
            running,
            recent_errors,
            retained_sessions: sessions.len(),
        })
    }

    /// Drop sessions started more than [`SESSION_RETENTION_DAYS`] before `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, StatusError> {
        let cutoff = now - Duration::days(SESSION_RETENTION_DAYS);
        let mut purged = 0;
        for session in self.store.list()? {
            if session.started_at < cutoff {
                self.store.remove(&session.id)?;
                purged += 1;
            }
        }
        if purged > 0 {
            info!(purged, "expired migration sessions purged");
        }
        Ok(purged)
    }

    fn load_open(&self, session_id: &SessionId) -> Result<MigrationSession, StatusError> {
        let session = self.session(session_id)?;
        if session.status.is_terminal() {
            return Err(StatusError::SessionFinished(session_id.clone()));
        }
        Ok(session)
    }
}

/// Periodically purge expired sessions for the lifetime of the process.
pub fn spawn_retention_sweep(
    tracker: Arc<StatusTracker>,
    every: StdDuration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(err) = tracker.purge_expired(Utc::now()) {
                tracing::warn!(error = %err, "session retention sweep failed");
            }
        }
    })
}
