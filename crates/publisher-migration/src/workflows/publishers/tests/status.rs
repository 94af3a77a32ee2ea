use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use crate::workflows::publishers::status::{
    InMemorySessionStore, MigrationPhase, PhaseStatus, SessionId, SessionKind, SessionStatus,
    SessionStore, StatusError, StatusTracker,
};

#[test]
fn session_moves_from_pending_to_completed() {
    let tracker = StatusTracker::default();
    let id = tracker
        .start_session(SessionKind::PublisherMigration, 6)
        .expect("session starts");
    assert_eq!(
        tracker.session(&id).expect("session").status,
        SessionStatus::Pending
    );

    let session = tracker
        .update_phase(
            &id,
            MigrationPhase::Analysis,
            PhaseStatus::Running,
            "analyzing",
            0,
            None,
        )
        .expect("phase update");
    assert_eq!(session.status, SessionStatus::Running);
    assert_eq!(session.current_phase, Some(MigrationPhase::Analysis));

    let finished = tracker
        .complete_session(&id, Some(json!({ "created": 3 })), None)
        .expect("completes");
    assert_eq!(finished.status, SessionStatus::Completed);
    assert!(finished.completed_at.is_some());
    assert_eq!(finished.results, Some(json!({ "created": 3 })));

    let err = tracker
        .update_phase(
            &id,
            MigrationPhase::Offerings,
            PhaseStatus::Running,
            "late",
            0,
            None,
        )
        .expect_err("finished sessions are frozen");
    assert!(matches!(err, StatusError::SessionFinished(_)));
}

#[test]
fn phase_updates_replace_and_count_completed_steps() {
    let tracker = StatusTracker::default();
    let id = tracker
        .start_session(SessionKind::PublisherMigration, 4)
        .expect("session starts");

    tracker
        .update_phase(
            &id,
            MigrationPhase::Analysis,
            PhaseStatus::Running,
            "start",
            10,
            None,
        )
        .expect("running");
    let session = tracker
        .update_phase(
            &id,
            MigrationPhase::Analysis,
            PhaseStatus::Completed,
            "done",
            100,
            Some(json!({ "mappings": 3 })),
        )
        .expect("completed");

    assert_eq!(session.phases.len(), 1);
    let entry = session
        .phase(MigrationPhase::Analysis)
        .expect("analysis entry");
    assert_eq!(entry.status, PhaseStatus::Completed);
    assert_eq!(entry.message, "done");
    assert_eq!(session.completed_steps, 1);
    assert_eq!(session.progress_percent(), 25);

    let clamped = tracker
        .update_phase(
            &id,
            MigrationPhase::LightValidation,
            PhaseStatus::Running,
            "over",
            250,
            None,
        )
        .expect("running");
    assert_eq!(
        clamped
            .phase(MigrationPhase::LightValidation)
            .expect("entry")
            .progress,
        100
    );
}

#[test]
fn overall_status_lists_running_sessions_and_errors() {
    let tracker = StatusTracker::default();
    let running = tracker
        .start_session(SessionKind::PublisherMigration, 6)
        .expect("session starts");
    tracker
        .update_phase(
            &running,
            MigrationPhase::ShadowPublishers,
            PhaseStatus::Running,
            "creating",
            40,
            None,
        )
        .expect("phase update");

    let failed = tracker
        .start_session(SessionKind::Rollback, 1)
        .expect("session starts");
    tracker
        .update_phase(
            &failed,
            MigrationPhase::Rollback,
            PhaseStatus::Error,
            "store offline",
            0,
            None,
        )
        .expect("phase update");
    tracker
        .complete_session(&failed, None, Some("store offline".to_string()))
        .expect("fails");

    let overview = tracker.overall_status().expect("overview");
    assert_eq!(overview.retained_sessions, 2);
    assert_eq!(overview.running.len(), 1);
    assert_eq!(overview.running[0].session_id, running);
    assert_eq!(
        overview.running[0].current_phase,
        Some(MigrationPhase::ShadowPublishers)
    );
    assert_eq!(overview.recent_errors.len(), 1);
    assert_eq!(overview.recent_errors[0].session_id, failed);
    assert_eq!(overview.recent_errors[0].phase, Some(MigrationPhase::Rollback));
    assert_eq!(overview.recent_errors[0].message, "store offline");
}

#[test]
fn sessions_older_than_retention_are_purged() {
    let store = Arc::new(InMemorySessionStore::default());
    let tracker = StatusTracker::new(store.clone());
    let fresh = tracker
        .start_session(SessionKind::Validation, 1)
        .expect("session starts");
    let stale = tracker
        .start_session(SessionKind::PublisherMigration, 6)
        .expect("session starts");

    let mut aged = tracker.session(&stale).expect("session");
    aged.started_at = Utc::now() - Duration::days(8);
    store.upsert(aged).expect("backdate");

    let purged = tracker.purge_expired(Utc::now()).expect("purge runs");
    assert_eq!(purged, 1);
    assert!(tracker.session(&fresh).is_ok());
    assert!(matches!(
        tracker.session(&stale),
        Err(StatusError::SessionNotFound(_))
    ));
}

#[test]
fn zero_step_sessions_report_full_progress_once_completed() {
    let tracker = StatusTracker::default();
    let id = tracker
        .start_session(SessionKind::Invitations, 0)
        .expect("session starts");
    assert_eq!(tracker.session(&id).expect("session").progress_percent(), 0);

    let done = tracker.complete_session(&id, None, None).expect("completes");
    assert_eq!(done.progress_percent(), 100);
}

#[test]
fn unknown_session_is_not_found() {
    let tracker = StatusTracker::default();
    let err = tracker
        .session(&SessionId("mig-unknown".to_string()))
        .expect_err("missing");
    assert!(matches!(err, StatusError::SessionNotFound(_)));
}
