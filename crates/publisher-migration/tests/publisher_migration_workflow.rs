//! End-to-end scenarios for the legacy export migration: CSV import, tracked migration runs,
//! HTTP triggering, and snapshot rollback through the public facade only.

mod common {
    use std::sync::Arc;

    use publisher_migration::workflows::publishers::{
        InMemoryMigrationStore, InMemorySnapshotStore, LegacyExportImporter, MigrationOrchestrator,
        Notifier, OrchestratorSettings, StatusTracker,
    };

    pub(super) const EXPORT: &str = "\
website_id,domain,contact_email,contact_name,guest_post_cost,avg_response_time_hours,success_rate_percentage,last_activity
w-100,techdaily.io,editor@techdaily.io,Tech Daily,120,18,92,2025-05-20
w-101,gadgets.techdaily.io,EDITOR@techdaily.io,Tech Daily,80,,,
w-102,gardenlife.com,hello@gardenlife.com,Garden Life,,40,65,2025-05-01T08:00:00Z
w-103,recipes.net,team@recipes.net,,35.5,,,
w-104,orphan.org,,,25,,,
";

    pub(super) fn store_from_export() -> Arc<InMemoryMigrationStore> {
        let rows = LegacyExportImporter::from_reader(EXPORT.as_bytes()).expect("export parses");
        Arc::new(InMemoryMigrationStore::with_legacy(rows))
    }

    pub(super) fn orchestrator(
        store: Arc<InMemoryMigrationStore>,
    ) -> Arc<MigrationOrchestrator<InMemoryMigrationStore>> {
        Arc::new(MigrationOrchestrator::new(
            store,
            Arc::new(StatusTracker::default()),
            Arc::new(Notifier::disabled()),
            Arc::new(InMemorySnapshotStore::default()),
            OrchestratorSettings::default(),
        ))
    }
}

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use publisher_migration::workflows::publishers::{
    publisher_router, AccountStatus, MigrationRequest, MigrationStore, OfferingStatus,
    RecordSource, SessionStatus,
};
use serde_json::Value;
use tower::ServiceExt;

use common::*;

#[tokio::test]
async fn csv_export_migrates_and_rolls_back_cleanly() {
    let store = store_from_export();
    let orchestrator = orchestrator(store.clone());

    let outcome = orchestrator
        .run(MigrationRequest {
            validate_first: true,
            ..MigrationRequest::default()
        })
        .await
        .expect("migration runs");

    let stats = &outcome.stats;
    assert_eq!(stats.websites_processed, 4);
    assert_eq!(stats.shadow_publishers_created, 3);
    assert_eq!(stats.offerings_created, 3);
    assert_eq!(stats.relationships_created, 4);
    assert_eq!(stats.performance_records_created, 2);
    assert!(!stats.has_errors());
    assert!(outcome
        .validation
        .as_ref()
        .is_some_and(|report| report.ready_for_migration));

    let publishers = store.publishers().expect("publishers");
    assert!(publishers.iter().all(|publisher| {
        publisher.account_status == AccountStatus::Shadow
            && publisher.source == RecordSource::LegacyMigration
    }));
    assert!(store
        .offerings()
        .expect("offerings")
        .iter()
        .all(|offering| offering.status == OfferingStatus::Draft));

    let session = orchestrator
        .session(&outcome.session_id)
        .expect("session");
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.progress_percent(), 100);

    let snapshot_id = outcome.snapshot_id.expect("snapshot taken");
    let safety = orchestrator
        .rollback_safety(&snapshot_id)
        .expect("safety check");
    assert!(safety.safe);

    orchestrator
        .execute_rollback(&snapshot_id, false)
        .await
        .expect("rollback runs");
    assert!(store.publishers().expect("publishers").is_empty());
    assert!(store.offerings().expect("offerings").is_empty());
    assert!(store.relationships().expect("relationships").is_empty());
    assert!(store.performance_records().expect("performance").is_empty());
}

#[tokio::test]
async fn rerunning_a_migration_reuses_publishers() {
    let store = store_from_export();
    let orchestrator = orchestrator(store.clone());

    orchestrator
        .run(MigrationRequest::default())
        .await
        .expect("first run");
    let rerun = orchestrator
        .run(MigrationRequest::default())
        .await
        .expect("second run");

    assert_eq!(rerun.stats.shadow_publishers_created, 0);
    assert_eq!(rerun.stats.existing_publishers_reused, 3);
    assert_eq!(store.publishers().expect("publishers").len(), 3);
    assert_eq!(store.offerings().expect("offerings").len(), 3);
}

#[tokio::test]
async fn http_dry_run_leaves_store_untouched() {
    let store = store_from_export();
    let router = publisher_router(orchestrator(store.clone()));

    let response = router
        .oneshot(
            Request::post("/api/v1/migrations/publishers")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"dryRun":true,"batchSize":2}"#))
                .expect("request builds"),
        )
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    let payload: Value = serde_json::from_slice(&body).expect("json");
    assert_eq!(payload["stats"]["offeringsCreated"], 3);
    assert!(store.publishers().expect("publishers").is_empty());
}
