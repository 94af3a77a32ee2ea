use super::common::*;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use axum::Json;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::workflows::publishers::domain::AccountStatus;
use crate::workflows::publishers::memory::InMemoryMigrationStore;
use crate::workflows::publishers::repository::MigrationStore;
use crate::workflows::publishers::router::{publisher_router, session_handler};
use crate::workflows::publishers::service::MigrationRequest;

fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).expect("request builds")
}

#[tokio::test]
async fn dry_run_trigger_reports_stats() {
    let harness = harness(mixed_rows());
    let router = publisher_router(harness.orchestrator.clone());

    let response = router
        .oneshot(json_post(
            "/api/v1/migrations/publishers",
            json!({ "dryRun": true }),
        ))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["dryRun"], true);
    assert_eq!(body["stats"]["shadowPublishersCreated"], 3);
    assert!(body["sessionId"].as_str().is_some());
    assert!(body.get("snapshotId").is_none());
    assert!(harness.store.publishers().expect("publishers").is_empty());
}

#[tokio::test]
async fn live_trigger_returns_snapshot_id() {
    let harness = harness(mixed_rows());
    let router = publisher_router(harness.orchestrator.clone());

    let response = router
        .oneshot(json_post("/api/v1/migrations/publishers", json!({})))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["dryRun"], false);
    assert!(body["snapshotId"]
        .as_str()
        .is_some_and(|id| id.starts_with("snap-")));
    assert_eq!(harness.store.publishers().expect("publishers").len(), 3);
}

#[tokio::test]
async fn unavailable_store_is_an_internal_error() {
    let harness = harness(mixed_rows());
    harness.store.set_unavailable(true);
    let router = publisher_router(harness.orchestrator.clone());

    let response = router
        .oneshot(json_post(
            "/api/v1/migrations/publishers",
            json!({ "dryRun": true }),
        ))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .is_some_and(|message| message.contains("legacy website contacts")));
}

#[tokio::test]
async fn blocked_validation_is_unprocessable() {
    let harness = harness(vec![website(
        "w-1",
        "broken.com",
        Some("owner@broken.com"),
        Some(-5.0),
    )]);
    let router = publisher_router(harness.orchestrator.clone());

    let response = router
        .oneshot(json_post(
            "/api/v1/migrations/publishers",
            json!({ "validateFirst": true }),
        ))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["validation"]["errorCount"], 1);
    assert!(body["sessionId"].as_str().is_some());
}

#[tokio::test]
async fn validation_route_returns_report() {
    let harness = harness(mixed_rows());
    let router = publisher_router(harness.orchestrator.clone());

    let response = router
        .oneshot(get("/api/v1/migrations/publishers/validation"))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["totalWebsites"], 5);
    assert_eq!(body["readyForMigration"], true);
}

#[tokio::test]
async fn session_handler_includes_progress() {
    let harness = harness(mixed_rows());
    let outcome = harness
        .orchestrator
        .run(MigrationRequest {
            dry_run: true,
            ..MigrationRequest::default()
        })
        .await
        .expect("dry run");

    let response = session_handler::<InMemoryMigrationStore>(
        State(harness.orchestrator.clone()),
        Path(outcome.session_id.0.clone()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["progress"], 100);
    assert_eq!(body["status"], "completed");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let harness = harness(mixed_rows());
    let router = publisher_router(harness.orchestrator.clone());

    let response = router
        .oneshot(get("/api/v1/migrations/sessions/mig-missing"))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn status_route_lists_recent_errors() {
    let harness = harness(mixed_rows());
    harness.store.set_unavailable(true);
    let _ = harness
        .orchestrator
        .run(MigrationRequest {
            dry_run: true,
            ..MigrationRequest::default()
        })
        .await;
    let router = publisher_router(harness.orchestrator.clone());

    let response = router
        .oneshot(get("/api/v1/migrations/status"))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["recent_errors"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn manual_snapshot_then_plan_round_trip() {
    let harness = harness(mixed_rows());
    let router = publisher_router(harness.orchestrator.clone());

    let created = router
        .clone()
        .oneshot(json_post(
            "/api/v1/migrations/rollback/snapshots",
            json!({ "description": "before manual run" }),
        ))
        .await
        .expect("route responds");
    assert_eq!(created.status(), StatusCode::CREATED);
    let snapshot_id = read_json_body(created).await["snapshotId"]
        .as_str()
        .expect("snapshot id")
        .to_string();

    harness
        .orchestrator
        .run(MigrationRequest {
            snapshot: false,
            ..MigrationRequest::default()
        })
        .await
        .expect("live run");

    let plan = router
        .clone()
        .oneshot(get(&format!(
            "/api/v1/migrations/rollback/snapshots/{snapshot_id}/plan"
        )))
        .await
        .expect("route responds");
    assert_eq!(plan.status(), StatusCode::OK);
    let plan = read_json_body(plan).await;
    assert_eq!(plan["total_records"], 10);

    let safety = router
        .oneshot(get(&format!(
            "/api/v1/migrations/rollback/snapshots/{snapshot_id}/safety"
        )))
        .await
        .expect("route responds");
    assert_eq!(safety.status(), StatusCode::OK);
    assert_eq!(read_json_body(safety).await["safe"], true);
}

#[tokio::test]
async fn unknown_snapshot_plan_is_not_found() {
    let harness = harness(mixed_rows());
    let router = publisher_router(harness.orchestrator.clone());

    let response = router
        .oneshot(get(
            "/api/v1/migrations/rollback/snapshots/snap-missing/plan",
        ))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn high_risk_execute_without_force_conflicts() {
    let harness = harness(mixed_rows());
    let outcome = harness
        .orchestrator
        .run(MigrationRequest::default())
        .await
        .expect("live run");
    let snapshot_id = outcome.snapshot_id.expect("snapshot taken");
    let claimed = harness.store.publishers().expect("publishers").remove(0);
    harness
        .store
        .update_publisher_status(&claimed.id, AccountStatus::Active)
        .expect("claim");
    let router = publisher_router(harness.orchestrator.clone());
    let uri = format!("/api/v1/migrations/rollback/snapshots/{snapshot_id}/execute");

    let refused = router
        .clone()
        .oneshot(json_post(&uri, json!({})))
        .await
        .expect("route responds");
    assert_eq!(refused.status(), StatusCode::CONFLICT);

    let forced = router
        .oneshot(json_post(&uri, json!({ "force": true })))
        .await
        .expect("route responds");
    assert_eq!(forced.status(), StatusCode::OK);
    let body = read_json_body(forced).await;
    assert_eq!(body["total_failed"], 0);
}

#[tokio::test]
async fn emergency_with_wrong_phrase_is_bad_request() {
    let harness = harness(mixed_rows());
    let router = publisher_router(harness.orchestrator.clone());

    let response = router
        .oneshot(json_post(
            "/api/v1/migrations/rollback/emergency",
            json!({ "confirm": "delete it" }),
        ))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = read_json_body(response).await;
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn malformed_trigger_body_is_a_json_error() {
    let harness = harness(mixed_rows());
    let router = publisher_router(harness.orchestrator.clone());

    let response = router
        .oneshot(json_post(
            "/api/v1/migrations/publishers",
            json!({ "dryRun": true, "batchSize": -5 }),
        ))
        .await
        .expect("route responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().is_some_and(|error| !error.is_empty()));
    assert!(harness.store.publishers().expect("publishers").is_empty());
}

#[tokio::test]
async fn trigger_handler_accepts_direct_calls() {
    let harness = harness(shared_email_rows());

    let response = crate::workflows::publishers::router::trigger_handler::<InMemoryMigrationStore>(
        State(harness.orchestrator.clone()),
        Ok(Json(MigrationRequest {
            dry_run: true,
            ..MigrationRequest::default()
        })),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert!(body["message"]
        .as_str()
        .is_some_and(|message| message.starts_with("Dry run completed")));
}
