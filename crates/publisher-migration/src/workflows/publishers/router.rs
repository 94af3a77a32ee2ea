use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::repository::MigrationStore;
use super::rollback::{RollbackError, SnapshotId};
use super::service::{MigrationOrchestrator, MigrationRequest, MigrationServiceError};
use super::status::{SessionId, StatusError};

/// Router exposing the migration trigger, status, and rollback endpoints.
pub fn publisher_router<S>(orchestrator: Arc<MigrationOrchestrator<S>>) -> Router
where
    S: MigrationStore + 'static,
{
    Router::new()
        .route("/api/v1/migrations/publishers", post(trigger_handler::<S>))
        .route(
            "/api/v1/migrations/publishers/validation",
            get(validation_handler::<S>),
        )
        .route("/api/v1/migrations/status", get(status_handler::<S>))
        .route(
            "/api/v1/migrations/sessions/:session_id",
            get(session_handler::<S>),
        )
        .route(
            "/api/v1/migrations/rollback/snapshots",
            post(snapshot_handler::<S>),
        )
        .route(
            "/api/v1/migrations/rollback/snapshots/:snapshot_id/plan",
            get(plan_handler::<S>),
        )
        .route(
            "/api/v1/migrations/rollback/snapshots/:snapshot_id/safety",
            get(safety_handler::<S>),
        )
        .route(
            "/api/v1/migrations/rollback/snapshots/:snapshot_id/execute",
            post(execute_handler::<S>),
        )
        .route(
            "/api/v1/migrations/rollback/emergency",
            post(emergency_handler::<S>),
        )
        .with_state(orchestrator)
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct SnapshotRequest {
    session_id: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ExecuteRequest {
    force: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EmergencyRequest {
    confirm: String,
}

pub(crate) async fn trigger_handler<S>(
    State(orchestrator): State<Arc<MigrationOrchestrator<S>>>,
    request: Result<Json<MigrationRequest>, JsonRejection>,
) -> Response
where
    S: MigrationStore + 'static,
{
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejection_response(rejection),
    };
    let dry_run = request.dry_run;
    match orchestrator.run(request).await {
        Ok(outcome) => {
            let stats = &outcome.stats;
            let message = if dry_run {
                format!(
                    "Dry run completed: {} shadow publishers, {} offerings, {} relationships would be created",
                    stats.shadow_publishers_created,
                    stats.offerings_created,
                    stats.relationships_created
                )
            } else {
                format!(
                    "Migration completed: {} shadow publishers, {} offerings, {} relationships created",
                    stats.shadow_publishers_created,
                    stats.offerings_created,
                    stats.relationships_created
                )
            };
            let mut payload = json!({
                "success": true,
                "dryRun": dry_run,
                "stats": stats,
                "message": message,
                "sessionId": outcome.session_id,
            });
            if let Some(snapshot_id) = &outcome.snapshot_id {
                payload["snapshotId"] = json!(snapshot_id);
            }
            if let Some(validation) = &outcome.validation {
                payload["validation"] = json!(validation);
            }
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(MigrationServiceError::ValidationBlocked { session_id, report }) => {
            let payload = json!({
                "success": false,
                "dryRun": dry_run,
                "error": format!(
                    "validation found {} blocking errors; live migration refused",
                    report.error_count
                ),
                "sessionId": session_id,
                "validation": report,
            });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        Err(other) => {
            let payload = json!({
                "success": false,
                "error": other.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}

pub(crate) async fn validation_handler<S>(
    State(orchestrator): State<Arc<MigrationOrchestrator<S>>>,
) -> Response
where
    S: MigrationStore + 'static,
{
    match orchestrator.validate().await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn status_handler<S>(
    State(orchestrator): State<Arc<MigrationOrchestrator<S>>>,
) -> Response
where
    S: MigrationStore + 'static,
{
    match orchestrator.status() {
        Ok(status) => (StatusCode::OK, Json(status)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn session_handler<S>(
    State(orchestrator): State<Arc<MigrationOrchestrator<S>>>,
    Path(session_id): Path<String>,
) -> Response
where
    S: MigrationStore + 'static,
{
    match orchestrator.session(&SessionId(session_id)) {
        Ok(session) => {
            let mut payload = json!(session);
            payload["progress"] = json!(session.progress_percent());
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(other) => error_response(other),
    }
}

pub(crate) async fn snapshot_handler<S>(
    State(orchestrator): State<Arc<MigrationOrchestrator<S>>>,
    request: Result<Json<SnapshotRequest>, JsonRejection>,
) -> Response
where
    S: MigrationStore + 'static,
{
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejection_response(rejection),
    };
    match orchestrator.create_snapshot(request.session_id.map(SessionId), request.description) {
        Ok(snapshot_id) => (
            StatusCode::CREATED,
            Json(json!({ "snapshotId": snapshot_id })),
        )
            .into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn plan_handler<S>(
    State(orchestrator): State<Arc<MigrationOrchestrator<S>>>,
    Path(snapshot_id): Path<String>,
) -> Response
where
    S: MigrationStore + 'static,
{
    match orchestrator.rollback_plan(&SnapshotId(snapshot_id)) {
        Ok(plan) => (StatusCode::OK, Json(plan)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn safety_handler<S>(
    State(orchestrator): State<Arc<MigrationOrchestrator<S>>>,
    Path(snapshot_id): Path<String>,
) -> Response
where
    S: MigrationStore + 'static,
{
    match orchestrator.rollback_safety(&SnapshotId(snapshot_id)) {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn execute_handler<S>(
    State(orchestrator): State<Arc<MigrationOrchestrator<S>>>,
    Path(snapshot_id): Path<String>,
    request: Result<Json<ExecuteRequest>, JsonRejection>,
) -> Response
where
    S: MigrationStore + 'static,
{
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejection_response(rejection),
    };
    match orchestrator
        .execute_rollback(&SnapshotId(snapshot_id), request.force)
        .await
    {
        Ok(execution) => (StatusCode::OK, Json(execution)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn emergency_handler<S>(
    State(orchestrator): State<Arc<MigrationOrchestrator<S>>>,
    request: Result<Json<EmergencyRequest>, JsonRejection>,
) -> Response
where
    S: MigrationStore + 'static,
{
    let Json(request) = match request {
        Ok(request) => request,
        Err(rejection) => return rejection_response(rejection),
    };
    match orchestrator.emergency_rollback(&request.confirm).await {
        Ok(report) => (StatusCode::OK, Json(report)).into_response(),
        Err(other) => error_response(other),
    }
}

fn rejection_response(rejection: JsonRejection) -> Response {
    let payload = json!({
        "success": false,
        "error": rejection.body_text(),
    });
    (rejection.status(), Json(payload)).into_response()
}

fn error_response(error: MigrationServiceError) -> Response {
    let status = match &error {
        MigrationServiceError::Status(StatusError::SessionNotFound(_))
        | MigrationServiceError::Rollback(RollbackError::SnapshotNotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        MigrationServiceError::Rollback(RollbackError::HighRiskRequiresForce { .. }) => {
            StatusCode::CONFLICT
        }
        MigrationServiceError::ConfirmationRequired => StatusCode::BAD_REQUEST,
        MigrationServiceError::ValidationBlocked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "success": false,
        "error": error.to_string(),
    });
    (status, Json(payload)).into_response()
}
