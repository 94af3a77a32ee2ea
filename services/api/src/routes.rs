use crate::infra::{AppState, Orchestrator};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use publisher_migration::workflows::publishers::publisher_router;
use serde_json::json;
use std::sync::Arc;

pub(crate) fn with_migration_routes(orchestrator: Arc<Orchestrator>) -> axum::Router {
    publisher_router(orchestrator)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::load_store;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use publisher_migration::workflows::publishers::{
        InMemorySnapshotStore, MigrationOrchestrator, Notifier, OrchestratorSettings,
        StatusTracker,
    };
    use std::io::Write;
    use tower::ServiceExt;

    const HEADER: &str = "website_id,domain,contact_email,contact_name,guest_post_cost,avg_response_time_hours,success_rate_percentage,last_activity";

    fn orchestrator_from_csv(rows: &[&str]) -> Arc<Orchestrator> {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "{HEADER}").expect("write header");
        for row in rows {
            writeln!(file, "{row}").expect("write row");
        }
        let store = load_store(Some(file.path())).expect("store loads");
        Arc::new(MigrationOrchestrator::new(
            store,
            Arc::new(StatusTracker::default()),
            Arc::new(Notifier::disabled()),
            Arc::new(InMemorySnapshotStore::default()),
            OrchestratorSettings::default(),
        ))
    }

    #[tokio::test]
    async fn healthcheck_reports_ok() {
        let Json(body) = healthcheck().await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn migration_routes_are_mounted_alongside_health() {
        let router = with_migration_routes(orchestrator_from_csv(&[
            "w-1,a.com,owner@a.com,Acme,50,,,",
            "w-2,b.com,owner@a.com,Acme,,12,90,2025-05-01",
        ]));

        let health = router
            .clone()
            .oneshot(
                Request::get("/health")
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("route responds");
        assert_eq!(health.status(), StatusCode::OK);

        let response = router
            .oneshot(
                Request::post("/api/v1/migrations/publishers")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(r#"{"dryRun":true}"#))
                    .expect("request builds"),
            )
            .await
            .expect("route responds");
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body collects");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(payload["stats"]["shadowPublishersCreated"], 1);
        assert_eq!(payload["stats"]["offeringsCreated"], 1);
        assert_eq!(payload["stats"]["relationshipsCreated"], 2);
        assert_eq!(payload["stats"]["performanceRecordsCreated"], 1);
    }
}
