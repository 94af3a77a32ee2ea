use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::publishers::import::LegacyImportError;
use crate::workflows::publishers::migrator::MigrationStats;
use crate::workflows::publishers::service::MigrationServiceError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Import(LegacyImportError),
    Migration(MigrationServiceError),
    Serialization(serde_json::Error),
    /// The run finished but recorded per-record errors; the report was still written.
    MigrationIncomplete {
        errors: usize,
        report: PathBuf,
        stats: Box<MigrationStats>,
    },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Import(err) => write!(f, "import error: {}", err),
            AppError::Migration(err) => write!(f, "migration error: {}", err),
            AppError::Serialization(err) => write!(f, "serialization error: {}", err),
            AppError::MigrationIncomplete { errors, report, .. } => write!(
                f,
                "migration recorded {} errors; see {}",
                errors,
                report.display()
            ),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Import(err) => Some(err),
            AppError::Migration(err) => Some(err),
            AppError::Serialization(err) => Some(err),
            AppError::MigrationIncomplete { .. } => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Import(_) => StatusCode::BAD_REQUEST,
            AppError::Migration(MigrationServiceError::ValidationBlocked { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Migration(_)
            | AppError::Serialization(_)
            | AppError::MigrationIncomplete { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<LegacyImportError> for AppError {
    fn from(value: LegacyImportError) -> Self {
        Self::Import(value)
    }
}

impl From<MigrationServiceError> for AppError {
    fn from(value: MigrationServiceError) -> Self {
        Self::Migration(value)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn import_errors_map_to_bad_request() {
        let err = AppError::from(LegacyImportError::InvalidTimestamp {
            website_id: "w1".to_string(),
            value: "soon".to_string(),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body collects");
        let payload: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert!(payload["error"]
            .as_str()
            .is_some_and(|message| message.contains("soon")));
    }
}
