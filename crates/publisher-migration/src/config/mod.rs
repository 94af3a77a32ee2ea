use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::workflows::publishers::notifier::NotificationFrequency;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub migration: MigrationConfig,
    pub notifications: NotificationSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = match env::var("APP_LOG_FORMAT") {
            Ok(raw) => LogFormat::parse(&raw)?,
            Err(_) => LogFormat::Compact,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                format: log_format,
            },
            migration: MigrationConfig::from_env()?,
            notifications: NotificationSettings::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "compact" | "text" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            _ => Err(ConfigError::InvalidValue {
                key: "APP_LOG_FORMAT",
                value: raw.to_string(),
            }),
        }
    }
}

/// Batch sizing and legacy source locations for migration runs.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub legacy_csv: Option<PathBuf>,
    pub report_dir: PathBuf,
}

impl MigrationConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let batch_size = parse_var("MIGRATION_BATCH_SIZE", 50usize)?;
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MIGRATION_BATCH_SIZE",
                value: "0".to_string(),
            });
        }
        let delay_ms = parse_var("MIGRATION_BATCH_DELAY_MS", 100u64)?;

        Ok(Self {
            batch_size,
            batch_delay: Duration::from_millis(delay_ms),
            legacy_csv: non_empty_var("MIGRATION_LEGACY_CSV").map(PathBuf::from),
            report_dir: non_empty_var("MIGRATION_REPORT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        })
    }
}

/// Outbound notification channels and delivery rules.
#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub recipients: Vec<String>,
    pub email_endpoint: Option<String>,
    pub email_api_key: Option<String>,
    pub email_from: String,
    pub chat_webhook_url: Option<String>,
    pub frequency: NotificationFrequency,
    pub milestones: Vec<u8>,
}

impl NotificationSettings {
    fn from_env() -> Result<Self, ConfigError> {
        let enabled = parse_var("NOTIFY_ENABLED", false)?;
        let recipients = non_empty_var("NOTIFY_RECIPIENTS")
            .map(|raw| split_list(&raw))
            .unwrap_or_default();

        let frequency = match non_empty_var("NOTIFY_FREQUENCY") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "NOTIFY_FREQUENCY",
                value: raw.clone(),
            })?,
            None => NotificationFrequency::Realtime,
        };

        let milestones = match non_empty_var("NOTIFY_MILESTONES") {
            Some(raw) => split_list(&raw)
                .into_iter()
                .map(|value| match value.parse::<u8>() {
                    Ok(pct) if pct <= 100 => Ok(pct),
                    _ => Err(ConfigError::InvalidValue {
                        key: "NOTIFY_MILESTONES",
                        value: value.clone(),
                    }),
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => vec![25, 50, 75],
        };

        Ok(Self {
            enabled,
            recipients,
            email_endpoint: non_empty_var("NOTIFY_EMAIL_ENDPOINT"),
            email_api_key: non_empty_var("NOTIFY_EMAIL_API_KEY"),
            email_from: non_empty_var("NOTIFY_EMAIL_FROM")
                .unwrap_or_else(|| "migrations@localhost".to_string()),
            chat_webhook_url: non_empty_var("NOTIFY_CHAT_WEBHOOK_URL"),
            frequency,
            milestones,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_var<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue { key, value: raw }),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidValue { key: &'static str, value: String },
    MissingValue { key: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidValue { key, value } => {
                write!(f, "{key} has an unsupported value '{value}'")
            }
            ConfigError::MissingValue { key } => write!(f, "{key} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort
            | ConfigError::InvalidValue { .. }
            | ConfigError::MissingValue { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
