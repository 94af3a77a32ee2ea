//! Best-effort operator notifications for migration sessions.
//!
//! The notifier reacts to tracker events, renders them once, and fans them out to an email
//! channel and a chat webhook. Nothing here can fail a migration: channel errors are logged and
//! reported through [`NotifyOutcome`].

mod channels;
mod rate_limit;
mod templates;

pub use channels::{
    ChatChannel, EmailChannel, HttpEmailChannel, NotificationError, SlackWebhookChannel,
};
pub use rate_limit::RateLimiter;
pub use templates::{render, RenderedNotification};

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};

use super::status::{MigrationPhase, SessionId, SessionKind};
use crate::config::NotificationSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationFrequency {
    #[default]
    Realtime,
    Hourly,
    Daily,
}

impl NotificationFrequency {
    /// Minimum spacing between two sends for the same event and session.
    pub const fn window(self) -> Duration {
        match self {
            Self::Realtime => Duration::from_secs(60),
            Self::Hourly => Duration::from_secs(60 * 60),
            Self::Daily => Duration::from_secs(24 * 60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFrequency(pub String);

impl std::fmt::Display for UnknownFrequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown notification frequency '{}'", self.0)
    }
}

impl std::error::Error for UnknownFrequency {}

impl FromStr for NotificationFrequency {
    type Err = UnknownFrequency;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "realtime" | "real_time" | "immediate" => Ok(Self::Realtime),
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            _ => Err(UnknownFrequency(value.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub email_enabled: bool,
    pub chat_enabled: bool,
    pub recipients: Vec<String>,
    /// Overall progress percentages that trigger a milestone message.
    pub milestone_thresholds: Vec<u8>,
    pub frequency: NotificationFrequency,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            email_enabled: false,
            chat_enabled: false,
            recipients: Vec::new(),
            milestone_thresholds: vec![25, 50, 75],
            frequency: NotificationFrequency::Realtime,
        }
    }
}

impl NotificationConfig {
    pub fn from_settings(settings: &NotificationSettings) -> Self {
        let mut milestone_thresholds = settings.milestones.clone();
        milestone_thresholds.sort_unstable();
        milestone_thresholds.dedup();

        Self {
            enabled: settings.enabled,
            email_enabled: settings.email_endpoint.is_some() && !settings.recipients.is_empty(),
            chat_enabled: settings.chat_webhook_url.is_some(),
            recipients: settings.recipients.clone(),
            milestone_thresholds,
            frequency: settings.frequency,
        }
    }
}

/// Headline numbers carried by a completion message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionSummary {
    pub dry_run: bool,
    pub duration_ms: u64,
    pub publishers_created: usize,
    pub offerings_created: usize,
    pub relationships_created: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NotificationEvent {
    SessionStarted {
        session_id: SessionId,
        kind: SessionKind,
        dry_run: bool,
    },
    Milestone {
        session_id: SessionId,
        kind: SessionKind,
        progress: u8,
        phase: MigrationPhase,
    },
    SessionCompleted {
        session_id: SessionId,
        kind: SessionKind,
        summary: CompletionSummary,
    },
    Error {
        session_id: SessionId,
        kind: SessionKind,
        phase: Option<MigrationPhase>,
        message: String,
    },
}

impl NotificationEvent {
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::SessionStarted { session_id, .. }
            | Self::Milestone { session_id, .. }
            | Self::SessionCompleted { session_id, .. }
            | Self::Error { session_id, .. } => session_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Rate-limit key. Each milestone threshold gets its own key.
    pub fn key(&self) -> String {
        let event = match self {
            Self::SessionStarted { .. } => "session_started".to_string(),
            Self::Milestone { progress, .. } => format!("milestone_{progress}"),
            Self::SessionCompleted { .. } => "session_completed".to_string(),
            Self::Error { .. } => "error".to_string(),
        };
        format!("{event}:{}", self.session_id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOutcome {
    Sent,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum NotifyOutcome {
    Disabled,
    RateLimited,
    Dispatched {
        email: ChannelOutcome,
        chat: ChannelOutcome,
    },
}

pub struct Notifier {
    config: NotificationConfig,
    email: Option<Arc<dyn EmailChannel>>,
    chat: Option<Arc<dyn ChatChannel>>,
    limiter: RateLimiter,
}

impl Notifier {
    pub fn new(config: NotificationConfig) -> Self {
        let limiter = RateLimiter::new(config.frequency.window());
        Self {
            config,
            email: None,
            chat: None,
            limiter,
        }
    }

    pub fn disabled() -> Self {
        Self::new(NotificationConfig::default())
    }

    /// Wire the HTTP channels for whichever endpoints are configured.
    pub fn from_settings(settings: &NotificationSettings) -> Self {
        let mut notifier = Self::new(NotificationConfig::from_settings(settings));
        let client = reqwest::Client::new();

        if let Some(endpoint) = &settings.email_endpoint {
            notifier = notifier.with_email(Arc::new(HttpEmailChannel::new(
                client.clone(),
                endpoint.clone(),
                settings.email_api_key.clone(),
                settings.email_from.clone(),
            )));
        }
        if let Some(url) = &settings.chat_webhook_url {
            notifier = notifier.with_chat(Arc::new(SlackWebhookChannel::new(client, url.clone())));
        }
        notifier
    }

    pub fn with_email(mut self, channel: Arc<dyn EmailChannel>) -> Self {
        self.email = Some(channel);
        self
    }

    pub fn with_chat(mut self, channel: Arc<dyn ChatChannel>) -> Self {
        self.chat = Some(channel);
        self
    }

    pub fn config(&self) -> &NotificationConfig {
        &self.config
    }

    pub fn milestone_thresholds(&self) -> &[u8] {
        &self.config.milestone_thresholds
    }

    /// Render and dispatch `event`. Never fails; the outcome is informational.
    pub async fn try_notify(&self, event: &NotificationEvent) -> NotifyOutcome {
        if !self.config.enabled {
            return NotifyOutcome::Disabled;
        }

        let key = event.key();
        if !event.is_error() && !self.limiter.allow(&key) {
            debug!(%key, "notification suppressed by rate limiter");
            return NotifyOutcome::RateLimited;
        }

        let message = render(event);
        let (email, chat) = tokio::join!(self.send_email(&message), self.post_chat(&message));
        debug!(%key, ?email, ?chat, "notification dispatched");
        NotifyOutcome::Dispatched { email, chat }
    }

    async fn send_email(&self, message: &RenderedNotification) -> ChannelOutcome {
        let Some(channel) = self.email.as_ref().filter(|_| self.config.email_enabled) else {
            return ChannelOutcome::Skipped;
        };
        if self.config.recipients.is_empty() {
            return ChannelOutcome::Skipped;
        }
        match channel.send(&self.config.recipients, message).await {
            Ok(()) => ChannelOutcome::Sent,
            Err(err) => {
                warn!(error = %err, subject = %message.subject, "email notification failed");
                ChannelOutcome::Failed
            }
        }
    }

    async fn post_chat(&self, message: &RenderedNotification) -> ChannelOutcome {
        let Some(channel) = self.chat.as_ref().filter(|_| self.config.chat_enabled) else {
            return ChannelOutcome::Skipped;
        };
        match channel.post(&message.chat).await {
            Ok(()) => ChannelOutcome::Sent,
            Err(err) => {
                warn!(error = %err, subject = %message.subject, "chat notification failed");
                ChannelOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frequency_parses_and_maps_to_window() {
        assert_eq!(
            "Hourly".parse::<NotificationFrequency>(),
            Ok(NotificationFrequency::Hourly)
        );
        assert_eq!(
            NotificationFrequency::Realtime.window(),
            Duration::from_secs(60)
        );
        assert!("weekly".parse::<NotificationFrequency>().is_err());
    }

    #[test]
    fn milestone_keys_are_distinct_per_threshold() {
        let session_id = SessionId("mig-1".to_string());
        let at = |progress| NotificationEvent::Milestone {
            session_id: session_id.clone(),
            kind: SessionKind::PublisherMigration,
            progress,
            phase: MigrationPhase::Offerings,
        };
        assert_eq!(at(25).key(), "milestone_25:mig-1");
        assert_ne!(at(25).key(), at(50).key());
    }
}
