use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::publishers::domain::{
    AccountStatus, LegacyWebsiteContact, Offering, OfferingId, OfferingStatus, OfferingType,
    Publisher, PublisherId, RecordSource, WebsiteId,
};
use crate::workflows::publishers::memory::InMemoryMigrationStore;
use crate::workflows::publishers::migrator::MigrationOptions;
use crate::workflows::publishers::notifier::{
    ChatChannel, EmailChannel, NotificationConfig, NotificationError, NotificationFrequency,
    Notifier, RenderedNotification,
};
use crate::workflows::publishers::rollback::InMemorySnapshotStore;
use crate::workflows::publishers::service::{MigrationOrchestrator, OrchestratorSettings};
use crate::workflows::publishers::status::StatusTracker;

pub(super) fn as_of() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn website(
    id: &str,
    domain: &str,
    email: Option<&str>,
    cost: Option<f64>,
) -> LegacyWebsiteContact {
    LegacyWebsiteContact {
        website_id: WebsiteId(id.to_string()),
        domain: domain.to_string(),
        contact_email: email.map(str::to_string),
        contact_name: None,
        guest_post_cost: cost,
        avg_response_time_hours: None,
        success_rate_percentage: None,
        last_activity: None,
    }
}

pub(super) fn named(mut row: LegacyWebsiteContact, name: &str) -> LegacyWebsiteContact {
    row.contact_name = Some(name.to_string());
    row
}

pub(super) fn with_metrics(
    mut row: LegacyWebsiteContact,
    response_hours: f64,
    success_rate: f64,
) -> LegacyWebsiteContact {
    row.avg_response_time_hours = Some(response_hours);
    row.success_rate_percentage = Some(success_rate);
    row.last_activity = Some(as_of() - Duration::days(10));
    row
}

/// Two rows sharing an email in different casing; only the first is priced.
pub(super) fn shared_email_rows() -> Vec<LegacyWebsiteContact> {
    vec![
        website("w-a", "a.com", Some("contact@a.com"), Some(50.0)),
        website("w-b", "b.com", Some("Contact@A.com"), None),
    ]
}

/// A realistic mixed export: shared contacts, unpriced sites, metrics, and a contactless site.
pub(super) fn mixed_rows() -> Vec<LegacyWebsiteContact> {
    vec![
        with_metrics(
            named(
                website("w-1", "techdaily.io", Some("editor@techdaily.io"), Some(120.0)),
                "Tech Daily",
            ),
            18.0,
            92.0,
        ),
        named(
            website("w-2", "gadgets.techdaily.io", Some("EDITOR@techdaily.io "), Some(80.0)),
            "Tech Daily",
        ),
        with_metrics(
            named(
                website("w-3", "gardenlife.com", Some("hello@gardenlife.com"), None),
                "Garden Life",
            ),
            40.0,
            65.0,
        ),
        website("w-4", "recipes.net", Some("team@recipes.net"), Some(35.5)),
        website("w-5", "orphan.org", None, Some(25.0)),
    ]
}

pub(super) fn store_with(rows: Vec<LegacyWebsiteContact>) -> Arc<InMemoryMigrationStore> {
    Arc::new(InMemoryMigrationStore::with_legacy(rows))
}

pub(super) fn options(dry_run: bool) -> MigrationOptions {
    MigrationOptions {
        dry_run,
        batch_size: 50,
        batch_delay: StdDuration::ZERO,
        as_of: Some(as_of()),
    }
}

pub(super) fn manual_publisher(company: &str, email: &str) -> Publisher {
    Publisher {
        id: PublisherId::generate(),
        company_name: company.to_string(),
        email: email.to_string(),
        account_status: AccountStatus::Active,
        confidence_score: 1.0,
        invitation_token: None,
        source: RecordSource::Manual,
        created_at: as_of(),
    }
}

pub(super) fn shadow_publisher(company: &str, email: &str) -> Publisher {
    Publisher {
        id: PublisherId::generate(),
        company_name: company.to_string(),
        email: email.to_string(),
        account_status: AccountStatus::Shadow,
        confidence_score: 0.5,
        invitation_token: Some("token".to_string()),
        source: RecordSource::LegacyMigration,
        created_at: as_of(),
    }
}

pub(super) fn offering_for(
    publisher_id: &PublisherId,
    website_id: &str,
    status: OfferingStatus,
) -> Offering {
    Offering {
        id: OfferingId::generate(),
        publisher_id: publisher_id.clone(),
        website_id: WebsiteId(website_id.to_string()),
        offering_type: OfferingType::GuestPost,
        base_price_cents: 5_000,
        status,
        source: RecordSource::LegacyMigration,
        created_at: as_of(),
    }
}

#[derive(Default)]
pub(super) struct RecordingEmail {
    sent: Mutex<Vec<(Vec<String>, RenderedNotification)>>,
}

impl RecordingEmail {
    pub(super) fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("email mutex poisoned")
            .iter()
            .map(|(_, message)| message.subject.clone())
            .collect()
    }
}

#[async_trait]
impl EmailChannel for RecordingEmail {
    async fn send(
        &self,
        recipients: &[String],
        message: &RenderedNotification,
    ) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .expect("email mutex poisoned")
            .push((recipients.to_vec(), message.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct RecordingChat {
    posts: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub(super) fn posts(&self) -> Vec<String> {
        self.posts.lock().expect("chat mutex poisoned").clone()
    }
}

#[async_trait]
impl ChatChannel for RecordingChat {
    async fn post(&self, text: &str) -> Result<(), NotificationError> {
        self.posts
            .lock()
            .expect("chat mutex poisoned")
            .push(text.to_string());
        Ok(())
    }
}

pub(super) struct RejectingChat;

#[async_trait]
impl ChatChannel for RejectingChat {
    async fn post(&self, _text: &str) -> Result<(), NotificationError> {
        Err(NotificationError::Rejected {
            status: 503,
            body: "webhook offline".to_string(),
        })
    }
}

pub(super) fn notification_config() -> NotificationConfig {
    NotificationConfig {
        enabled: true,
        email_enabled: true,
        chat_enabled: true,
        recipients: vec!["ops@example.com".to_string()],
        milestone_thresholds: vec![25, 50, 75],
        frequency: NotificationFrequency::Realtime,
    }
}

pub(super) struct Harness {
    pub(super) store: Arc<InMemoryMigrationStore>,
    pub(super) orchestrator: Arc<MigrationOrchestrator<InMemoryMigrationStore>>,
    pub(super) email: Arc<RecordingEmail>,
    pub(super) chat: Arc<RecordingChat>,
}

pub(super) fn harness(rows: Vec<LegacyWebsiteContact>) -> Harness {
    let store = store_with(rows);
    let email = Arc::new(RecordingEmail::default());
    let chat = Arc::new(RecordingChat::default());
    let notifier = Notifier::new(notification_config())
        .with_email(email.clone())
        .with_chat(chat.clone());
    let orchestrator = Arc::new(MigrationOrchestrator::new(
        store.clone(),
        Arc::new(StatusTracker::default()),
        Arc::new(notifier),
        Arc::new(InMemorySnapshotStore::default()),
        OrchestratorSettings::default(),
    ));

    Harness {
        store,
        orchestrator,
        email,
        chat,
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
