use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "-{}"), Uuid::new_v4().simple()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

record_id!(
    /// Identifier of a legacy website row.
    WebsiteId,
    "web"
);
record_id!(PublisherId, "pub");
record_id!(OfferingId, "off");
record_id!(RelationshipId, "rel");
record_id!(PerformanceRecordId, "perf");
record_id!(OrderId, "ord");

/// Legacy website row joined with its (optional) contact. Never mutated by the migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyWebsiteContact {
    pub website_id: WebsiteId,
    pub domain: String,
    pub contact_email: Option<String>,
    pub contact_name: Option<String>,
    pub guest_post_cost: Option<f64>,
    pub avg_response_time_hours: Option<f64>,
    pub success_rate_percentage: Option<f64>,
    pub last_activity: Option<DateTime<Utc>>,
}

impl LegacyWebsiteContact {
    /// Lower-cased, trimmed contact email; `None` when the website has no usable contact.
    pub fn normalized_email(&self) -> Option<String> {
        self.contact_email
            .as_deref()
            .map(normalize_email)
            .filter(|email| !email.is_empty())
    }

    pub fn has_metrics(&self) -> bool {
        self.avg_response_time_hours.is_some() || self.success_rate_percentage.is_some()
    }
}

pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Company names are compared trimmed and case-insensitively, the same rule used for emails.
pub fn normalize_company_name(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Origin of a persisted record. Only migration-sourced rows are snapshotted or rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    LegacyMigration,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Created by the migration and not yet claimed by its owner.
    Shadow,
    /// Claimed through the invitation workflow.
    Active,
    /// Parked by a rollback for a human to decide on.
    ManualReview,
}

impl AccountStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Shadow => "Shadow",
            Self::Active => "Active",
            Self::ManualReview => "Manual Review",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    pub id: PublisherId,
    pub company_name: String,
    pub email: String,
    pub account_status: AccountStatus,
    pub confidence_score: f64,
    pub invitation_token: Option<String>,
    pub source: RecordSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferingType {
    GuestPost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferingStatus {
    Draft,
    Active,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offering {
    pub id: OfferingId,
    pub publisher_id: PublisherId,
    pub website_id: WebsiteId,
    pub offering_type: OfferingType,
    /// Minor currency units (cents).
    pub base_price_cents: i64,
    pub status: OfferingStatus,
    pub source: RecordSource,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublisherWebsiteRelationship {
    pub id: RelationshipId,
    pub publisher_id: PublisherId,
    pub website_id: WebsiteId,
    pub confidence_score: f64,
    pub source: RecordSource,
    pub created_at: DateTime<Utc>,
}

/// Aggregate performance over a trailing window for one publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub id: PerformanceRecordId,
    pub publisher_id: PublisherId,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub avg_response_time_hours: Option<f64>,
    pub success_rate_percentage: Option<f64>,
    pub websites_sampled: usize,
    pub source: RecordSource,
}

/// Projection of an order line item; rollback only needs to know which offerings are referenced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub order_id: OrderId,
    pub offering_id: OfferingId,
}

/// Convert a dollar amount into integer cents, rounding half away from zero.
pub fn dollars_to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}
