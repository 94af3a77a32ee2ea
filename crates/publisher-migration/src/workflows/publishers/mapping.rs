use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{LegacyWebsiteContact, PublisherId};

/// Legacy websites grouped under one normalized contact email. Rebuilt on every run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublisherMapping {
    pub company_name: Option<String>,
    pub contact_email: String,
    pub websites: Vec<LegacyWebsiteContact>,
    pub last_activity: Option<DateTime<Utc>>,
    pub confidence_score: f64,
    pub publisher_id: Option<PublisherId>,
}

impl PublisherMapping {
    fn seed(email: String, first: &LegacyWebsiteContact) -> Self {
        let company_name = first
            .contact_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .or_else(|| email_domain(&email));

        Self {
            company_name,
            contact_email: email,
            websites: vec![first.clone()],
            last_activity: first.last_activity,
            confidence_score: 0.0,
            publisher_id: None,
        }
    }

    fn absorb(&mut self, row: &LegacyWebsiteContact) {
        self.websites.push(row.clone());
        self.last_activity = match (self.last_activity, row.last_activity) {
            (Some(current), Some(candidate)) => Some(current.max(candidate)),
            (current, candidate) => current.or(candidate),
        };
    }

    pub fn priced_websites(&self) -> impl Iterator<Item = (&LegacyWebsiteContact, f64)> {
        self.websites
            .iter()
            .filter_map(|website| website.guest_post_cost.map(|cost| (website, cost)))
    }
}

/// Group legacy rows by normalized email, keeping first-seen order. Rows without a contact
/// email are left out; the validator reports them separately.
pub fn build_mappings(rows: &[LegacyWebsiteContact]) -> Vec<PublisherMapping> {
    let mut mappings: Vec<PublisherMapping> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let Some(email) = row.normalized_email() else {
            continue;
        };

        match index.get(&email) {
            Some(&position) => mappings[position].absorb(row),
            None => {
                index.insert(email.clone(), mappings.len());
                mappings.push(PublisherMapping::seed(email, row));
            }
        }
    }

    mappings
}

fn email_domain(email: &str) -> Option<String> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain.trim())
        .filter(|domain| !domain.is_empty())
        .map(str::to_string)
}
