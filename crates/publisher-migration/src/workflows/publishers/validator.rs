use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::domain::{normalize_company_name, LegacyWebsiteContact, Publisher, RecordSource};
use super::migrator::{MAX_GUEST_POST_PRICE, MIN_GUEST_POST_PRICE};
use super::repository::{MigrationStore, RepositoryError};

const MAX_RESPONSE_TIME_HOURS: f64 = 168.0;
const MAX_SUCCESS_RATE: f64 = 100.0;
const LOW_COMPLETENESS_PCT: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    DuplicateEmails,
    MissingContacts,
    Pricing,
    NameVariants,
    ExistingPublishers,
    Completeness,
    PerformanceMetrics,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub severity: IssueSeverity,
    pub category: IssueCategory,
    pub message: String,
    pub affected_count: usize,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
    pub error_count: usize,
    pub warning_count: usize,
    pub info_count: usize,
    pub total_websites: usize,
    pub completeness_percentage: f64,
    pub ready_for_migration: bool,
    pub generated_at: DateTime<Utc>,
}

impl ValidationReport {
    fn from_issues(
        issues: Vec<ValidationIssue>,
        total_websites: usize,
        completeness_percentage: f64,
    ) -> Self {
        let count = |severity: IssueSeverity| {
            issues
                .iter()
                .filter(|issue| issue.severity == severity)
                .count()
        };
        let error_count = count(IssueSeverity::Error);
        let warning_count = count(IssueSeverity::Warning);
        let info_count = count(IssueSeverity::Info);

        Self {
            error_count,
            warning_count,
            info_count,
            total_websites,
            completeness_percentage,
            ready_for_migration: error_count == 0,
            generated_at: Utc::now(),
            issues,
        }
    }

    pub fn issues_in(&self, category: IssueCategory) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(move |issue| issue.category == category)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("validation could not read the store: {0}")]
    Store(#[from] RepositoryError),
}

/// Read-only data-quality scan over the legacy tables.
pub struct MigrationValidator<S> {
    store: Arc<S>,
}

impl<S> MigrationValidator<S>
where
    S: MigrationStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn validate_all(&self) -> Result<ValidationReport, ValidationError> {
        let websites = self.store.legacy_websites()?;
        let publishers = self.store.publishers()?;

        let mut issues = Vec::new();
        check_duplicate_emails(&websites, &mut issues);
        check_missing_contacts(&websites, &mut issues);
        check_pricing(&websites, &mut issues);
        check_name_variants(&websites, &mut issues);
        check_existing_publishers(&publishers, &mut issues);
        let completeness = check_completeness(&websites, &mut issues);
        check_performance_metrics(&websites, &mut issues);

        let report = ValidationReport::from_issues(issues, websites.len(), completeness);
        info!(
            errors = report.error_count,
            warnings = report.warning_count,
            info = report.info_count,
            websites = report.total_websites,
            ready = report.ready_for_migration,
            "legacy data validation finished"
        );
        Ok(report)
    }
}

fn check_duplicate_emails(websites: &[LegacyWebsiteContact], issues: &mut Vec<ValidationIssue>) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for email in websites.iter().filter_map(LegacyWebsiteContact::normalized_email) {
        *counts.entry(email).or_default() += 1;
    }

    let duplicated: Vec<usize> = counts.values().copied().filter(|count| *count > 1).collect();
    if duplicated.is_empty() {
        return;
    }

    issues.push(ValidationIssue {
        severity: IssueSeverity::Info,
        category: IssueCategory::DuplicateEmails,
        message: format!(
            "{} contact emails are shared by {} websites",
            duplicated.len(),
            duplicated.iter().sum::<usize>()
        ),
        affected_count: duplicated.iter().sum(),
        suggestion: "Websites sharing an email will be merged under a single publisher."
            .to_string(),
    });
}

fn check_missing_contacts(websites: &[LegacyWebsiteContact], issues: &mut Vec<ValidationIssue>) {
    let missing = websites
        .iter()
        .filter(|website| website.normalized_email().is_none())
        .count();
    if missing == 0 {
        return;
    }

    issues.push(ValidationIssue {
        severity: IssueSeverity::Warning,
        category: IssueCategory::MissingContacts,
        message: format!("{missing} websites have no contact email"),
        affected_count: missing,
        suggestion: "Add a contact before migrating or these websites will not get a publisher."
            .to_string(),
    });
}

fn check_pricing(websites: &[LegacyWebsiteContact], issues: &mut Vec<ValidationIssue>) {
    let prices = websites.iter().filter_map(|website| website.guest_post_cost);
    let (negative, implausible) = prices.fold((0usize, 0usize), |(neg, odd), cost| {
        if cost < 0.0 {
            (neg + 1, odd)
        } else if !(MIN_GUEST_POST_PRICE..=MAX_GUEST_POST_PRICE).contains(&cost) {
            (neg, odd + 1)
        } else {
            (neg, odd)
        }
    });

    if negative > 0 {
        issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            category: IssueCategory::Pricing,
            message: format!("{negative} websites have a negative guest post cost"),
            affected_count: negative,
            suggestion: "Correct or clear negative prices before a live migration.".to_string(),
        });
    }

    if implausible > 0 {
        issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            category: IssueCategory::Pricing,
            message: format!(
                "{implausible} websites have a guest post cost outside ${MIN_GUEST_POST_PRICE:.0}-${MAX_GUEST_POST_PRICE:.0}"
            ),
            affected_count: implausible,
            suggestion: "Mappings with out-of-range prices are held back by the migrator."
                .to_string(),
        });
    }
}

fn check_name_variants(websites: &[LegacyWebsiteContact], issues: &mut Vec<ValidationIssue>) {
    let mut spellings: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for name in websites
        .iter()
        .filter_map(|website| website.contact_name.as_deref())
        .map(str::trim)
        .filter(|name| !name.is_empty())
    {
        spellings
            .entry(normalize_company_name(name))
            .or_default()
            .insert(name);
    }

    let variants: Vec<_> = spellings
        .values()
        .filter(|variants| variants.len() > 1)
        .collect();
    if variants.is_empty() {
        return;
    }

    let examples = variants
        .iter()
        .take(3)
        .map(|set| set.iter().copied().collect::<Vec<_>>().join(" / "))
        .collect::<Vec<_>>()
        .join("; ");

    issues.push(ValidationIssue {
        severity: IssueSeverity::Warning,
        category: IssueCategory::NameVariants,
        message: format!(
            "{} publisher names appear with different casing ({examples})",
            variants.len()
        ),
        affected_count: variants.len(),
        suggestion: "Variants are matched case-insensitively and collapse into one publisher."
            .to_string(),
    });
}

fn check_existing_publishers(publishers: &[Publisher], issues: &mut Vec<ValidationIssue>) {
    let manual = publishers
        .iter()
        .filter(|publisher| publisher.source != RecordSource::LegacyMigration)
        .count();
    if manual == 0 {
        return;
    }

    issues.push(ValidationIssue {
        severity: IssueSeverity::Info,
        category: IssueCategory::ExistingPublishers,
        message: format!("{manual} publishers already exist outside the migration"),
        affected_count: manual,
        suggestion: "Matching company names will be linked to these publishers instead of creating new ones."
            .to_string(),
    });
}

fn check_completeness(websites: &[LegacyWebsiteContact], issues: &mut Vec<ValidationIssue>) -> f64 {
    const FIELDS_PER_WEBSITE: usize = 4;

    if websites.is_empty() {
        issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            category: IssueCategory::Completeness,
            message: "No legacy websites found".to_string(),
            affected_count: 0,
            suggestion: "Confirm the legacy export or database connection before migrating."
                .to_string(),
        });
        return 0.0;
    }

    let populated: usize = websites
        .iter()
        .map(|website| {
            [
                website.normalized_email().is_some(),
                website.guest_post_cost.is_some(),
                website.avg_response_time_hours.is_some(),
                website.success_rate_percentage.is_some(),
            ]
            .into_iter()
            .filter(|present| *present)
            .count()
        })
        .sum();
    let total = websites.len() * FIELDS_PER_WEBSITE;
    let pct = (populated as f64 / total as f64 * 1000.0).round() / 10.0;
    let incomplete = websites
        .iter()
        .filter(|website| {
            website.normalized_email().is_none()
                || website.guest_post_cost.is_none()
                || !website.has_metrics()
        })
        .count();

    let severity = if pct < LOW_COMPLETENESS_PCT {
        IssueSeverity::Warning
    } else {
        IssueSeverity::Info
    };
    issues.push(ValidationIssue {
        severity,
        category: IssueCategory::Completeness,
        message: format!("Legacy data is {pct:.1}% complete"),
        affected_count: incomplete,
        suggestion: "Fill in pricing and performance fields to raise publisher confidence scores."
            .to_string(),
    });

    pct
}

fn check_performance_metrics(
    websites: &[LegacyWebsiteContact],
    issues: &mut Vec<ValidationIssue>,
) {
    let out_of_range = websites
        .iter()
        .filter(|website| {
            let response_bad = website
                .avg_response_time_hours
                .is_some_and(|hours| !(0.0..=MAX_RESPONSE_TIME_HOURS).contains(&hours));
            let success_bad = website
                .success_rate_percentage
                .is_some_and(|rate| !(0.0..=MAX_SUCCESS_RATE).contains(&rate));
            response_bad || success_bad
        })
        .count();
    if out_of_range == 0 {
        return;
    }

    issues.push(ValidationIssue {
        severity: IssueSeverity::Warning,
        category: IssueCategory::PerformanceMetrics,
        message: format!(
            "{out_of_range} websites report response times outside 0-168h or success rates outside 0-100%"
        ),
        affected_count: out_of_range,
        suggestion: "Out-of-range metrics are carried over as-is; review them after migration."
            .to_string(),
    });
}
