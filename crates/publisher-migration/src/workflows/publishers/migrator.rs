use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::confidence::confidence_score;
use super::domain::{
    dollars_to_cents, normalize_company_name, normalize_email, AccountStatus, Offering,
    OfferingId, OfferingStatus, OfferingType, PerformanceRecord, PerformanceRecordId, Publisher,
    PublisherId, PublisherWebsiteRelationship, RecordSource, RelationshipId, WebsiteId,
};
use super::mapping::{build_mappings, PublisherMapping};
use super::repository::{MigrationStore, RepositoryError};
use super::status::MigrationPhase;

pub const MIN_GUEST_POST_PRICE: f64 = 10.0;
pub const MAX_GUEST_POST_PRICE: f64 = 10_000.0;
const PERFORMANCE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone)]
pub struct MigrationOptions {
    /// Run every decision but skip the writes.
    pub dry_run: bool,
    pub batch_size: usize,
    /// Pause between batches to stay under downstream rate limits.
    pub batch_delay: StdDuration,
    /// Reference instant for recency scoring and the performance window; defaults to now.
    pub as_of: Option<DateTime<Utc>>,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            batch_size: 50,
            batch_delay: StdDuration::ZERO,
            as_of: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationIssueKind {
    Pricing,
    PublisherLookup,
    PublisherCreation,
    OfferingCreation,
    RelationshipCreation,
    PerformanceMigration,
}

/// A per-record failure. Recorded and skipped; never aborts the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationIssue {
    pub kind: MigrationIssueKind,
    pub subject: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedMapping {
    pub contact_email: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStats {
    pub dry_run: bool,
    pub mappings_analyzed: usize,
    pub websites_processed: usize,
    pub shadow_publishers_created: usize,
    pub existing_publishers_reused: usize,
    pub offerings_created: usize,
    pub relationships_created: usize,
    pub performance_records_created: usize,
    pub skipped: Vec<SkippedMapping>,
    pub errors: Vec<MigrationIssue>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl MigrationStats {
    fn new(dry_run: bool, started_at: DateTime<Utc>) -> Self {
        Self {
            dry_run,
            mappings_analyzed: 0,
            websites_processed: 0,
            shadow_publishers_created: 0,
            existing_publishers_reused: 0,
            offerings_created: 0,
            relationships_created: 0,
            performance_records_created: 0,
            skipped: Vec::new(),
            errors: Vec::new(),
            started_at,
            duration_ms: 0,
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    fn record(&mut self, kind: MigrationIssueKind, subject: impl Into<String>, message: String) {
        let subject = subject.into();
        warn!(?kind, %subject, %message, "migration record failed");
        self.errors.push(MigrationIssue {
            kind,
            subject,
            message,
        });
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PhaseSummary {
    pub processed: usize,
    pub created: usize,
    pub errors: usize,
}

/// Hook for progress reporting; the orchestrator feeds it into the status tracker.
#[async_trait]
pub trait PhaseObserver: Send + Sync {
    async fn phase_started(&self, phase: MigrationPhase);
    async fn phase_finished(&self, phase: MigrationPhase, summary: PhaseSummary);
}

pub struct NoopObserver;

#[async_trait]
impl PhaseObserver for NoopObserver {
    async fn phase_started(&self, _phase: MigrationPhase) {}
    async fn phase_finished(&self, _phase: MigrationPhase, _summary: PhaseSummary) {}
}

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("unable to read legacy website contacts: {0}")]
    SourceUnavailable(#[source] RepositoryError),
}

/// Existing-record indexes consulted before every write, in both live and dry-run mode, so a
/// dry run reports the same conflicts a live run would hit.
#[derive(Default)]
struct KnownRecords {
    publisher_emails: HashSet<String>,
    publishers_by_company: HashMap<String, PublisherId>,
    offerings: HashSet<(PublisherId, WebsiteId, OfferingType)>,
    relationships: HashSet<(PublisherId, WebsiteId)>,
    performance: HashSet<PublisherId>,
}

/// Six-phase pipeline turning legacy website contacts into publisher records.
pub struct PublisherMigrator<S> {
    store: Arc<S>,
}

impl<S> PublisherMigrator<S>
where
    S: MigrationStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn migrate(
        &self,
        options: &MigrationOptions,
    ) -> Result<MigrationStats, MigrationError> {
        self.migrate_observed(options, &NoopObserver).await
    }

    pub async fn migrate_observed(
        &self,
        options: &MigrationOptions,
        observer: &dyn PhaseObserver,
    ) -> Result<MigrationStats, MigrationError> {
        let clock = Instant::now();
        let as_of = options.as_of.unwrap_or_else(Utc::now);
        let batch_size = options.batch_size.max(1);
        let mut stats = MigrationStats::new(options.dry_run, Utc::now());
        let mut known = KnownRecords::default();

        info!(dry_run = options.dry_run, batch_size, "publisher migration started");

        observer.phase_started(MigrationPhase::Analysis).await;
        let rows = self
            .store
            .legacy_websites()
            .map_err(MigrationError::SourceUnavailable)?;
        let mut mappings = build_mappings(&rows);
        stats.mappings_analyzed = mappings.len();
        stats.websites_processed = mappings.iter().map(|mapping| mapping.websites.len()).sum();
        observer
            .phase_finished(
                MigrationPhase::Analysis,
                PhaseSummary {
                    processed: rows.len(),
                    created: mappings.len(),
                    errors: 0,
                },
            )
            .await;

        observer.phase_started(MigrationPhase::LightValidation).await;
        let errors_before = stats.errors.len();
        let skipped_before = stats.skipped.len();
        mappings.retain(|mapping| mapping_is_eligible(mapping, &mut stats));
        observer
            .phase_finished(
                MigrationPhase::LightValidation,
                PhaseSummary {
                    processed: stats.mappings_analyzed,
                    created: mappings.len(),
                    errors: (stats.errors.len() - errors_before)
                        + (stats.skipped.len() - skipped_before),
                },
            )
            .await;

        observer.phase_started(MigrationPhase::ShadowPublishers).await;
        let summary = self
            .create_shadow_publishers(
                &mut mappings,
                options,
                as_of,
                batch_size,
                &mut known,
                &mut stats,
            )
            .await;
        observer
            .phase_finished(MigrationPhase::ShadowPublishers, summary)
            .await;

        observer.phase_started(MigrationPhase::Offerings).await;
        let summary = self
            .create_offerings(&mappings, options, batch_size, &mut known, &mut stats)
            .await;
        observer.phase_finished(MigrationPhase::Offerings, summary).await;

        observer.phase_started(MigrationPhase::Relationships).await;
        let summary = self
            .create_relationships(&mappings, options, batch_size, &mut known, &mut stats)
            .await;
        observer
            .phase_finished(MigrationPhase::Relationships, summary)
            .await;

        observer.phase_started(MigrationPhase::Performance).await;
        let summary = self
            .migrate_performance(&mappings, options, as_of, batch_size, &mut known, &mut stats)
            .await;
        observer
            .phase_finished(MigrationPhase::Performance, summary)
            .await;

        stats.duration_ms = clock.elapsed().as_millis() as u64;
        info!(
            dry_run = stats.dry_run,
            mappings = stats.mappings_analyzed,
            websites = stats.websites_processed,
            publishers_created = stats.shadow_publishers_created,
            publishers_reused = stats.existing_publishers_reused,
            offerings = stats.offerings_created,
            relationships = stats.relationships_created,
            performance = stats.performance_records_created,
            skipped = stats.skipped.len(),
            errors = stats.errors.len(),
            duration_ms = stats.duration_ms,
            "publisher migration finished"
        );

        Ok(stats)
    }

    async fn create_shadow_publishers(
        &self,
        mappings: &mut [PublisherMapping],
        options: &MigrationOptions,
        as_of: DateTime<Utc>,
        batch_size: usize,
        known: &mut KnownRecords,
        stats: &mut MigrationStats,
    ) -> PhaseSummary {
        let mut summary = PhaseSummary::default();
        match self.store.publishers() {
            Ok(existing) => {
                known.publisher_emails = existing
                    .iter()
                    .map(|publisher| normalize_email(&publisher.email))
                    .collect();
            }
            Err(err) => {
                stats.record(
                    MigrationIssueKind::PublisherLookup,
                    "publishers",
                    err.to_string(),
                );
                summary.errors += 1;
            }
        }

        for (index, batch) in mappings.chunks_mut(batch_size).enumerate() {
            pause_between_batches(index, options.batch_delay).await;

            for mapping in batch.iter_mut() {
                summary.processed += 1;
                mapping.confidence_score = confidence_score(mapping, as_of);
                let Some(company_name) = mapping.company_name.clone() else {
                    continue;
                };
                let company_key = normalize_company_name(&company_name);

                if let Some(id) = known.publishers_by_company.get(&company_key) {
                    mapping.publisher_id = Some(id.clone());
                    stats.existing_publishers_reused += 1;
                    continue;
                }

                match self.store.find_publisher_by_company(&company_name) {
                    Ok(Some(existing)) => {
                        debug!(
                            publisher_id = %existing.id,
                            company = %company_name,
                            "reusing existing publisher"
                        );
                        known
                            .publishers_by_company
                            .insert(company_key, existing.id.clone());
                        mapping.publisher_id = Some(existing.id);
                        stats.existing_publishers_reused += 1;
                        continue;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        stats.record(
                            MigrationIssueKind::PublisherLookup,
                            &mapping.contact_email,
                            err.to_string(),
                        );
                        summary.errors += 1;
                        continue;
                    }
                }

                if known.publisher_emails.contains(&mapping.contact_email) {
                    stats.record(
                        MigrationIssueKind::PublisherCreation,
                        &mapping.contact_email,
                        RepositoryError::Conflict(format!("publisher {}", mapping.contact_email))
                            .to_string(),
                    );
                    summary.errors += 1;
                    continue;
                }

                let publisher = Publisher {
                    id: PublisherId::generate(),
                    company_name: company_name.clone(),
                    email: mapping.contact_email.clone(),
                    account_status: AccountStatus::Shadow,
                    confidence_score: mapping.confidence_score,
                    invitation_token: Some(Uuid::new_v4().to_string()),
                    source: RecordSource::LegacyMigration,
                    created_at: Utc::now(),
                };
                let id = publisher.id.clone();

                let written = if options.dry_run {
                    Ok(())
                } else {
                    self.store.insert_publisher(publisher)
                };

                match written {
                    Ok(()) => {
                        known.publisher_emails.insert(mapping.contact_email.clone());
                        known.publishers_by_company.insert(company_key, id.clone());
                        mapping.publisher_id = Some(id);
                        stats.shadow_publishers_created += 1;
                        summary.created += 1;
                    }
                    Err(err) => {
                        stats.record(
                            MigrationIssueKind::PublisherCreation,
                            &mapping.contact_email,
                            err.to_string(),
                        );
                        summary.errors += 1;
                    }
                }
            }
        }

        summary
    }

    async fn create_offerings(
        &self,
        mappings: &[PublisherMapping],
        options: &MigrationOptions,
        batch_size: usize,
        known: &mut KnownRecords,
        stats: &mut MigrationStats,
    ) -> PhaseSummary {
        let mut summary = PhaseSummary::default();
        if let Ok(existing) = self.store.offerings() {
            known.offerings = existing
                .into_iter()
                .map(|offering| {
                    (
                        offering.publisher_id,
                        offering.website_id,
                        offering.offering_type,
                    )
                })
                .collect();
        }

        for (index, batch) in mappings.chunks(batch_size).enumerate() {
            pause_between_batches(index, options.batch_delay).await;

            for mapping in batch {
                let Some(publisher_id) = &mapping.publisher_id else {
                    continue;
                };

                for (website, cost) in mapping.priced_websites() {
                    summary.processed += 1;
                    let key = (
                        publisher_id.clone(),
                        website.website_id.clone(),
                        OfferingType::GuestPost,
                    );
                    if known.offerings.contains(&key) {
                        stats.record(
                            MigrationIssueKind::OfferingCreation,
                            &website.domain,
                            RepositoryError::Conflict(format!(
                                "offering for website {}",
                                website.website_id
                            ))
                            .to_string(),
                        );
                        summary.errors += 1;
                        continue;
                    }

                    let offering = Offering {
                        id: OfferingId::generate(),
                        publisher_id: publisher_id.clone(),
                        website_id: website.website_id.clone(),
                        offering_type: OfferingType::GuestPost,
                        base_price_cents: dollars_to_cents(cost),
                        status: OfferingStatus::Draft,
                        source: RecordSource::LegacyMigration,
                        created_at: Utc::now(),
                    };

                    let written = if options.dry_run {
                        Ok(())
                    } else {
                        self.store.insert_offering(offering)
                    };

                    match written {
                        Ok(()) => {
                            known.offerings.insert(key);
                            stats.offerings_created += 1;
                            summary.created += 1;
                        }
                        Err(err) => {
                            stats.record(
                                MigrationIssueKind::OfferingCreation,
                                &website.domain,
                                err.to_string(),
                            );
                            summary.errors += 1;
                        }
                    }
                }
            }
        }

        summary
    }

    async fn create_relationships(
        &self,
        mappings: &[PublisherMapping],
        options: &MigrationOptions,
        batch_size: usize,
        known: &mut KnownRecords,
        stats: &mut MigrationStats,
    ) -> PhaseSummary {
        let mut summary = PhaseSummary::default();
        if let Ok(existing) = self.store.relationships() {
            known.relationships = existing
                .into_iter()
                .map(|relationship| (relationship.publisher_id, relationship.website_id))
                .collect();
        }

        for (index, batch) in mappings.chunks(batch_size).enumerate() {
            pause_between_batches(index, options.batch_delay).await;

            for mapping in batch {
                let Some(publisher_id) = &mapping.publisher_id else {
                    continue;
                };

                for website in &mapping.websites {
                    summary.processed += 1;
                    let key = (publisher_id.clone(), website.website_id.clone());
                    if known.relationships.contains(&key) {
                        stats.record(
                            MigrationIssueKind::RelationshipCreation,
                            &website.domain,
                            RepositoryError::Conflict(format!(
                                "relationship for website {}",
                                website.website_id
                            ))
                            .to_string(),
                        );
                        summary.errors += 1;
                        continue;
                    }

                    let relationship = PublisherWebsiteRelationship {
                        id: RelationshipId::generate(),
                        publisher_id: publisher_id.clone(),
                        website_id: website.website_id.clone(),
                        confidence_score: mapping.confidence_score,
                        source: RecordSource::LegacyMigration,
                        created_at: Utc::now(),
                    };

                    let written = if options.dry_run {
                        Ok(())
                    } else {
                        self.store.insert_relationship(relationship)
                    };

                    match written {
                        Ok(()) => {
                            known.relationships.insert(key);
                            stats.relationships_created += 1;
                            summary.created += 1;
                        }
                        Err(err) => {
                            stats.record(
                                MigrationIssueKind::RelationshipCreation,
                                &website.domain,
                                err.to_string(),
                            );
                            summary.errors += 1;
                        }
                    }
                }
            }
        }

        summary
    }

    async fn migrate_performance(
        &self,
        mappings: &[PublisherMapping],
        options: &MigrationOptions,
        as_of: DateTime<Utc>,
        batch_size: usize,
        known: &mut KnownRecords,
        stats: &mut MigrationStats,
    ) -> PhaseSummary {
        let mut summary = PhaseSummary::default();
        if let Ok(existing) = self.store.performance_records() {
            known.performance = existing
                .into_iter()
                .filter(|record| record.source == RecordSource::LegacyMigration)
                .map(|record| record.publisher_id)
                .collect();
        }

        for (index, batch) in mappings.chunks(batch_size).enumerate() {
            pause_between_batches(index, options.batch_delay).await;

            for mapping in batch {
                let Some(publisher_id) = &mapping.publisher_id else {
                    continue;
                };
                summary.processed += 1;

                let Some(record) = aggregate_performance(mapping, publisher_id, as_of) else {
                    continue;
                };

                // Legacy metrics are lifetime aggregates, so one migrated record per publisher.
                if known.performance.contains(publisher_id) {
                    stats.record(
                        MigrationIssueKind::PerformanceMigration,
                        &mapping.contact_email,
                        RepositoryError::Conflict(format!(
                            "performance record for publisher {publisher_id}"
                        ))
                        .to_string(),
                    );
                    summary.errors += 1;
                    continue;
                }

                let written = if options.dry_run {
                    Ok(())
                } else {
                    self.store.insert_performance(record)
                };

                match written {
                    Ok(()) => {
                        known.performance.insert(publisher_id.clone());
                        stats.performance_records_created += 1;
                        summary.created += 1;
                    }
                    Err(err) => {
                        stats.record(
                            MigrationIssueKind::PerformanceMigration,
                            &mapping.contact_email,
                            err.to_string(),
                        );
                        summary.errors += 1;
                    }
                }
            }
        }

        summary
    }
}

fn mapping_is_eligible(mapping: &PublisherMapping, stats: &mut MigrationStats) -> bool {
    if mapping.company_name.is_none() {
        stats.skipped.push(SkippedMapping {
            contact_email: mapping.contact_email.clone(),
            reason: "missing company name".to_string(),
        });
        return false;
    }

    let mut eligible = true;
    for (website, cost) in mapping.priced_websites() {
        if !(MIN_GUEST_POST_PRICE..=MAX_GUEST_POST_PRICE).contains(&cost) {
            stats.record(
                MigrationIssueKind::Pricing,
                &website.domain,
                format!(
                    "guest post cost {cost:.2} outside {MIN_GUEST_POST_PRICE:.0}-{MAX_GUEST_POST_PRICE:.0}"
                ),
            );
            eligible = false;
        }
    }
    eligible
}

fn aggregate_performance(
    mapping: &PublisherMapping,
    publisher_id: &PublisherId,
    as_of: DateTime<Utc>,
) -> Option<PerformanceRecord> {
    let response_times: Vec<f64> = mapping
        .websites
        .iter()
        .filter_map(|website| website.avg_response_time_hours)
        .collect();
    let success_rates: Vec<f64> = mapping
        .websites
        .iter()
        .filter_map(|website| website.success_rate_percentage)
        .collect();

    if response_times.is_empty() && success_rates.is_empty() {
        return None;
    }

    Some(PerformanceRecord {
        id: PerformanceRecordId::generate(),
        publisher_id: publisher_id.clone(),
        window_start: as_of - Duration::days(PERFORMANCE_WINDOW_DAYS),
        window_end: as_of,
        avg_response_time_hours: mean(&response_times),
        success_rate_percentage: mean(&success_rates),
        websites_sampled: mapping
            .websites
            .iter()
            .filter(|website| website.has_metrics())
            .count(),
        source: RecordSource::LegacyMigration,
    })
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

async fn pause_between_batches(index: usize, delay: StdDuration) {
    if index > 0 && !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}
