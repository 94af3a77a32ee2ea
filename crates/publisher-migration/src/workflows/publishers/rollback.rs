use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use super::domain::{
    AccountStatus, OfferingId, OfferingStatus, PublisherId, RecordSource, RelationshipId,
    WebsiteId,
};
use super::repository::{MigrationStore, RepositoryError};
use super::status::SessionId;

const SECONDS_PER_RECORD: f64 = 0.1;
const MIN_ESTIMATED_SECONDS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    pub fn generate() -> Self {
        Self(format!("snap-{}", Uuid::new_v4().simple()))
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotKind {
    PreMigration,
    Manual,
}

/// Id-sets of migration-sourced records present at a point in time. Immutable once saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackSnapshot {
    pub id: SnapshotId,
    pub session_id: SessionId,
    pub kind: SnapshotKind,
    pub description: String,
    pub taken_at: DateTime<Utc>,
    pub publisher_ids: BTreeSet<PublisherId>,
    pub offering_ids: BTreeSet<OfferingId>,
    pub relationship_ids: BTreeSet<RelationshipId>,
    pub affected_website_ids: BTreeSet<WebsiteId>,
}

pub trait SnapshotStore: Send + Sync {
    /// Fails with `RollbackError::SnapshotExists` if the id was already saved.
    fn save(&self, snapshot: RollbackSnapshot) -> Result<(), RollbackError>;
    fn get(&self, id: &SnapshotId) -> Result<Option<RollbackSnapshot>, RollbackError>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<Mutex<HashMap<SnapshotId, RollbackSnapshot>>>,
}

impl SnapshotStore for InMemorySnapshotStore {
    fn save(&self, snapshot: RollbackSnapshot) -> Result<(), RollbackError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|_| RollbackError::SnapshotStore("snapshot mutex poisoned".to_string()))?;
        if guard.contains_key(&snapshot.id) {
            return Err(RollbackError::SnapshotExists(snapshot.id));
        }
        guard.insert(snapshot.id.clone(), snapshot);
        Ok(())
    }

    fn get(&self, id: &SnapshotId) -> Result<Option<RollbackSnapshot>, RollbackError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|_| RollbackError::SnapshotStore("snapshot mutex poisoned".to_string()))?;
        Ok(guard.get(id).cloned())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackActionKind {
    DeleteRelationships,
    DeleteDraftOfferings,
    ArchiveActiveOfferings,
    DeleteShadowPublishers,
    FlagPublishersForReview,
}

impl RollbackActionKind {
    pub const fn risk(self) -> RiskLevel {
        match self {
            Self::DeleteRelationships
            | Self::DeleteDraftOfferings
            | Self::DeleteShadowPublishers => RiskLevel::Low,
            Self::ArchiveActiveOfferings => RiskLevel::Medium,
            Self::FlagPublishersForReview => RiskLevel::High,
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::DeleteRelationships => "Delete publisher-website relationships",
            Self::DeleteDraftOfferings => "Delete draft offerings",
            Self::ArchiveActiveOfferings => "Archive active offerings that orders may reference",
            Self::DeleteShadowPublishers => "Delete unclaimed shadow publishers",
            Self::FlagPublishersForReview => "Move claimed publishers to manual review",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum RollbackTarget {
    Relationship(RelationshipId),
    Offering(OfferingId),
    Publisher(PublisherId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackAction {
    pub kind: RollbackActionKind,
    pub risk: RiskLevel,
    pub description: String,
    pub record_count: usize,
    pub targets: Vec<RollbackTarget>,
}

impl RollbackAction {
    fn new(kind: RollbackActionKind, targets: Vec<RollbackTarget>) -> Self {
        Self {
            kind,
            risk: kind.risk(),
            description: kind.description().to_string(),
            record_count: targets.len(),
            targets,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollbackPlan {
    pub snapshot_id: SnapshotId,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    /// In execution order: relationships, offerings, then publishers.
    pub actions: Vec<RollbackAction>,
    pub total_records: usize,
    pub estimated_duration_secs: u64,
    pub warnings: Vec<String>,
}

impl RollbackPlan {
    pub fn has_high_risk(&self) -> bool {
        self.actions
            .iter()
            .any(|action| action.risk == RiskLevel::High)
    }

    pub fn action(&self, kind: RollbackActionKind) -> Option<&RollbackAction> {
        self.actions.iter().find(|action| action.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub kind: RollbackActionKind,
    pub attempted: usize,
    pub succeeded: usize,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackExecution {
    pub snapshot_id: SnapshotId,
    pub actions: Vec<ActionOutcome>,
    pub total_succeeded: usize,
    pub total_failed: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetySeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SafetyIssue {
    pub severity: SafetySeverity,
    pub message: String,
    pub affected_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RollbackSafetyReport {
    pub snapshot_id: SnapshotId,
    pub safe: bool,
    pub issues: Vec<SafetyIssue>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmergencyRollbackReport {
    pub relationships_deleted: usize,
    pub offerings_deleted: usize,
    pub publishers_deleted: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    #[error("snapshot {0} not found")]
    SnapshotNotFound(SnapshotId),
    #[error("snapshot {0} already exists")]
    SnapshotExists(SnapshotId),
    #[error("plan contains {actions} high-risk actions; re-run with force to execute")]
    HighRiskRequiresForce { actions: usize },
    #[error(transparent)]
    Store(#[from] RepositoryError),
    #[error("snapshot store unavailable: {0}")]
    SnapshotStore(String),
}

/// Records created since a snapshot, split the way the plan and the safety check need them.
struct RollbackCandidates {
    relationships: Vec<RelationshipId>,
    draft_offerings: Vec<OfferingId>,
    active_offerings: Vec<OfferingId>,
    shadow_publishers: Vec<PublisherId>,
    claimed_publishers: Vec<PublisherId>,
    /// Shadow publishers that keep an offering after the rollback and so cannot be deleted.
    retained_shadow_publishers: Vec<PublisherId>,
}

/// Snapshot, plan, and reversal of migration writes.
pub struct RollbackService<S> {
    store: Arc<S>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl<S> RollbackService<S>
where
    S: MigrationStore + 'static,
{
    pub fn new(store: Arc<S>, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self { store, snapshots }
    }

    pub fn create_snapshot(
        &self,
        session_id: &SessionId,
        kind: SnapshotKind,
        description: impl Into<String>,
    ) -> Result<SnapshotId, RollbackError> {
        let publishers: BTreeSet<PublisherId> = self
            .store
            .publishers()?
            .into_iter()
            .filter(|publisher| publisher.source == RecordSource::LegacyMigration)
            .map(|publisher| publisher.id)
            .collect();
        let offerings = self.store.offerings()?;
        let relationships = self.store.relationships()?;

        let mut affected_website_ids = BTreeSet::new();
        let offering_ids = offerings
            .into_iter()
            .filter(|offering| offering.source == RecordSource::LegacyMigration)
            .map(|offering| {
                affected_website_ids.insert(offering.website_id);
                offering.id
            })
            .collect();
        let relationship_ids = relationships
            .into_iter()
            .filter(|relationship| relationship.source == RecordSource::LegacyMigration)
            .map(|relationship| {
                affected_website_ids.insert(relationship.website_id);
                relationship.id
            })
            .collect();

        let snapshot = RollbackSnapshot {
            id: SnapshotId::generate(),
            session_id: session_id.clone(),
            kind,
            description: description.into(),
            taken_at: Utc::now(),
            publisher_ids: publishers,
            offering_ids,
            relationship_ids,
            affected_website_ids,
        };
        let id = snapshot.id.clone();
        info!(
            snapshot_id = %id,
            session_id = %session_id,
            publishers = snapshot.publisher_ids.len(),
            offerings = snapshot.offering_ids.len(),
            relationships = snapshot.relationship_ids.len(),
            "rollback snapshot captured"
        );
        self.snapshots.save(snapshot)?;
        Ok(id)
    }

    pub fn snapshot(&self, snapshot_id: &SnapshotId) -> Result<RollbackSnapshot, RollbackError> {
        self.snapshots
            .get(snapshot_id)?
            .ok_or_else(|| RollbackError::SnapshotNotFound(snapshot_id.clone()))
    }

    pub fn create_rollback_plan(
        &self,
        snapshot_id: &SnapshotId,
    ) -> Result<RollbackPlan, RollbackError> {
        let snapshot = self.snapshot(snapshot_id)?;
        let candidates = self.candidates(&snapshot)?;

        let mut warnings = Vec::new();
        if !candidates.claimed_publishers.is_empty() {
            warnings.push(format!(
                "{} publishers were claimed after the snapshot and will be moved to manual review instead of deleted",
                candidates.claimed_publishers.len()
            ));
        }
        if !candidates.retained_shadow_publishers.is_empty() {
            warnings.push(format!(
                "{} shadow publishers keep archived offerings and need manual review",
                candidates.retained_shadow_publishers.len()
            ));
        }
        if !candidates.active_offerings.is_empty() {
            warnings.push(format!(
                "{} active offerings will be archived rather than deleted because orders may reference them",
                candidates.active_offerings.len()
            ));
        }

        let review: Vec<RollbackTarget> = candidates
            .claimed_publishers
            .iter()
            .chain(&candidates.retained_shadow_publishers)
            .cloned()
            .map(RollbackTarget::Publisher)
            .collect();

        let actions: Vec<RollbackAction> = [
            RollbackAction::new(
                RollbackActionKind::DeleteRelationships,
                candidates
                    .relationships
                    .into_iter()
                    .map(RollbackTarget::Relationship)
                    .collect(),
            ),
            RollbackAction::new(
                RollbackActionKind::DeleteDraftOfferings,
                candidates
                    .draft_offerings
                    .into_iter()
                    .map(RollbackTarget::Offering)
                    .collect(),
            ),
            RollbackAction::new(
                RollbackActionKind::ArchiveActiveOfferings,
                candidates
                    .active_offerings
                    .into_iter()
                    .map(RollbackTarget::Offering)
                    .collect(),
            ),
            RollbackAction::new(
                RollbackActionKind::DeleteShadowPublishers,
                candidates
                    .shadow_publishers
                    .into_iter()
                    .map(RollbackTarget::Publisher)
                    .collect(),
            ),
            RollbackAction::new(RollbackActionKind::FlagPublishersForReview, review),
        ]
        .into_iter()
        .filter(|action| action.record_count > 0)
        .collect();

        let total_records = actions.iter().map(|action| action.record_count).sum();
        let plan = RollbackPlan {
            snapshot_id: snapshot.id,
            session_id: snapshot.session_id,
            created_at: Utc::now(),
            actions,
            total_records,
            estimated_duration_secs: estimate_duration_secs(total_records),
            warnings,
        };
        info!(
            snapshot_id = %plan.snapshot_id,
            actions = plan.actions.len(),
            records = plan.total_records,
            high_risk = plan.has_high_risk(),
            "rollback plan created"
        );
        Ok(plan)
    }

    pub fn execute_rollback(
        &self,
        plan: &RollbackPlan,
        force: bool,
    ) -> Result<RollbackExecution, RollbackError> {
        let high_risk = plan
            .actions
            .iter()
            .filter(|action| action.risk == RiskLevel::High)
            .count();
        if high_risk > 0 && !force {
            return Err(RollbackError::HighRiskRequiresForce { actions: high_risk });
        }

        let clock = Instant::now();
        let mut outcomes = Vec::with_capacity(plan.actions.len());
        for action in &plan.actions {
            let mut outcome = ActionOutcome {
                kind: action.kind,
                attempted: 0,
                succeeded: 0,
                errors: Vec::new(),
            };
            for target in &action.targets {
                outcome.attempted += 1;
                match self.apply(action.kind, target) {
                    Ok(()) => outcome.succeeded += 1,
                    Err(err) => {
                        warn!(kind = ?action.kind, ?target, error = %err, "rollback action failed");
                        outcome.errors.push(err.to_string());
                    }
                }
            }
            outcomes.push(outcome);
        }

        let total_succeeded = outcomes.iter().map(|outcome| outcome.succeeded).sum();
        let total_failed = outcomes.iter().map(|outcome| outcome.errors.len()).sum();
        let execution = RollbackExecution {
            snapshot_id: plan.snapshot_id.clone(),
            actions: outcomes,
            total_succeeded,
            total_failed,
            duration_ms: clock.elapsed().as_millis() as u64,
        };
        info!(
            snapshot_id = %execution.snapshot_id,
            succeeded = execution.total_succeeded,
            failed = execution.total_failed,
            forced = force,
            "rollback executed"
        );
        Ok(execution)
    }

    pub fn validate_rollback_safety(
        &self,
        snapshot_id: &SnapshotId,
    ) -> Result<RollbackSafetyReport, RollbackError> {
        let snapshot = self.snapshot(snapshot_id)?;
        let candidates = self.candidates(&snapshot)?;
        let mut issues = Vec::new();

        if !candidates.claimed_publishers.is_empty() {
            issues.push(SafetyIssue {
                severity: SafetySeverity::Warning,
                message: format!(
                    "{} publishers have claimed their accounts since the snapshot",
                    candidates.claimed_publishers.len()
                ),
                affected_count: candidates.claimed_publishers.len(),
            });
        }

        let ordered: HashSet<OfferingId> = self
            .store
            .order_line_items()?
            .into_iter()
            .map(|item| item.offering_id)
            .collect();
        // Any active offering with orders blocks, whatever its source or age.
        let referenced = self
            .store
            .offerings()?
            .into_iter()
            .filter(|offering| {
                offering.status == OfferingStatus::Active && ordered.contains(&offering.id)
            })
            .count();
        if referenced > 0 {
            issues.push(SafetyIssue {
                severity: SafetySeverity::Error,
                message: format!("{referenced} active offerings are referenced by orders"),
                affected_count: referenced,
            });
        }

        let safe = !issues
            .iter()
            .any(|issue| issue.severity == SafetySeverity::Error);
        Ok(RollbackSafetyReport {
            snapshot_id: snapshot.id,
            safe,
            issues,
        })
    }

    /// Delete every migration-sourced record, ignoring snapshots and claim state. Disaster
    /// recovery only.
    pub fn emergency_rollback(&self) -> Result<EmergencyRollbackReport, RollbackError> {
        let clock = Instant::now();
        warn!("emergency rollback started: deleting all migration-sourced records");
        let mut report = EmergencyRollbackReport {
            relationships_deleted: 0,
            offerings_deleted: 0,
            publishers_deleted: 0,
            errors: Vec::new(),
            duration_ms: 0,
        };

        for relationship in self.store.relationships()? {
            if relationship.source != RecordSource::LegacyMigration {
                continue;
            }
            match self.store.delete_relationship(&relationship.id) {
                Ok(()) => report.relationships_deleted += 1,
                Err(err) => report.errors.push(err.to_string()),
            }
        }
        for offering in self.store.offerings()? {
            if offering.source != RecordSource::LegacyMigration {
                continue;
            }
            match self.store.delete_offering(&offering.id) {
                Ok(()) => report.offerings_deleted += 1,
                Err(err) => report.errors.push(err.to_string()),
            }
        }
        for publisher in self.store.publishers()? {
            if publisher.source != RecordSource::LegacyMigration {
                continue;
            }
            match self.store.delete_publisher(&publisher.id) {
                Ok(()) => report.publishers_deleted += 1,
                Err(err) => report.errors.push(err.to_string()),
            }
        }

        report.duration_ms = clock.elapsed().as_millis() as u64;
        warn!(
            relationships = report.relationships_deleted,
            offerings = report.offerings_deleted,
            publishers = report.publishers_deleted,
            errors = report.errors.len(),
            "emergency rollback finished"
        );
        Ok(report)
    }

    fn apply(
        &self,
        kind: RollbackActionKind,
        target: &RollbackTarget,
    ) -> Result<(), RepositoryError> {
        match (kind, target) {
            (RollbackActionKind::DeleteRelationships, RollbackTarget::Relationship(id)) => {
                self.store.delete_relationship(id)
            }
            (RollbackActionKind::DeleteDraftOfferings, RollbackTarget::Offering(id)) => {
                self.store.delete_offering(id)
            }
            (RollbackActionKind::ArchiveActiveOfferings, RollbackTarget::Offering(id)) => {
                self.store.update_offering_status(id, OfferingStatus::Archived)
            }
            (RollbackActionKind::DeleteShadowPublishers, RollbackTarget::Publisher(id)) => {
                self.store.delete_publisher(id)
            }
            (RollbackActionKind::FlagPublishersForReview, RollbackTarget::Publisher(id)) => {
                self.store
                    .update_publisher_status(id, AccountStatus::ManualReview)
            }
            (kind, target) => Err(RepositoryError::Conflict(format!(
                "{kind:?} cannot apply to {target:?}"
            ))),
        }
    }

    fn candidates(&self, snapshot: &RollbackSnapshot) -> Result<RollbackCandidates, RollbackError> {
        let publishers = self.store.publishers()?;
        let offerings = self.store.offerings()?;
        let relationships = self.store.relationships()?;

        let new_relationships: Vec<RelationshipId> = relationships
            .iter()
            .filter(|relationship| {
                relationship.source == RecordSource::LegacyMigration
                    && !snapshot.relationship_ids.contains(&relationship.id)
            })
            .map(|relationship| relationship.id.clone())
            .collect();

        let mut draft_offerings = Vec::new();
        let mut active_offerings = Vec::new();
        for offering in offerings.iter().filter(|offering| {
            offering.source == RecordSource::LegacyMigration
                && !snapshot.offering_ids.contains(&offering.id)
        }) {
            match offering.status {
                OfferingStatus::Draft => draft_offerings.push(offering.id.clone()),
                OfferingStatus::Active => active_offerings.push(offering.id.clone()),
                OfferingStatus::Archived => {}
            }
        }

        let deleted_offerings: HashSet<&OfferingId> = draft_offerings.iter().collect();
        let deleted_relationships: HashSet<&RelationshipId> = new_relationships.iter().collect();
        let mut owners_with_surviving_records: HashSet<&PublisherId> = offerings
            .iter()
            .filter(|offering| !deleted_offerings.contains(&offering.id))
            .map(|offering| &offering.publisher_id)
            .collect();
        owners_with_surviving_records.extend(
            relationships
                .iter()
                .filter(|relationship| !deleted_relationships.contains(&relationship.id))
                .map(|relationship| &relationship.publisher_id),
        );

        let mut shadow_publishers = Vec::new();
        let mut claimed_publishers = Vec::new();
        let mut retained_shadow_publishers = Vec::new();
        for publisher in publishers.iter().filter(|publisher| {
            publisher.source == RecordSource::LegacyMigration
                && !snapshot.publisher_ids.contains(&publisher.id)
        }) {
            match publisher.account_status {
                AccountStatus::Shadow if owners_with_surviving_records.contains(&publisher.id) => {
                    retained_shadow_publishers.push(publisher.id.clone())
                }
                AccountStatus::Shadow => shadow_publishers.push(publisher.id.clone()),
                AccountStatus::Active | AccountStatus::ManualReview => {
                    claimed_publishers.push(publisher.id.clone())
                }
            }
        }

        Ok(RollbackCandidates {
            relationships: new_relationships,
            draft_offerings,
            active_offerings,
            shadow_publishers,
            claimed_publishers,
            retained_shadow_publishers,
        })
    }
}

fn estimate_duration_secs(records: usize) -> u64 {
    let estimate = (records as f64 * SECONDS_PER_RECORD).ceil() as u64;
    estimate.max(MIN_ESTIMATED_SECONDS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_estimate_has_floor() {
        assert_eq!(estimate_duration_secs(0), 5);
        assert_eq!(estimate_duration_secs(49), 5);
        assert_eq!(estimate_duration_secs(120), 12);
    }

    #[test]
    fn only_review_is_high_risk() {
        assert_eq!(
            RollbackActionKind::FlagPublishersForReview.risk(),
            RiskLevel::High
        );
        assert_eq!(
            RollbackActionKind::ArchiveActiveOfferings.risk(),
            RiskLevel::Medium
        );
        assert_eq!(
            RollbackActionKind::DeleteShadowPublishers.risk(),
            RiskLevel::Low
        );
    }
}
