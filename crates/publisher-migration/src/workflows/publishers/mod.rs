//! Legacy website/contact migration into shadow publishers, draft offerings, relationships, and
//! performance records.
//!
//! The [`MigrationOrchestrator`] ties the pieces together: the read-only validator, the
//! six-phase migrator, the snapshot-based rollback service, the status tracker, and the
//! notifier. Storage sits behind [`MigrationStore`]; [`InMemoryMigrationStore`] backs the CLI,
//! the service, and the tests.

pub(crate) mod confidence;
pub mod domain;
pub mod import;
pub(crate) mod mapping;
pub mod memory;
pub mod migrator;
pub mod notifier;
pub mod repository;
pub mod rollback;
pub mod router;
pub mod service;
pub mod status;
pub mod validator;

#[cfg(test)]
mod tests;

pub use confidence::{confidence_score, ConfidenceSignals};
pub use domain::{
    AccountStatus, LegacyWebsiteContact, Offering, OfferingId, OfferingStatus, OfferingType,
    OrderId, OrderLineItem, PerformanceRecord, Publisher, PublisherId,
    PublisherWebsiteRelationship, RecordSource, RelationshipId, WebsiteId,
};
pub use import::{LegacyExportImporter, LegacyImportError};
pub use mapping::{build_mappings, PublisherMapping};
pub use memory::InMemoryMigrationStore;
pub use migrator::{
    MigrationError, MigrationIssue, MigrationIssueKind, MigrationOptions, MigrationStats,
    PhaseObserver, PublisherMigrator, SkippedMapping,
};
pub use notifier::{
    NotificationConfig, NotificationEvent, NotificationFrequency, Notifier, NotifyOutcome,
};
pub use repository::{MigrationStore, RepositoryError};
pub use rollback::{
    InMemorySnapshotStore, RiskLevel, RollbackActionKind, RollbackError, RollbackPlan,
    RollbackService, RollbackSnapshot, SnapshotId, SnapshotKind, SnapshotStore,
};
pub use router::publisher_router;
pub use service::{
    MigrationOrchestrator, MigrationRequest, MigrationRunOutcome, MigrationServiceError,
    OrchestratorSettings, EMERGENCY_CONFIRMATION,
};
pub use status::{
    InMemorySessionStore, MigrationPhase, MigrationSession, SessionId, SessionKind,
    SessionStatus, StatusError, StatusTracker,
};
pub use validator::{
    IssueCategory, IssueSeverity, MigrationValidator, ValidationError, ValidationReport,
};
