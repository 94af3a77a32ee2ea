use super::domain::{
    AccountStatus, LegacyWebsiteContact, Offering, OfferingId, OfferingStatus, OrderLineItem,
    PerformanceRecord, Publisher, PublisherId, PublisherWebsiteRelationship, RelationshipId,
};

/// Storage abstraction over the relational tables the migration reads and writes.
///
/// Every call is its own unit of work; nothing spans a whole migration run, which is why the
/// migrator isolates failures per record.
pub trait MigrationStore: Send + Sync {
    /// Legacy website rows joined with their contact, including websites without one.
    fn legacy_websites(&self) -> Result<Vec<LegacyWebsiteContact>, RepositoryError>;

    fn publishers(&self) -> Result<Vec<Publisher>, RepositoryError>;
    fn find_publisher_by_company(
        &self,
        company_name: &str,
    ) -> Result<Option<Publisher>, RepositoryError>;
    fn insert_publisher(&self, publisher: Publisher) -> Result<(), RepositoryError>;
    fn update_publisher_status(
        &self,
        id: &PublisherId,
        status: AccountStatus,
    ) -> Result<(), RepositoryError>;
    /// Fails with `Conflict` while the publisher still owns offerings or relationships.
    fn delete_publisher(&self, id: &PublisherId) -> Result<(), RepositoryError>;

    fn offerings(&self) -> Result<Vec<Offering>, RepositoryError>;
    fn insert_offering(&self, offering: Offering) -> Result<(), RepositoryError>;
    fn update_offering_status(
        &self,
        id: &OfferingId,
        status: OfferingStatus,
    ) -> Result<(), RepositoryError>;
    fn delete_offering(&self, id: &OfferingId) -> Result<(), RepositoryError>;

    fn relationships(&self) -> Result<Vec<PublisherWebsiteRelationship>, RepositoryError>;
    fn insert_relationship(
        &self,
        relationship: PublisherWebsiteRelationship,
    ) -> Result<(), RepositoryError>;
    fn delete_relationship(&self, id: &RelationshipId) -> Result<(), RepositoryError>;

    fn performance_records(&self) -> Result<Vec<PerformanceRecord>, RepositoryError>;
    fn insert_performance(&self, record: PerformanceRecord) -> Result<(), RepositoryError>;

    fn order_line_items(&self) -> Result<Vec<OrderLineItem>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
