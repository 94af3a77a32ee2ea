use std::sync::{Arc, Mutex, MutexGuard};

use super::domain::{
    normalize_company_name, normalize_email, AccountStatus, LegacyWebsiteContact, Offering,
    OfferingId, OfferingStatus, OrderLineItem, PerformanceRecord, Publisher, PublisherId,
    PublisherWebsiteRelationship, RecordSource, RelationshipId,
};
use super::repository::{MigrationStore, RepositoryError};

#[derive(Debug, Default)]
struct StoreState {
    legacy: Vec<LegacyWebsiteContact>,
    publishers: Vec<Publisher>,
    offerings: Vec<Offering>,
    relationships: Vec<PublisherWebsiteRelationship>,
    performance: Vec<PerformanceRecord>,
    order_line_items: Vec<OrderLineItem>,
    unavailable: bool,
}

/// Process-local store used by the CLI, the API service and tests.
///
/// Enforces the same uniqueness rules the relational schema does: one publisher per email, one
/// offering per (publisher, website, type), one relationship per (publisher, website).
#[derive(Debug, Default, Clone)]
pub struct InMemoryMigrationStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryMigrationStore {
    pub fn with_legacy(rows: Vec<LegacyWebsiteContact>) -> Self {
        let store = Self::default();
        store.state_unchecked().legacy = rows;
        store
    }

    pub fn replace_legacy(&self, rows: Vec<LegacyWebsiteContact>) {
        self.state_unchecked().legacy = rows;
    }

    pub fn add_order_line_item(&self, item: OrderLineItem) {
        self.state_unchecked().order_line_items.push(item);
    }

    /// Simulates the store going away; every call fails with `Unavailable` until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state_unchecked().unavailable = unavailable;
    }

    fn state_unchecked(&self) -> MutexGuard<'_, StoreState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        let guard = self
            .state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))?;
        if guard.unavailable {
            return Err(RepositoryError::Unavailable(
                "store connection refused".to_string(),
            ));
        }
        Ok(guard)
    }
}

impl MigrationStore for InMemoryMigrationStore {
    fn legacy_websites(&self) -> Result<Vec<LegacyWebsiteContact>, RepositoryError> {
        Ok(self.state()?.legacy.clone())
    }

    fn publishers(&self) -> Result<Vec<Publisher>, RepositoryError> {
        Ok(self.state()?.publishers.clone())
    }

    fn find_publisher_by_company(
        &self,
        company_name: &str,
    ) -> Result<Option<Publisher>, RepositoryError> {
        let wanted = normalize_company_name(company_name);
        let state = self.state()?;
        Ok(state
            .publishers
            .iter()
            .find(|publisher| normalize_company_name(&publisher.company_name) == wanted)
            .cloned())
    }

    fn insert_publisher(&self, publisher: Publisher) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let email = normalize_email(&publisher.email);
        if state
            .publishers
            .iter()
            .any(|existing| {
                existing.id == publisher.id || normalize_email(&existing.email) == email
            })
        {
            return Err(RepositoryError::Conflict(format!("publisher {email}")));
        }
        state.publishers.push(publisher);
        Ok(())
    }

    fn update_publisher_status(
        &self,
        id: &PublisherId,
        status: AccountStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let publisher = state
            .publishers
            .iter_mut()
            .find(|publisher| &publisher.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("publisher {id}")))?;
        publisher.account_status = status;
        Ok(())
    }

    fn delete_publisher(&self, id: &PublisherId) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let owns_records = state.offerings.iter().any(|item| &item.publisher_id == id)
            || state.relationships.iter().any(|item| &item.publisher_id == id);
        if owns_records {
            return Err(RepositoryError::Conflict(format!(
                "publisher {id} still owns offerings or relationships"
            )));
        }
        let before = state.publishers.len();
        state.publishers.retain(|publisher| &publisher.id != id);
        if state.publishers.len() == before {
            return Err(RepositoryError::NotFound(format!("publisher {id}")));
        }
        state.performance.retain(|record| &record.publisher_id != id);
        Ok(())
    }

    fn offerings(&self) -> Result<Vec<Offering>, RepositoryError> {
        Ok(self.state()?.offerings.clone())
    }

    fn insert_offering(&self, offering: Offering) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        if !state
            .publishers
            .iter()
            .any(|publisher| publisher.id == offering.publisher_id)
        {
            return Err(RepositoryError::NotFound(format!(
                "publisher {}",
                offering.publisher_id
            )));
        }
        if state.offerings.iter().any(|existing| {
            existing.id == offering.id
                || (existing.publisher_id == offering.publisher_id
                    && existing.website_id == offering.website_id
                    && existing.offering_type == offering.offering_type)
        }) {
            return Err(RepositoryError::Conflict(format!(
                "offering for website {}",
                offering.website_id
            )));
        }
        state.offerings.push(offering);
        Ok(())
    }

    fn update_offering_status(
        &self,
        id: &OfferingId,
        status: OfferingStatus,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let offering = state
            .offerings
            .iter_mut()
            .find(|offering| &offering.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("offering {id}")))?;
        offering.status = status;
        Ok(())
    }

    fn delete_offering(&self, id: &OfferingId) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let before = state.offerings.len();
        state.offerings.retain(|offering| &offering.id != id);
        if state.offerings.len() == before {
            return Err(RepositoryError::NotFound(format!("offering {id}")));
        }
        Ok(())
    }

    fn relationships(&self) -> Result<Vec<PublisherWebsiteRelationship>, RepositoryError> {
        Ok(self.state()?.relationships.clone())
    }

    fn insert_relationship(
        &self,
        relationship: PublisherWebsiteRelationship,
    ) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        if !state
            .publishers
            .iter()
            .any(|publisher| publisher.id == relationship.publisher_id)
        {
            return Err(RepositoryError::NotFound(format!(
                "publisher {}",
                relationship.publisher_id
            )));
        }
        if state.relationships.iter().any(|existing| {
            existing.id == relationship.id
                || (existing.publisher_id == relationship.publisher_id
                    && existing.website_id == relationship.website_id)
        }) {
            return Err(RepositoryError::Conflict(format!(
                "relationship for website {}",
                relationship.website_id
            )));
        }
        state.relationships.push(relationship);
        Ok(())
    }

    fn delete_relationship(&self, id: &RelationshipId) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        let before = state.relationships.len();
        state.relationships.retain(|relationship| &relationship.id != id);
        if state.relationships.len() == before {
            return Err(RepositoryError::NotFound(format!("relationship {id}")));
        }
        Ok(())
    }

    fn performance_records(&self) -> Result<Vec<PerformanceRecord>, RepositoryError> {
        Ok(self.state()?.performance.clone())
    }

    fn insert_performance(&self, record: PerformanceRecord) -> Result<(), RepositoryError> {
        let mut state = self.state()?;
        if !state
            .publishers
            .iter()
            .any(|publisher| publisher.id == record.publisher_id)
        {
            return Err(RepositoryError::NotFound(format!(
                "publisher {}",
                record.publisher_id
            )));
        }
        if record.source == RecordSource::LegacyMigration
            && state.performance.iter().any(|existing| {
                existing.id == record.id
                    || (existing.source == RecordSource::LegacyMigration
                        && existing.publisher_id == record.publisher_id)
            })
        {
            return Err(RepositoryError::Conflict(format!(
                "performance record for publisher {}",
                record.publisher_id
            )));
        }
        state.performance.push(record);
        Ok(())
    }

    fn order_line_items(&self) -> Result<Vec<OrderLineItem>, RepositoryError> {
        Ok(self.state()?.order_line_items.clone())
    }
}
