use std::collections::HashSet;

use async_trait::async_trait;
use common::{AssociationValue, SagaId};

use crate::{Result, SagaRecord};

/// Core trait for saga storage backends.
///
/// A saga store persists one record per live saga instance and answers
/// association lookups over the records it holds. All implementations
/// must be thread-safe (Send + Sync); per-call atomicity guarantees are
/// backend-specific.
///
/// The store is the single source of durable truth. In-process caches
/// and indexes layered on top of it are derived, rebuildable views.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Inserts a record for a saga that has no record yet.
    ///
    /// Fails with `DuplicateIdentifier` if the identifier already has
    /// a record.
    async fn insert(&self, record: SagaRecord) -> Result<()>;

    /// Replaces the record of an existing saga.
    ///
    /// Fails with `NotFound` if no prior record exists.
    async fn update(&self, record: SagaRecord) -> Result<()>;

    /// Deletes a saga's record.
    ///
    /// Idempotent: deleting an absent identifier is not an error.
    async fn delete(&self, saga_id: SagaId) -> Result<()>;

    /// Loads a saga's record.
    ///
    /// Returns None if the identifier has no record.
    async fn load(&self, saga_id: SagaId) -> Result<Option<SagaRecord>>;

    /// Returns the identifiers of all sagas of the given type carrying
    /// the given association value.
    ///
    /// Reflects all committed inserts, updates and deletes at time of
    /// call.
    async fn find_by_association(
        &self,
        saga_type: &str,
        value: &AssociationValue,
    ) -> Result<HashSet<SagaId>>;
}
