use std::collections::HashSet;

use async_trait::async_trait;
use common::{AssociationValue, SagaId};

use crate::{
    Cache, CacheConfig, LruSagaCache, Result, SagaRecord, SagaStore,
};

/// Cache key for association lookups: (saga type, association value).
type AssociationKey = (String, AssociationValue);

/// Write-through caching decorator over any [`SagaStore`].
///
/// Reads check the cache first and fall back to the inner store,
/// populating the cache on the way out. Writes always reach the inner
/// store first; cache entries are only touched after the write
/// succeeded, so a failed write can never leave the cache ahead of
/// durable state.
///
/// Two independent caches are kept: saga records by identifier, and
/// identifier sets by (saga type, association value). Record misses are
/// not cached; an association lookup that was invalidated by a write is
/// simply re-fetched on the next call.
pub struct CachingSagaStore<S> {
    inner: S,
    sagas: Box<dyn Cache<SagaId, SagaRecord>>,
    associations: Box<dyn Cache<AssociationKey, HashSet<SagaId>>>,
}

impl<S: SagaStore> CachingSagaStore<S> {
    /// Wraps a store with LRU caches sized from [`CacheConfig::default`].
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, CacheConfig::default())
    }

    /// Wraps a store with LRU caches sized from the given configuration.
    pub fn with_config(inner: S, config: CacheConfig) -> Self {
        Self {
            inner,
            sagas: Box::new(LruSagaCache::new(config.saga_capacity)),
            associations: Box::new(LruSagaCache::new(config.association_capacity)),
        }
    }

    /// Wraps a store with caller-provided cache backends.
    pub fn with_caches(
        inner: S,
        sagas: Box<dyn Cache<SagaId, SagaRecord>>,
        associations: Box<dyn Cache<AssociationKey, HashSet<SagaId>>>,
    ) -> Self {
        Self {
            inner,
            sagas,
            associations,
        }
    }

    /// Returns the wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Drops every association-set entry the record's values could map
    /// to. Called after a successful write so stale sets are re-fetched
    /// rather than served.
    fn invalidate_associations(&self, saga_type: &str, values: &HashSet<AssociationValue>) {
        for value in values {
            self.associations
                .invalidate(&(saga_type.to_string(), value.clone()));
        }
    }

    /// Returns the record currently known for the id, preferring the
    /// cache. Used on the update/delete path to learn which association
    /// entries the write affects.
    async fn known_record(&self, saga_id: SagaId) -> Result<Option<SagaRecord>> {
        if let Some(record) = self.sagas.get(&saga_id) {
            return Ok(Some(record));
        }
        self.inner.load(saga_id).await
    }
}

#[async_trait]
impl<S: SagaStore> SagaStore for CachingSagaStore<S> {
    async fn insert(&self, record: SagaRecord) -> Result<()> {
        self.inner.insert(record.clone()).await?;

        self.invalidate_associations(&record.saga_type, &record.associations);
        self.sagas.put(record.saga_id, record);
        Ok(())
    }

    async fn update(&self, record: SagaRecord) -> Result<()> {
        let previous = self.known_record(record.saga_id).await?;

        self.inner.update(record.clone()).await?;

        // Entries for associations that were removed must go too,
        // or a lookup could keep resolving the old value to this saga.
        if let Some(previous) = previous {
            self.invalidate_associations(&previous.saga_type, &previous.associations);
        }
        self.invalidate_associations(&record.saga_type, &record.associations);
        self.sagas.put(record.saga_id, record);
        Ok(())
    }

    async fn delete(&self, saga_id: SagaId) -> Result<()> {
        let previous = self.known_record(saga_id).await?;

        self.inner.delete(saga_id).await?;

        if let Some(previous) = previous {
            self.invalidate_associations(&previous.saga_type, &previous.associations);
        }
        self.sagas.invalidate(&saga_id);
        Ok(())
    }

    async fn load(&self, saga_id: SagaId) -> Result<Option<SagaRecord>> {
        if let Some(record) = self.sagas.get(&saga_id) {
            metrics::counter!("saga_cache_hits_total").increment(1);
            return Ok(Some(record));
        }
        metrics::counter!("saga_cache_misses_total").increment(1);

        let record = self.inner.load(saga_id).await?;
        if let Some(ref record) = record {
            self.sagas.put(saga_id, record.clone());
        }
        Ok(record)
    }

    async fn find_by_association(
        &self,
        saga_type: &str,
        value: &AssociationValue,
    ) -> Result<HashSet<SagaId>> {
        let key = (saga_type.to_string(), value.clone());
        if let Some(ids) = self.associations.get(&key) {
            metrics::counter!("association_cache_hits_total").increment(1);
            return Ok(ids);
        }
        metrics::counter!("association_cache_misses_total").increment(1);

        let ids = self.inner.find_by_association(saga_type, value).await?;
        if !ids.is_empty() {
            self.associations.put(key, ids.clone());
        }
        Ok(ids)
    }
}
