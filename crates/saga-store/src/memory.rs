use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{AssociationValue, SagaId};
use tokio::sync::RwLock;

use crate::{Result, SagaRecord, SagaStore, SagaStoreError};

/// In-memory saga store for tests and single-process embedding.
///
/// This implementation keeps all records in memory and provides the
/// same interface and error semantics as a durable backend.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    records: Arc<RwLock<HashMap<SagaId, SagaRecord>>>,
}

impl InMemorySagaStore {
    /// Creates a new empty in-memory saga store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records stored.
    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Clears all records.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn insert(&self, record: SagaRecord) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.saga_id) {
            return Err(SagaStoreError::DuplicateIdentifier(record.saga_id));
        }
        records.insert(record.saga_id, record);
        Ok(())
    }

    async fn update(&self, record: SagaRecord) -> Result<()> {
        let mut records = self.records.write().await;
        let existing = records
            .get(&record.saga_id)
            .ok_or(SagaStoreError::NotFound(record.saga_id))?;
        let created_at = existing.created_at;
        let mut record = record.touched();
        record.created_at = created_at;
        records.insert(record.saga_id, record);
        Ok(())
    }

    async fn delete(&self, saga_id: SagaId) -> Result<()> {
        self.records.write().await.remove(&saga_id);
        Ok(())
    }

    async fn load(&self, saga_id: SagaId) -> Result<Option<SagaRecord>> {
        Ok(self.records.read().await.get(&saga_id).cloned())
    }

    async fn find_by_association(
        &self,
        saga_type: &str,
        value: &AssociationValue,
    ) -> Result<HashSet<SagaId>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.saga_type == saga_type && r.is_associated_with(value))
            .map(|r| r.saga_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(saga_id: SagaId, values: &[(&str, &str)]) -> SagaRecord {
        let associations = values
            .iter()
            .map(|(k, v)| AssociationValue::new(*k, *v))
            .collect();
        SagaRecord::new(
            saga_id,
            "TestSaga",
            serde_json::json!({"counter": 0}),
            associations,
        )
    }

    #[tokio::test]
    async fn insert_and_load() {
        let store = InMemorySagaStore::new();
        let saga_id = SagaId::new();

        store
            .insert(record_with(saga_id, &[("order_id", "42")]))
            .await
            .unwrap();

        let loaded = store.load(saga_id).await.unwrap().unwrap();
        assert_eq!(loaded.saga_id, saga_id);
        assert_eq!(store.record_count().await, 1);
    }

    #[tokio::test]
    async fn insert_duplicate_fails() {
        let store = InMemorySagaStore::new();
        let saga_id = SagaId::new();

        store.insert(record_with(saga_id, &[])).await.unwrap();
        let result = store.insert(record_with(saga_id, &[])).await;

        assert!(matches!(
            result,
            Err(SagaStoreError::DuplicateIdentifier(id)) if id == saga_id
        ));
    }

    #[tokio::test]
    async fn update_missing_fails() {
        let store = InMemorySagaStore::new();
        let saga_id = SagaId::new();

        let result = store.update(record_with(saga_id, &[])).await;
        assert!(matches!(result, Err(SagaStoreError::NotFound(id)) if id == saga_id));
    }

    #[tokio::test]
    async fn update_preserves_created_at() {
        let store = InMemorySagaStore::new();
        let saga_id = SagaId::new();

        store.insert(record_with(saga_id, &[])).await.unwrap();
        let inserted = store.load(saga_id).await.unwrap().unwrap();

        store.update(record_with(saga_id, &[])).await.unwrap();
        let updated = store.load(saga_id).await.unwrap().unwrap();

        assert_eq!(updated.created_at, inserted.created_at);
        assert!(updated.updated_at >= inserted.updated_at);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = InMemorySagaStore::new();
        let saga_id = SagaId::new();

        // Absent identifier: still Ok
        store.delete(saga_id).await.unwrap();

        store.insert(record_with(saga_id, &[])).await.unwrap();
        store.delete(saga_id).await.unwrap();
        store.delete(saga_id).await.unwrap();

        assert!(store.load(saga_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn find_by_association_matches_type_and_value() {
        let store = InMemorySagaStore::new();
        let id1 = SagaId::new();
        let id2 = SagaId::new();

        store
            .insert(record_with(id1, &[("order_id", "42")]))
            .await
            .unwrap();
        store
            .insert(record_with(id2, &[("order_id", "43")]))
            .await
            .unwrap();

        let found = store
            .find_by_association("TestSaga", &AssociationValue::new("order_id", "42"))
            .await
            .unwrap();
        assert_eq!(found, HashSet::from([id1]));

        let other_type = store
            .find_by_association("OtherSaga", &AssociationValue::new("order_id", "42"))
            .await
            .unwrap();
        assert!(other_type.is_empty());
    }

    #[tokio::test]
    async fn update_changes_association_results() {
        let store = InMemorySagaStore::new();
        let saga_id = SagaId::new();
        let a = AssociationValue::new("k", "a");
        let b = AssociationValue::new("k", "b");
        let c = AssociationValue::new("k", "c");

        store
            .insert(record_with(saga_id, &[("k", "a"), ("k", "b")]))
            .await
            .unwrap();
        store
            .update(record_with(saga_id, &[("k", "b"), ("k", "c")]))
            .await
            .unwrap();

        assert!(
            store
                .find_by_association("TestSaga", &a)
                .await
                .unwrap()
                .is_empty()
        );
        assert_eq!(
            store.find_by_association("TestSaga", &b).await.unwrap(),
            HashSet::from([saga_id])
        );
        assert_eq!(
            store.find_by_association("TestSaga", &c).await.unwrap(),
            HashSet::from([saga_id])
        );
    }
}
