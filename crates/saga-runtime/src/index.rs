//! In-memory association index.

use std::collections::{HashMap, HashSet};

use common::{AssociationValue, SagaId};
use tokio::sync::RwLock;

/// Maps association values to the saga identifiers carrying them.
///
/// A derived, rebuildable view: the repository keeps it consistent on
/// every commit and delete, and seeds it from the store when a lookup
/// misses (e.g. after a restart). The store's records stay
/// authoritative.
#[derive(Default)]
pub struct AssociationIndex {
    entries: RwLock<HashMap<AssociationValue, HashSet<SagaId>>>,
}

impl AssociationIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a saga under an association value.
    pub async fn add(&self, value: AssociationValue, saga_id: SagaId) {
        self.entries
            .write()
            .await
            .entry(value)
            .or_default()
            .insert(saga_id);
    }

    /// Unregisters a saga from an association value, dropping the entry
    /// when its set becomes empty.
    pub async fn remove(&self, value: &AssociationValue, saga_id: SagaId) {
        let mut entries = self.entries.write().await;
        if let Some(ids) = entries.get_mut(value) {
            ids.remove(&saga_id);
            if ids.is_empty() {
                entries.remove(value);
            }
        }
    }

    /// Unregisters a saga from every given association value.
    pub async fn remove_all<'a>(
        &self,
        saga_id: SagaId,
        values: impl IntoIterator<Item = &'a AssociationValue>,
    ) {
        let mut entries = self.entries.write().await;
        for value in values {
            if let Some(ids) = entries.get_mut(value) {
                ids.remove(&saga_id);
                if ids.is_empty() {
                    entries.remove(value);
                }
            }
        }
    }

    /// Returns the identifiers currently indexed under a value.
    pub async fn find(&self, value: &AssociationValue) -> HashSet<SagaId> {
        self.entries
            .read()
            .await
            .get(value)
            .cloned()
            .unwrap_or_default()
    }

    /// Merges store-sourced identifiers into the entry for a value.
    pub async fn seed(&self, value: AssociationValue, ids: HashSet<SagaId>) {
        self.entries
            .write()
            .await
            .entry(value)
            .or_default()
            .extend(ids);
    }
}
