use std::collections::HashSet;

use chrono::{DateTime, Utc};
use common::{AssociationValue, SagaId};
use serde::{Deserialize, Serialize};

/// Durable representation of a saga instance.
///
/// The payload is the saga's serialized domain state; the store never
/// interprets it. The association set carried here is authoritative for
/// `find_by_association` lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaRecord {
    /// The saga instance identifier.
    pub saga_id: SagaId,
    /// The saga type name (e.g. "OrderFulfillment").
    pub saga_type: String,
    /// Serialized domain state, opaque to the store.
    pub payload: serde_json::Value,
    /// Association values the saga is currently reachable by.
    pub associations: HashSet<AssociationValue>,
    /// When the record was first inserted.
    pub created_at: DateTime<Utc>,
    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl SagaRecord {
    /// Creates a record stamped with the current time.
    pub fn new(
        saga_id: SagaId,
        saga_type: impl Into<String>,
        payload: serde_json::Value,
        associations: HashSet<AssociationValue>,
    ) -> Self {
        let now = Utc::now();
        Self {
            saga_id,
            saga_type: saga_type.into(),
            payload,
            associations,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns a copy with `updated_at` refreshed to now.
    ///
    /// Backends use this on the update path so `created_at` survives
    /// re-commits.
    pub fn touched(mut self) -> Self {
        self.updated_at = Utc::now();
        self
    }

    /// Returns true if the record carries the given association value.
    pub fn is_associated_with(&self, value: &AssociationValue) -> bool {
        self.associations.contains(value)
    }
}
