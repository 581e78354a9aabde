use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a single saga instance.
///
/// A newtype over a random v4 UUID, so a saga identifier cannot be
/// passed where some other UUID-backed id is expected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SagaId(Uuid);

impl SagaId {
    /// Creates a new random saga ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a saga ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for SagaId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SagaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for SagaId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<SagaId> for Uuid {
    fn from(id: SagaId) -> Self {
        id.0
    }
}

/// A correlation pair matching incoming events to saga instances.
///
/// Both key and value are opaque strings; a saga may carry several
/// association values at once (e.g. `order_id=42` and `customer_id=7`),
/// and they may be added or removed over its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationValue {
    key: String,
    value: String,
}

impl AssociationValue {
    /// Creates an association value from a key and a value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns the correlation key (the dimension name).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the correlation value.
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for AssociationValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}
