//! Serializer seam between saga state and its opaque stored payload.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::Result;

/// Converts a saga's domain state to and from an opaque JSON payload.
///
/// The repository never interprets the payload; a failure here aborts
/// the single commit or load it occurred in and surfaces as
/// `SagaError::Serialization`.
pub trait StateSerializer<T>: Send + Sync {
    /// Encodes the state into its stored form.
    fn serialize(&self, state: &T) -> Result<serde_json::Value>;

    /// Decodes the state from its stored form.
    fn deserialize(&self, payload: &serde_json::Value) -> Result<T>;
}

/// Default serializer backed by serde_json.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl<T> StateSerializer<T> for JsonSerializer
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    fn serialize(&self, state: &T) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(state)?)
    }

    fn deserialize(&self, payload: &serde_json::Value) -> Result<T> {
        Ok(serde_json::from_value(payload.clone())?)
    }
}
