//! The trait a saga's event-handling logic implements.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::instance::SagaInstance;

/// Event-handling logic for one saga type.
///
/// The implementing value carries whatever collaborators the handlers
/// need (clients, services); the manager invokes it with an exclusively
/// held [`SagaInstance`] whose state it may mutate freely. Associations
/// added or removed on the instance take effect at commit, and calling
/// [`SagaInstance::complete`] ends the saga: its record and association
/// entries are deleted instead of updated.
///
/// A returned error aborts the commit for that instance only; the
/// in-memory mutation is discarded and the exclusive hold is released.
#[async_trait]
pub trait SagaBehavior: Send + Sync + 'static {
    /// The event type this saga consumes.
    type Event: Send + Sync;

    /// The saga's domain state. `Default` supplies the initial state of
    /// a newly created instance.
    type State: Default + Serialize + DeserializeOwned + Send + Sync;

    /// The error type handlers can produce.
    type Error: std::error::Error + Send + Sync;

    /// Returns the saga type name, used to key stored records and
    /// association lookups.
    fn saga_type() -> &'static str;

    /// Applies one event to one saga instance.
    async fn handle(
        &self,
        saga: &mut SagaInstance<Self::State>,
        event: &Self::Event,
    ) -> std::result::Result<(), Self::Error>;
}
