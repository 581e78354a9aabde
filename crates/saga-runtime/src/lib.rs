//! Saga lifecycle management for event-driven process coordination.
//!
//! This crate routes events to long-lived, identity-addressed saga
//! instances. The [`SagaManager`] derives association values from each
//! event and resolves the target instances; the [`SagaRepository`]
//! guarantees that at most one live representation of any saga is being
//! mutated at a time, process-wide, and mediates all persistence
//! through the storage contract defined in `saga-store`.
//!
//! A saga is declared by implementing [`SagaBehavior`] and registering
//! association routes on the manager builder:
//!
//! ```ignore
//! let repository = Arc::new(SagaRepository::<Shipment, _>::new(store));
//! let manager = SagaManager::builder(Shipment::default(), repository)
//!     .route(CreationPolicy::IfNoneFound, |event: &ShipmentEvent| {
//!         vec![AssociationValue::new("order_id", event.order_id())]
//!     })
//!     .build();
//! manager.handle(&event).await?;
//! ```

pub mod behavior;
pub mod error;
pub mod index;
pub mod instance;
pub mod manager;
pub mod repository;
pub mod serializer;
pub mod status;

pub use behavior::SagaBehavior;
pub use common::{AssociationValue, SagaId};
pub use error::{Result, SagaError};
pub use index::AssociationIndex;
pub use instance::SagaInstance;
pub use manager::{CreationPolicy, HandleOutcome, SagaManager, SagaManagerBuilder};
pub use repository::{ClaimedSaga, SagaRepository};
pub use serializer::{JsonSerializer, StateSerializer};
pub use status::SagaStatus;
